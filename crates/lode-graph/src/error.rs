//! Error types for the graph crate.

/// Errors raised while loading or validating the stage graph.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// One output lives inside another stage's output.
    #[error(
        "Cannot add '{out}', because it is overlapping with other tracked output: '{parent}'. \
         To include '{out}' in '{parent}', run 'lode commit {parent_stage}'"
    )]
    Overlap {
        out: String,
        parent: String,
        parent_stage: String,
    },

    /// The same output is declared by more than one stage.
    #[error(
        "output '{output}' is already specified in stages:\n\t{}\n\
         Remove all but one of these manifests to stop tracking the duplicated output.",
        stages.join("\n\t")
    )]
    Duplication { output: String, stages: Vec<String> },

    /// The workspace could not be scanned for manifests.
    #[error("failed to scan for manifests: {0}")]
    Walk(String),

    #[error(transparent)]
    Stage(#[from] lode_stage::StageError),
}

/// Convenience alias for graph results.
pub type GraphResult<T> = Result<T, GraphError>;
