use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Suffix appended to the digest of a directory manifest.
pub const DIR_SUFFIX: &str = ".dir";

/// Content digest algorithm.
///
/// `Md5` is the default: a 128-bit digest that remote backends commonly
/// expose as an ETag, so remote and local identities agree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashName {
    #[default]
    Md5,
    Blake3,
}

impl HashName {
    /// Length of a hex-encoded digest produced by this algorithm.
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Blake3 => 64,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Blake3 => "blake3",
        }
    }
}

impl fmt::Display for HashName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashName {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "blake3" => Ok(Self::Blake3),
            other => Err(TypeError::UnknownHash(other.to_string())),
        }
    }
}

/// Identity of a piece of content: the algorithm plus its hex digest.
///
/// The digest is `None` until the content has been hashed. Directory
/// digests carry the [`DIR_SUFFIX`] and address a directory manifest rather
/// than file bytes. Two `HashInfo`s are equal iff both fields match.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashInfo {
    pub name: HashName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl HashInfo {
    /// A hash that has not been computed yet.
    pub fn unset(name: HashName) -> Self {
        Self { name, value: None }
    }

    /// Build a file hash from a hex digest, validating its shape.
    pub fn new(name: HashName, value: impl Into<String>) -> Result<Self, TypeError> {
        let value = value.into();
        let digest = value.strip_suffix(DIR_SUFFIX).unwrap_or(&value);
        let valid = digest.len() == name.hex_len()
            && digest.bytes().all(|b| b.is_ascii_hexdigit());
        if !valid {
            return Err(TypeError::InvalidDigest {
                name: name.to_string(),
                value,
            });
        }
        Ok(Self {
            name,
            value: Some(value.to_ascii_lowercase()),
        })
    }

    /// Build a directory hash from the digest of its manifest.
    pub fn dir(name: HashName, manifest_digest: &str) -> Result<Self, TypeError> {
        Self::new(name, format!("{manifest_digest}{DIR_SUFFIX}"))
    }

    /// Returns `true` once a digest has been recorded.
    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    /// Returns `true` if this hash addresses a directory manifest.
    pub fn is_dir(&self) -> bool {
        self.value
            .as_deref()
            .is_some_and(|v| v.ends_with(DIR_SUFFIX))
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Split the digest into the two-character shard and the remainder,
    /// which is how content is laid out on disk.
    pub fn shard(&self) -> Option<(&str, &str)> {
        let value = self.value.as_deref()?;
        if value.len() < 3 {
            return None;
        }
        Some(value.split_at(2))
    }
}

impl fmt::Display for HashInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(v) => write!(f, "{}:{}", self.name, v),
            None => write!(f, "{}:<unset>", self.name),
        }
    }
}
