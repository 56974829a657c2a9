//! SHA-256 checksums in the manifest's `sha256:<hex>` notation.

use std::fmt;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::RepoError;

static CHECKSUM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:sha256:)?([0-9a-f]{64})$").expect("invalid regex"));

/// Digest of the empty byte string.
pub const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// A SHA-256 digest, stored as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Checksum(String);

impl Checksum {
    /// Computes the checksum of `bytes`.
    pub fn of(bytes: &[u8]) -> Self {
        Self(format!("{:x}", Sha256::digest(bytes)))
    }

    /// Computes the checksum of a file, streaming its contents.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be opened or read.
    pub fn of_file(path: &Path) -> std::io::Result<Self> {
        let mut file = fs::File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 8192];

        loop {
            let bytes_read = file.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(Self(format!("{:x}", hasher.finalize())))
    }

    /// Returns the bare hex digest.
    pub fn hex(&self) -> &str {
        &self.0
    }

    /// Returns true if this is the digest of zero bytes.
    pub fn is_empty_digest(&self) -> bool {
        self.0 == EMPTY_SHA256
    }

    /// Returns true if `bytes` hash to this checksum.
    pub fn matches(&self, bytes: &[u8]) -> bool {
        Self::of(bytes) == *self
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sha256:{}", self.0)
    }
}

impl FromStr for Checksum {
    type Err = RepoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let captures = CHECKSUM_RE
            .captures(s.trim())
            .ok_or_else(|| RepoError::Parse {
                what: format!("checksum '{s}'"),
                reason: "expected sha256:<64 hex digits>".to_string(),
            })?;
        Ok(Self(captures[1].to_ascii_lowercase()))
    }
}

impl TryFrom<String> for Checksum {
    type Error = RepoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Checksum> for String {
    fn from(checksum: Checksum) -> Self {
        checksum.to_string()
    }
}
