//! Split configuration and its validation.
//!
//! Validation runs before any shard is created, so a rejected configuration
//! never leaves files behind.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SplitError;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Default maximum lines per output file.
pub const DEFAULT_LIMIT: u64 = 100;

/// Default read-chunk size for file sources (64 KB).
pub const DEFAULT_MAX_STORE: usize = 64 * 1024;

// ─────────────────────────────────────────────────────────────────────────────
// Delimiter
// ─────────────────────────────────────────────────────────────────────────────

/// Byte sequence terminating a line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delimiter(Vec<u8>);

impl Delimiter {
    /// Single newline byte.
    pub fn newline() -> Self {
        Self(vec![b'\n'])
    }

    /// Single-byte delimiter.
    pub fn byte(b: u8) -> Self {
        Self(vec![b])
    }

    /// Arbitrary byte sequence. An empty sequence is rejected by
    /// [`SplitConfig::validate`].
    pub fn bytes(seq: impl Into<Vec<u8>>) -> Self {
        Self(seq.into())
    }

    /// Parses a delimiter from text, decoding `\n`, `\r`, `\t`, `\0` and `\\`.
    pub fn parse_escaped(text: &str) -> Self {
        let mut out = Vec::with_capacity(text.len());
        let mut chars = text.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                continue;
            }
            match chars.next() {
                Some('n') => out.push(b'\n'),
                Some('r') => out.push(b'\r'),
                Some('t') => out.push(b'\t'),
                Some('0') => out.push(0),
                Some('\\') => out.push(b'\\'),
                Some(other) => {
                    out.push(b'\\');
                    let mut buf = [0u8; 4];
                    out.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
                }
                None => out.push(b'\\'),
            }
        }
        Self(out)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for Delimiter {
    fn default() -> Self {
        Self::newline()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SplitConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for splitting one source file into line-bounded shards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    /// File to split.
    pub source_file: PathBuf,
    /// Directory receiving the shards.
    pub target_path: PathBuf,
    /// Maximum lines per shard.
    pub limit: u64,
    /// Maximum bytes read from the source per chunk.
    pub max_store: usize,
    /// Line delimiter.
    pub delimiter: Delimiter,
    /// Extra attempts when opening a shard file fails.
    pub sink_retries: u32,
}

impl SplitConfig {
    /// Creates a config with default limit, chunk size and delimiter.
    pub fn new(source_file: impl Into<PathBuf>, target_path: impl Into<PathBuf>) -> Self {
        Self {
            source_file: source_file.into(),
            target_path: target_path.into(),
            limit: DEFAULT_LIMIT,
            max_store: DEFAULT_MAX_STORE,
            delimiter: Delimiter::default(),
            sink_retries: 0,
        }
    }

    /// Sets the lines-per-shard limit.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the read-chunk size.
    pub fn max_store(mut self, bytes: usize) -> Self {
        self.max_store = bytes;
        self
    }

    /// Sets the line delimiter.
    pub fn delimiter(mut self, delimiter: Delimiter) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Sets the number of retries when a shard cannot be opened.
    pub fn sink_retries(mut self, retries: u32) -> Self {
        self.sink_retries = retries;
        self
    }

    /// Checks the settings that do not touch the filesystem.
    pub fn validate_options(&self) -> Result<(), SplitError> {
        if self.limit == 0 {
            return Err(SplitError::InvalidConfiguration(
                "limit must be greater than 0".to_string(),
            ));
        }
        if self.max_store == 0 {
            return Err(SplitError::InvalidConfiguration(
                "max_store must be greater than 0".to_string(),
            ));
        }
        if self.delimiter.is_empty() {
            return Err(SplitError::InvalidConfiguration(
                "delimiter must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Validates the whole configuration and prepares the target directory.
    ///
    /// # Errors
    ///
    /// Returns `SplitError::InvalidConfiguration` if an option is out of
    /// range, the source is missing, unreadable or not a regular file, or the target
    /// path cannot be used as a directory.
    pub async fn validate(&self) -> Result<(), SplitError> {
        self.validate_options()?;
        check_source(&self.source_file).await?;
        prepare_target(&self.target_path).await
    }
}

async fn check_source(path: &Path) -> Result<(), SplitError> {
    let metadata = tokio::fs::metadata(path).await.map_err(|e| {
        SplitError::InvalidConfiguration(format!(
            "Cannot read source file {}: {}",
            path.display(),
            e
        ))
    })?;

    if !metadata.is_file() {
        return Err(SplitError::InvalidConfiguration(format!(
            "Source {} is not a regular file",
            path.display()
        )));
    }

    // Permission problems only surface on open.
    tokio::fs::File::open(path).await.map_err(|e| {
        SplitError::InvalidConfiguration(format!(
            "Cannot open source file {}: {}",
            path.display(),
            e
        ))
    })?;
    Ok(())
}

async fn prepare_target(path: &Path) -> Result<(), SplitError> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(SplitError::InvalidConfiguration(format!(
            "Target {} is not a directory",
            path.display()
        ))),
        Err(_) => tokio::fs::create_dir_all(path).await.map_err(|e| {
            SplitError::InvalidConfiguration(format!(
                "Failed to create target directory {}: {}",
                path.display(),
                e
            ))
        }),
    }
}
