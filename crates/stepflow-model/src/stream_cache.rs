//! Replayable cache for single-consumption stream bodies.
//!
//! Small payloads stay in memory; anything over the configured threshold
//! is spooled to a temp file that is removed when the cache is dropped.

use std::fmt;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::Result;
use crate::message::BodyStream;

/// Bytes held in memory before spilling to disk.
pub const DEFAULT_SPOOL_THRESHOLD: usize = 128 * 1024;

const DRAIN_CHUNK: usize = 8 * 1024;

/// Stream caching knobs for a route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamCachingConfig {
    pub enabled: bool,
    /// In-memory limit before the body spools to disk.
    #[serde(default = "default_spool_threshold")]
    pub spool_threshold: usize,
    /// Directory for spool files; system temp dir when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spool_directory: Option<PathBuf>,
}

fn default_spool_threshold() -> usize {
    DEFAULT_SPOOL_THRESHOLD
}

impl Default for StreamCachingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            spool_threshold: DEFAULT_SPOOL_THRESHOLD,
            spool_directory: None,
        }
    }
}

enum Backing {
    Memory(Bytes),
    Spooled(NamedTempFile),
}

/// A fully drained stream body that can be read any number of times.
///
/// Each read starts at offset zero regardless of earlier reads.
pub struct StreamCache {
    backing: Backing,
    len: usize,
}

impl StreamCache {
    /// Drain `stream` to completion, spilling to a temp file as soon as
    /// the buffered size crosses `threshold`. The full body is never held
    /// in memory once spooling starts.
    pub async fn from_stream(
        mut stream: BodyStream,
        threshold: usize,
        spool_dir: Option<&Path>,
    ) -> Result<Self> {
        let mut buffered = Vec::new();
        let mut spool: Option<(NamedTempFile, tokio::fs::File)> = None;
        let mut len = 0usize;
        let mut chunk = vec![0u8; DRAIN_CHUNK];

        loop {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            len += n;
            match &mut spool {
                Some((_, file)) => file.write_all(&chunk[..n]).await?,
                None => {
                    buffered.extend_from_slice(&chunk[..n]);
                    if buffered.len() > threshold {
                        let tmp = match spool_dir {
                            Some(dir) => NamedTempFile::new_in(dir)?,
                            None => NamedTempFile::new()?,
                        };
                        let mut file = tokio::fs::File::from_std(tmp.reopen()?);
                        file.write_all(&buffered).await?;
                        buffered = Vec::new();
                        spool = Some((tmp, file));
                    }
                }
            }
        }

        match spool {
            Some((tmp, mut file)) => {
                file.flush().await?;
                Ok(Self {
                    backing: Backing::Spooled(tmp),
                    len,
                })
            }
            None => Ok(Self {
                backing: Backing::Memory(buffered.into()),
                len,
            }),
        }
    }

    pub fn from_bytes(bytes: Bytes) -> Self {
        let len = bytes.len();
        Self {
            backing: Backing::Memory(bytes),
            len,
        }
    }

    /// Read the whole cached body from the start.
    pub async fn read_to_bytes(&self) -> Result<Bytes> {
        match &self.backing {
            Backing::Memory(bytes) => Ok(bytes.clone()),
            Backing::Spooled(tmp) => Ok(tokio::fs::read(tmp.path()).await?.into()),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_spooled(&self) -> bool {
        matches!(self.backing, Backing::Spooled(_))
    }

    /// Path of the spool file, if the body was spilled to disk.
    pub fn spool_path(&self) -> Option<&Path> {
        match &self.backing {
            Backing::Memory(_) => None,
            Backing::Spooled(tmp) => Some(tmp.path()),
        }
    }
}

impl fmt::Debug for StreamCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.backing {
            Backing::Memory(_) => write!(f, "StreamCache::Memory({} bytes)", self.len),
            Backing::Spooled(tmp) => {
                write!(f, "StreamCache::Spooled({} bytes, {:?})", self.len, tmp.path())
            }
        }
    }
}
