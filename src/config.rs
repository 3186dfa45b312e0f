use crate::{ConfigurationError, TileLog, TileLogError, DEFAULT_SHARD_ID};

use std::path::Path;

/// Batches per chunk when a write call is appended.
pub const DEFAULT_CHUNK_SIZE: usize = 10;

pub const DEFAULT_LOG_NAME: &str = "tiles";

/// Builder for a [`TileLog`], following [`sled::Config`].
#[derive(Clone, Debug)]
pub struct Config {
    sled: sled::Config,
    log_name: String,
    shard_id: u16,
    chunk_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sled: sled::Config::default(),
            log_name: DEFAULT_LOG_NAME.to_owned(),
            shard_id: DEFAULT_SHARD_ID,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Config {
    pub fn path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.sled = self.sled.path(path);
        self
    }

    /// Deletes the database when dropped. For tests.
    pub fn temporary(mut self, temporary: bool) -> Self {
        self.sled = self.sled.temporary(temporary);
        self
    }

    pub fn cache_capacity(mut self, bytes: u64) -> Self {
        self.sled = self.sled.cache_capacity(bytes);
        self
    }

    /// Prefix of the tree names, so several logs can share one database.
    pub fn log_name(mut self, name: impl Into<String>) -> Self {
        self.log_name = name.into();
        self
    }

    /// Shard stamped into every id this log generates. Reduced mod 1024.
    pub fn shard_id(mut self, shard_id: u16) -> Self {
        self.shard_id = shard_id;
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn open(&self) -> Result<TileLog, TileLogError> {
        if self.chunk_size == 0 {
            return Err(ConfigurationError::ZeroChunkSize.into());
        }
        let db = self.sled.open()?;
        TileLog::open(&db, &self.log_name, self.shard_id, self.chunk_size)
    }
}
