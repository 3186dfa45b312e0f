use crate::{Snowflake, TileId};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Pixel ({x}, {y}) on tile {tile} has no color and no default color was given")]
    UnresolvableColor { tile: TileId, x: u32, y: u32 },
    #[error("Insert chunk size must be at least 1")]
    ZeroChunkSize,
}

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Not a snowflake identifier: {:?}", .0)]
    InvalidSnowflake(String),
    #[error("Coordinate ({x}, {y}) lies outside the canvas")]
    CoordinateOutOfBounds { x: u32, y: u32 },
    #[error("Not a palette color: {:?}", .0)]
    UnknownColor(String),
}

/// Failure to read an opcode stream. Always fatal to the whole decode.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Unknown opcode {opcode} at word {position}")]
    UnknownOpcode { opcode: u32, position: usize },
    #[error("Unknown palette index {index} at word {position}")]
    UnknownColor { index: u32, position: usize },
    #[error("Opcode stream ended inside the operation starting at word {position}")]
    UnexpectedEnd { position: usize },
    #[error("Byte stream of length {} is not a whole number of 32-bit words", .0)]
    MisalignedStream(usize),
    #[error("Packed stream declares {declared} bytes, more than the limit of {limit}")]
    OversizedStream { declared: usize, limit: usize },
    #[error("Failed to decompress packed stream: {}", .0)]
    Decompress(#[from] lz4_flex::block::DecompressError),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Storage failure: {}", .0)]
    Storage(#[from] sled::Error),
    #[error("Corrupt batch row {id:?}: {reason}")]
    Corrupt { id: Snowflake, reason: &'static str },
    #[error("Failed to archive batch {:?}", .0)]
    Archive(Snowflake),
    #[error("Batch id {} is already taken", .0)]
    DuplicateId(Snowflake),
}

#[derive(Debug, Error)]
pub enum TileLogError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl From<sled::Error> for TileLogError {
    fn from(e: sled::Error) -> Self {
        Self::Persistence(PersistenceError::Storage(e))
    }
}
