//! An append-only [`sled`](https://crates.io/crates/sled) log of painted pixel batches for a shared, tiled canvas.
//!
//! Writes are never applied in place. Each call is optimized into a few immutable [`Batch`] rows and appended; the current
//! picture of a tile is resolved on demand from the log, serialized into one of two opcode wire formats, and rasterized.

mod batch;
mod config;
mod db;
mod error;
mod grid_codec;
mod log_key;
mod log_tree;
mod optimizer;
mod palette;
mod raster;
mod resolver;
mod snowflake;

pub use batch::*;
pub use config::{Config, DEFAULT_CHUNK_SIZE, DEFAULT_LOG_NAME};
pub use db::{InsertSummary, Since, TileLog};
pub use error::*;
pub use grid_codec::*;
pub use log_key::*;
pub use optimizer::*;
pub use palette::PaletteColor;
pub use raster::{rasterize, TileImage};
pub use resolver::{reconstruct_grid, resolve_layers};
pub use snowflake::*;

use ahash::AHashMap;
use ndshape::ConstShape2u32;
use rkyv::ser::serializers::{
    AlignedSerializer, AllocScratch, CompositeSerializer, FallbackScratch, HeapScratch,
};
use rkyv::{AlignedVec, Infallible};

pub use ilattice;
pub use rkyv;
pub use sled;

/// Side length of every tile's canvas, in pixels.
pub const CANVAS_SIZE: u32 = 1000;

/// Linearizes canvas coordinates as `y * CANVAS_SIZE + x`.
pub type CanvasShape = ConstShape2u32<CANVAS_SIZE, CANVAS_SIZE>;

/// Independently addressed canvas.
pub type TileId = u32;

/// Identifier of the user that wrote a batch.
pub type UserId = u64;

type SmallKeyHashMap<K, V> = AHashMap<K, V>;

type NoSharedAllocSerializer<const N: usize> = CompositeSerializer<
    AlignedSerializer<AlignedVec>,
    FallbackScratch<HeapScratch<N>, AllocScratch>,
    Infallible,
>;
