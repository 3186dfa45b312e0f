use super::log_tree::{append_batch, decode_row, open_log_trees, read_batch, scan_ids, EncodedBatch, LogTrees};
use super::{
    compress_packed, create_optimal_batches, encode_packed, encode_verbose, rasterize, reconstruct_grid,
    resolve_layers, words_to_bytes, Batch, BatchKind, Bounds, ConfigurationError, OpDecoder, PaletteColor,
    PersistenceError, PixelWrite, Snowflake, SnowflakeGenerator, TileId, TileImage, TileKindKey,
    TileLogError, UserId, UserKey, WireFormat,
};

use ahash::AHashMap;
use itertools::Itertools;
use log::{debug, trace};
use sled::transaction::TransactionError;
use sled::Transactional;
use std::ops::Bound;

/// What one write call appended.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct InsertSummary {
    pub chunk_count: usize,
    pub batch_count: usize,
}

/// Lower bound (exclusive) of a changes query.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Since {
    Id(Snowflake),
    /// Milliseconds since the Unix epoch, converted to an id bound.
    Timestamp(u64),
}

/// An append-only log of pixel [`Batch`]es, and the read paths that resolve it into tile state.
///
/// Rows are never updated or removed. All reads recompute from the log; there is no cached canvas.
#[derive(Clone)]
pub struct TileLog {
    db: sled::Db,
    trees: LogTrees,
    ids: SnowflakeGenerator,
    chunk_size: usize,
}

impl TileLog {
    /// Opens (or creates) the trees of the log named `log_name` inside `db`.
    pub fn open(
        db: &sled::Db,
        log_name: &str,
        shard_id: u16,
        chunk_size: usize,
    ) -> Result<Self, TileLogError> {
        if chunk_size == 0 {
            return Err(ConfigurationError::ZeroChunkSize.into());
        }
        Ok(Self {
            db: db.clone(),
            trees: open_log_trees(log_name, db)?,
            ids: SnowflakeGenerator::new(shard_id),
            chunk_size,
        })
    }

    pub fn id_generator(&self) -> &SnowflakeGenerator {
        &self.ids
    }

    /// Optimizes one writer's pixels into batches and appends them all in a single transaction.
    ///
    /// Either every batch of the call becomes visible or none does. Batches are staged in chunks of the configured size, in
    /// order.
    pub fn insert_optimal_batches(
        &self,
        writer: UserId,
        pixels: &[PixelWrite],
        default_color: Option<PaletteColor>,
    ) -> Result<InsertSummary, TileLogError> {
        let requests = create_optimal_batches(writer, pixels, default_color)?;
        if requests.is_empty() {
            return Ok(InsertSummary::default());
        }

        let batches: Vec<Batch> = requests
            .into_iter()
            .map(|request| request.into_batch(self.ids.generate()))
            .collect();
        let encoded = batches
            .iter()
            .map(EncodedBatch::new)
            .collect::<Result<Vec<_>, _>>()?;
        let chunk_count = encoded.chunks(self.chunk_size).len();

        let result: Result<(), TransactionError<PersistenceError>> =
            (&self.trees.batches, &self.trees.tile_index, &self.trees.user_index).transaction(
                |(batches, tile_index, user_index)| {
                    for (i, chunk) in encoded.chunks(self.chunk_size).enumerate() {
                        trace!("Staging chunk {}/{} ({} batches)", i + 1, chunk_count, chunk.len());
                        for batch in chunk {
                            append_batch(batches, tile_index, user_index, batch)?;
                        }
                    }
                    Ok(())
                },
            );
        result.map_err(|e| match e {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => PersistenceError::Storage(e),
        })?;

        debug!(
            "User {} appended {} batches in {} chunks",
            writer,
            encoded.len(),
            chunk_count
        );
        Ok(InsertSummary {
            chunk_count,
            batch_count: encoded.len(),
        })
    }

    fn read_batches(&self, ids: impl IntoIterator<Item = Snowflake>) -> Result<Vec<Batch>, TileLogError> {
        ids.into_iter()
            .map(|id| read_batch(&self.trees.batches, id).map_err(TileLogError::from))
            .collect()
    }

    fn tile_ids(&self, tile: TileId) -> Result<Vec<Snowflake>, TileLogError> {
        // Each type's run under the tile is already sorted by id.
        let runs = BatchKind::ALL
            .iter()
            .map(|&kind| {
                scan_ids::<TileKindKey>(&self.trees.tile_index, &TileKindKey::tile_kind_prefix(tile, kind))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs.into_iter().kmerge().collect())
    }

    /// Every batch ever written to `tile`, oldest first.
    pub fn get_batches_for_tile(&self, tile: TileId) -> Result<Vec<Batch>, TileLogError> {
        self.read_batches(self.tile_ids(tile)?)
    }

    /// The newest `limit` batches across all tiles, newest first.
    pub fn get_recent_activity(&self, limit: usize) -> Result<Vec<Batch>, TileLogError> {
        let mut batches = Vec::with_capacity(limit.min(1024));
        for iter_result in self.trees.batches.iter().rev().take(limit) {
            let (key, row) = iter_result?;
            batches.push(decode_row(&key, &row)?);
        }
        Ok(batches)
    }

    /// The newest `limit` batches written by `user_id`, newest first.
    pub fn get_user_activity(&self, user_id: UserId, limit: usize) -> Result<Vec<Batch>, TileLogError> {
        let mut ids = scan_ids::<UserKey>(&self.trees.user_index, &UserKey::user_prefix(user_id))?;
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids.truncate(limit);
        self.read_batches(ids)
    }

    /// Batches `user_id` wrote to `tile`, optionally of one type only, oldest first.
    pub fn get_user_activity_in_tile(
        &self,
        user_id: UserId,
        tile: TileId,
        kind: Option<BatchKind>,
    ) -> Result<Vec<Batch>, TileLogError> {
        let mut ids = match kind {
            Some(kind) => scan_ids::<UserKey>(
                &self.trees.user_index,
                &UserKey::user_tile_kind_prefix(user_id, tile, kind),
            )?,
            None => scan_ids::<UserKey>(&self.trees.user_index, &UserKey::user_tile_prefix(user_id, tile))?,
        };
        ids.sort_unstable();
        self.read_batches(ids)
    }

    /// Batches newer than `since`, on one tile or on all of them, oldest first.
    ///
    /// A timestamp bound is turned into an id with this log's generator, which consumes a sequence value.
    pub fn get_changes_since(&self, tile: Option<TileId>, since: Since) -> Result<Vec<Batch>, TileLogError> {
        let lower = match since {
            Since::Id(id) => id,
            Since::Timestamp(ms) => self.ids.generate_at(ms),
        };
        match tile {
            Some(tile) => {
                let ids = self.tile_ids(tile)?.into_iter().filter(|&id| id > lower);
                self.read_batches(ids)
            }
            None => {
                let range = (Bound::Excluded(lower.into_sled_key()), Bound::Unbounded);
                let mut batches = Vec::new();
                for iter_result in self.trees.batches.range(range) {
                    let (key, row) = iter_result?;
                    batches.push(decode_row(&key, &row)?);
                }
                Ok(batches)
            }
        }
    }

    /// Region batches on `tile` whose box overlaps `area`, oldest first. Pixel and mixed batches are never returned.
    pub fn get_regions_in_area(&self, tile: TileId, area: Bounds) -> Result<Vec<Batch>, TileLogError> {
        let area = Bounds::from_corners(area.x1, area.y1, area.x2, area.y2);
        let ids = scan_ids::<TileKindKey>(
            &self.trees.tile_index,
            &TileKindKey::tile_kind_prefix(tile, BatchKind::Region),
        )?;
        let mut regions = self.read_batches(ids)?;
        regions.retain(|batch| batch.shape.bounds().map_or(false, |b| b.overlaps(&area)));
        Ok(regions)
    }

    /// The compacted paint layers of `tile`, oldest first.
    pub fn get_latest_state(&self, tile: TileId) -> Result<Vec<Batch>, TileLogError> {
        let layers = resolve_layers(self.get_batches_for_tile(tile)?);
        trace!("Tile {} resolved to {} layers", tile, layers.len());
        Ok(layers)
    }

    /// Resolved state of `tile` in the verbose wire format.
    pub fn get_resolved_grid(&self, tile: TileId) -> Result<Vec<u8>, TileLogError> {
        Ok(words_to_bytes(&encode_verbose(&self.get_latest_state(tile)?)))
    }

    /// Resolved state of `tile` in the packed wire format, LZ4 compressed.
    pub fn get_resolved_grid_packed(&self, tile: TileId) -> Result<Vec<u8>, TileLogError> {
        Ok(compress_packed(&encode_packed(&self.get_latest_state(tile)?)))
    }

    /// Rasterizes the resolved state of `tile`. An empty tile renders fully transparent.
    pub fn render_tile(&self, tile: TileId) -> Result<TileImage, TileLogError> {
        let words = encode_verbose(&self.get_latest_state(tile)?);
        Ok(rasterize(OpDecoder::new(WireFormat::Verbose, &words))?)
    }

    /// The last color painted at each touched coordinate of `tile`.
    pub fn reconstruct_grid(&self, tile: TileId) -> Result<AHashMap<[u32; 2], PaletteColor>, TileLogError> {
        Ok(reconstruct_grid(&self.get_latest_state(tile)?))
    }

    /// Blocks until everything appended so far is durable. Returns the number of bytes flushed.
    pub fn flush(&self) -> Result<usize, TileLogError> {
        Ok(self.db.flush()?)
    }

    #[cfg(feature = "async")]
    pub async fn flush_async(&self) -> Result<usize, TileLogError> {
        Ok(self.db.flush_async().await?)
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
