use super::{Batch, LogKey, PersistenceError, Snowflake, TileKindKey, UserKey};

use log::warn;
use rkyv::AlignedVec;
use sled::transaction::{ConflictableTransactionError, TransactionalTree};
use sled::Tree;

const EMPTY: &[u8] = &[];

/// The trees backing one log.
///
/// `batches` maps each id to its archived row. The two index trees map composite keys ending in the id to nothing.
#[derive(Clone)]
pub struct LogTrees {
    pub batches: Tree,
    pub tile_index: Tree,
    pub user_index: Tree,
}

pub fn open_log_trees(log_name: &str, db: &sled::Db) -> sled::Result<LogTrees> {
    Ok(LogTrees {
        batches: db.open_tree(format!("{}-batches", log_name))?,
        tile_index: db.open_tree(format!("{}-tile-index", log_name))?,
        user_index: db.open_tree(format!("{}-user-index", log_name))?,
    })
}

/// A [`Batch`] serialized for insertion, with all of its keys.
#[derive(Clone, Debug)]
pub struct EncodedBatch {
    id_key: [u8; 8],
    row: AlignedVec,
    tile_key: <TileKindKey as LogKey>::SledKey,
    user_key: <UserKey as LogKey>::SledKey,
}

impl EncodedBatch {
    pub fn new(batch: &Batch) -> Result<Self, PersistenceError> {
        let kind = batch.kind();
        Ok(Self {
            id_key: batch.id.into_sled_key(),
            row: batch.serialize()?,
            tile_key: TileKindKey::new(batch.tile, kind, batch.id).as_sled_key(),
            user_key: UserKey::new(batch.user_id, batch.tile, kind, batch.id).as_sled_key(),
        })
    }
}

/// Stages one batch and its index entries. Aborts the transaction if the id already has a row, staged or committed.
pub fn append_batch(
    batches: &TransactionalTree,
    tile_index: &TransactionalTree,
    user_index: &TransactionalTree,
    encoded: &EncodedBatch,
) -> Result<(), ConflictableTransactionError<PersistenceError>> {
    if batches.insert(&encoded.id_key[..], encoded.row.as_ref())?.is_some() {
        let id = Snowflake::from_sled_key(&encoded.id_key);
        warn!("Refusing to overwrite batch {}", id);
        return Err(ConflictableTransactionError::Abort(PersistenceError::DuplicateId(id)));
    }
    tile_index.insert(&encoded.tile_key[..], EMPTY)?;
    user_index.insert(&encoded.user_key[..], EMPTY)?;
    Ok(())
}

/// Ids of every index entry under `prefix`, in key order.
pub fn scan_ids<K>(index: &Tree, prefix: &[u8]) -> Result<Vec<Snowflake>, PersistenceError>
where
    K: LogKey,
{
    let mut ids = Vec::new();
    for iter_result in index.scan_prefix(prefix).keys() {
        let key_bytes = iter_result?;
        match K::from_sled_key(&key_bytes) {
            Some(key) => ids.push(key.id()),
            None => {
                warn!("Skipping malformed index key {:?}", key_bytes);
            }
        }
    }
    Ok(ids)
}

pub fn decode_row(key: &[u8], row: &[u8]) -> Result<Batch, PersistenceError> {
    let id = Snowflake::from_sled_key(key);
    Batch::deserialize_row(id, row).map_err(|e| {
        warn!("{}", e);
        e
    })
}

pub fn read_batch(batches: &Tree, id: Snowflake) -> Result<Batch, PersistenceError> {
    match batches.get(id.into_sled_key())? {
        Some(row) => decode_row(&id.into_sled_key(), &row),
        None => {
            warn!("Index entry points at missing batch {}", id);
            Err(PersistenceError::Corrupt {
                id,
                reason: "indexed batch is missing",
            })
        }
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
