use crate::{BatchKind, Snowflake, TileId, UserId};

use std::fmt::Debug;
use std::hash::Hash;

/// A key of one of the index trees. Every index key ends with the id of the batch it points at.
pub trait LogKey: Clone + Copy + Debug + Eq + Hash + Ord + Sized {
    type SledKey: AsRef<[u8]>;

    fn as_sled_key(&self) -> Self::SledKey;
    fn from_sled_key(bytes: &[u8]) -> Option<Self>;

    fn id(&self) -> Snowflake;
}

/// Indexes batches by `(tile, type)`. A bare tile prefix selects every batch on a tile.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct TileKindKey {
    pub tile: TileId,
    pub kind: BatchKind,
    pub id: Snowflake,
}

impl TileKindKey {
    pub fn new(tile: TileId, kind: BatchKind, id: Snowflake) -> Self {
        Self { tile, kind, id }
    }

    pub fn tile_prefix(tile: TileId) -> [u8; 4] {
        tile.to_be_bytes()
    }

    pub fn tile_kind_prefix(tile: TileId, kind: BatchKind) -> [u8; 5] {
        let mut bytes = [0; 5];
        bytes[..4].copy_from_slice(&tile.to_be_bytes());
        bytes[4] = kind as u8;
        bytes
    }
}

impl LogKey for TileKindKey {
    type SledKey = [u8; 13];

    /// Big-endian throughout, so sled's byte order sorts by tile, then type, then id.
    ///
    /// 13 bytes total per key: 4 for the tile, 1 for the type and 8 for the id.
    fn as_sled_key(&self) -> Self::SledKey {
        let mut bytes = [0; 13];
        bytes[..5].copy_from_slice(&Self::tile_kind_prefix(self.tile, self.kind));
        bytes[5..].copy_from_slice(&self.id.into_sled_key());
        bytes
    }

    fn from_sled_key(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 13 {
            return None;
        }
        let mut tile_bytes = [0; 4];
        tile_bytes.copy_from_slice(&bytes[..4]);
        let kind = BatchKind::from_u8(bytes[4])?;
        Some(Self::new(
            TileId::from_be_bytes(tile_bytes),
            kind,
            Snowflake::from_sled_key(&bytes[5..]),
        ))
    }

    fn id(&self) -> Snowflake {
        self.id
    }
}

/// Indexes batches by `(user, tile, type)`. A bare user prefix selects everything a user wrote.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct UserKey {
    pub user_id: UserId,
    pub tile_kind: TileKindKey,
}

impl UserKey {
    pub fn new(user_id: UserId, tile: TileId, kind: BatchKind, id: Snowflake) -> Self {
        Self {
            user_id,
            tile_kind: TileKindKey::new(tile, kind, id),
        }
    }

    pub fn user_prefix(user_id: UserId) -> [u8; 8] {
        user_id.to_be_bytes()
    }

    pub fn user_tile_prefix(user_id: UserId, tile: TileId) -> [u8; 12] {
        let mut bytes = [0; 12];
        bytes[..8].copy_from_slice(&user_id.to_be_bytes());
        bytes[8..].copy_from_slice(&TileKindKey::tile_prefix(tile));
        bytes
    }

    pub fn user_tile_kind_prefix(user_id: UserId, tile: TileId, kind: BatchKind) -> [u8; 13] {
        let mut bytes = [0; 13];
        bytes[..8].copy_from_slice(&user_id.to_be_bytes());
        bytes[8..].copy_from_slice(&TileKindKey::tile_kind_prefix(tile, kind));
        bytes
    }
}

impl LogKey for UserKey {
    type SledKey = [u8; 21];

    /// 21 bytes total per key: 8 for the user followed by a [`TileKindKey`].
    fn as_sled_key(&self) -> Self::SledKey {
        let mut bytes = [0; 21];
        bytes[..8].copy_from_slice(&Self::user_prefix(self.user_id));
        bytes[8..].copy_from_slice(&self.tile_kind.as_sled_key());
        bytes
    }

    fn from_sled_key(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 21 {
            return None;
        }
        let mut user_bytes = [0; 8];
        user_bytes.copy_from_slice(&bytes[..8]);
        Some(Self {
            user_id: UserId::from_be_bytes(user_bytes),
            tile_kind: TileKindKey::from_sled_key(&bytes[8..])?,
        })
    }

    fn id(&self) -> Snowflake {
        self.tile_kind.id
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_kind_key_round_trip_and_order() {
        let a = TileKindKey::new(1, BatchKind::Pixels, Snowflake(9));
        let b = TileKindKey::new(1, BatchKind::Mixed, Snowflake(2));
        let c = TileKindKey::new(2, BatchKind::Region, Snowflake(1));

        assert_eq!(TileKindKey::from_sled_key(&a.as_sled_key()), Some(a));
        assert!(a.as_sled_key() < b.as_sled_key());
        assert!(b.as_sled_key() < c.as_sled_key());
        assert!(a.as_sled_key().starts_with(&TileKindKey::tile_prefix(1)));
        assert!(!c.as_sled_key().starts_with(&TileKindKey::tile_prefix(1)));
    }

    #[test]
    fn user_key_round_trip() {
        let key = UserKey::new(u64::MAX - 3, 12, BatchKind::Region, Snowflake(1 << 50));
        let bytes = key.as_sled_key();
        assert_eq!(UserKey::from_sled_key(&bytes), Some(key));
        assert_eq!(key.id(), Snowflake(1 << 50));
        assert!(bytes.starts_with(&UserKey::user_tile_kind_prefix(
            u64::MAX - 3,
            12,
            BatchKind::Region
        )));
        assert_eq!(UserKey::from_sled_key(&bytes[1..]), None);
    }
}
