use crate::{
    CanvasShape, NoSharedAllocSerializer, PaletteColor, PersistenceError, Snowflake, TileId,
    UserId, CANVAS_SIZE,
};

use ilattice::glam::IVec2;
use ilattice::prelude::Extent;
use ndshape::ConstShape;
use rkyv::ser::Serializer;
use rkyv::{AlignedVec, Archive, Deserialize, Infallible, Serialize};

/// Packs an in-canvas point as `y * CANVAS_SIZE + x`.
pub fn encode_point(x: u32, y: u32) -> u32 {
    CanvasShape::linearize([x, y])
}

/// Inverse of [`encode_point`]. Values past the end of the canvas decode to a `y` outside it.
pub const fn decode_point(encoded: u32) -> [u32; 2] {
    [encoded % CANVAS_SIZE, encoded / CANVAS_SIZE]
}

/// Inclusive, axis-aligned bounding box on a tile's canvas.
#[derive(Archive, Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[archive(check_bytes)]
pub struct Bounds {
    pub x1: u16,
    pub y1: u16,
    pub x2: u16,
    pub y2: u16,
}

impl Bounds {
    /// Normalizes the two corners so that `x1 <= x2` and `y1 <= y2`.
    pub fn from_corners(xa: u16, ya: u16, xb: u16, yb: u16) -> Self {
        Self {
            x1: xa.min(xb),
            y1: ya.min(yb),
            x2: xa.max(xb),
            y2: ya.max(yb),
        }
    }

    pub fn min(&self) -> IVec2 {
        IVec2::new(self.x1 as i32, self.y1 as i32)
    }

    pub fn max(&self) -> IVec2 {
        IVec2::new(self.x2 as i32, self.y2 as i32)
    }

    pub fn extent(&self) -> Extent<IVec2> {
        Extent::from_min_and_shape(self.min(), self.max() - self.min() + IVec2::ONE)
    }

    pub fn area(&self) -> u64 {
        let shape = self.extent().shape;
        shape.x as u64 * shape.y as u64
    }

    pub fn overlaps(&self, other: &Bounds) -> bool {
        self.min().cmple(other.max()).all() && other.min().cmple(self.max()).all()
    }

    /// Every covered point, row by row.
    pub fn points(&self) -> impl Iterator<Item = [u32; 2]> {
        let Bounds { x1, y1, x2, y2 } = *self;
        (y1 as u32..=y2 as u32).flat_map(move |y| (x1 as u32..=x2 as u32).map(move |x| [x, y]))
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
#[repr(u8)]
pub enum BatchKind {
    Region = 0,
    Pixels = 1,
    Mixed = 2,
}

impl BatchKind {
    pub const ALL: [BatchKind; 3] = [BatchKind::Region, BatchKind::Pixels, BatchKind::Mixed];

    pub fn from_u8(byte: u8) -> Option<Self> {
        Self::ALL.get(byte as usize).copied()
    }
}

/// What a batch paints. Also the signature used to collapse literal repeats when resolving a tile.
///
/// `Mixed` (a hull plus an explicit pixel list) is stored, resolved and rendered like any other shape, but the optimizer never
/// produces it.
#[derive(Archive, Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[archive(check_bytes)]
pub enum BatchShape {
    Region(Bounds),
    Pixels(Vec<u32>),
    Mixed { bounds: Bounds, pixels: Vec<u32> },
}

impl BatchShape {
    pub fn kind(&self) -> BatchKind {
        match self {
            Self::Region(_) => BatchKind::Region,
            Self::Pixels(_) => BatchKind::Pixels,
            Self::Mixed { .. } => BatchKind::Mixed,
        }
    }

    pub fn bounds(&self) -> Option<&Bounds> {
        match self {
            Self::Region(bounds) | Self::Mixed { bounds, .. } => Some(bounds),
            Self::Pixels(_) => None,
        }
    }

    /// Encoded coordinates, if this shape carries an explicit list.
    pub fn pixels(&self) -> Option<&[u32]> {
        match self {
            Self::Region(_) => None,
            Self::Pixels(pixels) | Self::Mixed { pixels, .. } => Some(pixels),
        }
    }

    /// The points this shape paints. A `Mixed` hull is not painted; only its list is.
    pub fn points(&self) -> Box<dyn Iterator<Item = [u32; 2]> + '_> {
        match self {
            Self::Region(bounds) => Box::new(bounds.points()),
            Self::Pixels(pixels) | Self::Mixed { pixels, .. } => {
                Box::new(pixels.iter().map(|&e| decode_point(e)))
            }
        }
    }

    fn integrity_fault(&self) -> Option<&'static str> {
        let bounds_ok = |b: &Bounds| b.x1 <= b.x2 && b.y1 <= b.y2;
        match self {
            Self::Region(bounds) if !bounds_ok(bounds) => Some("region bounds are inverted"),
            Self::Pixels(pixels) if pixels.is_empty() => Some("pixel batch has no pixels"),
            Self::Mixed { bounds, pixels } if pixels.is_empty() || !bounds_ok(bounds) => {
                Some("mixed batch has no pixels or inverted bounds")
            }
            _ => None,
        }
    }
}

/// A batch the optimizer wants written. The id is assigned when it is appended.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BatchRequest {
    pub user_id: UserId,
    pub tile: TileId,
    pub color: PaletteColor,
    pub shape: BatchShape,
}

impl BatchRequest {
    pub fn kind(&self) -> BatchKind {
        self.shape.kind()
    }

    pub fn into_batch(self, id: Snowflake) -> Batch {
        let Self {
            user_id,
            tile,
            color,
            shape,
        } = self;
        Batch {
            id,
            user_id,
            tile,
            color,
            shape,
        }
    }
}

/// An immutable row of the log.
#[derive(Archive, Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[archive(check_bytes)]
pub struct Batch {
    pub id: Snowflake,
    pub user_id: UserId,
    pub tile: TileId,
    pub color: PaletteColor,
    pub shape: BatchShape,
}

impl Batch {
    pub fn kind(&self) -> BatchKind {
        self.shape.kind()
    }

    pub fn serialize(&self) -> Result<AlignedVec, PersistenceError> {
        let mut serializer = NoSharedAllocSerializer::<1024>::default();
        serializer
            .serialize_value(self)
            .map_err(|_| PersistenceError::Archive(self.id))?;
        Ok(serializer.into_serializer().into_inner())
    }

    /// Validates and deserializes a stored row.
    ///
    /// `id` is the key the row was found under; a row that fails validation, disagrees with its key or violates the
    /// shape invariants is a data-integrity fault.
    pub fn deserialize_row(id: Snowflake, bytes: &[u8]) -> Result<Self, PersistenceError> {
        // PERF: sled gives no alignment guarantee for values, so the archive is copied before validation
        let mut aligned = AlignedVec::with_capacity(bytes.len());
        aligned.extend_from_slice(bytes);

        let archived = rkyv::check_archived_root::<Batch>(&aligned).map_err(|_| {
            PersistenceError::Corrupt {
                id,
                reason: "archive failed validation",
            }
        })?;
        let batch: Batch = match archived.deserialize(&mut Infallible) {
            Ok(batch) => batch,
            Err(never) => match never {},
        };

        if batch.id != id {
            return Err(PersistenceError::Corrupt {
                id,
                reason: "row id does not match its key",
            });
        }
        if let Some(reason) = batch.shape.integrity_fault() {
            return Err(PersistenceError::Corrupt { id, reason });
        }
        Ok(batch)
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
