use crate::{Batch, BatchShape, PaletteColor, SmallKeyHashMap, CANVAS_SIZE};

use ahash::{AHashMap, AHashSet};

/// Compacts a tile's batches into paint layers, oldest first.
///
/// Batches with the same [`BatchShape`] are literal repeats and only the newest survives. Batches that merely overlap are all
/// kept; the newer one wins per pixel because it is painted later.
pub fn resolve_layers(batches: Vec<Batch>) -> Vec<Batch> {
    let mut latest: SmallKeyHashMap<&BatchShape, usize> = Default::default();
    for (i, batch) in batches.iter().enumerate() {
        latest
            .entry(&batch.shape)
            .and_modify(|j| {
                if batches[*j].id < batch.id {
                    *j = i;
                }
            })
            .or_insert(i);
    }
    let keep: AHashSet<usize> = latest.into_iter().map(|(_, i)| i).collect();

    let mut layers: Vec<Batch> = batches
        .into_iter()
        .enumerate()
        .filter(|(i, _)| keep.contains(i))
        .map(|(_, batch)| batch)
        .collect();
    layers.sort_unstable_by_key(|batch| batch.id);
    layers
}

/// The color last painted at every on-canvas coordinate the layers touch.
pub fn reconstruct_grid(layers: &[Batch]) -> AHashMap<[u32; 2], PaletteColor> {
    let mut grid = AHashMap::default();
    for layer in layers {
        for [x, y] in layer.shape.points() {
            if x < CANVAS_SIZE && y < CANVAS_SIZE {
                grid.insert([x, y], layer.color);
            }
        }
    }
    grid
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
