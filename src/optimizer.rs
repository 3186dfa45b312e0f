use crate::{
    encode_point, BatchRequest, BatchShape, Bounds, ConfigurationError, FormatError, PaletteColor,
    SmallKeyHashMap, TileId, TileLogError, UserId, CANVAS_SIZE,
};

use ahash::AHashSet;

/// Fewest cells a group must have before it may be stored as a region.
pub const MIN_REGION_PIXELS: usize = 4;

/// One colored pixel write, as submitted by a writer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PixelWrite {
    pub tile: TileId,
    pub x: u32,
    pub y: u32,
    /// Falls back to the call's default color when absent.
    pub color: Option<PaletteColor>,
}

impl PixelWrite {
    pub fn new(tile: TileId, x: u32, y: u32) -> Self {
        Self {
            tile,
            x,
            y,
            color: None,
        }
    }

    pub fn with_color(mut self, color: PaletteColor) -> Self {
        self.color = Some(color);
        self
    }
}

/// True when `points` fill `bounds` exactly once each: no gaps and no repeated coordinate.
pub fn is_filled_rectangle(points: &[[u32; 2]], bounds: &Bounds) -> bool {
    if points.len() as u64 != bounds.area() {
        return false;
    }
    let distinct: AHashSet<[u32; 2]> = points.iter().copied().collect();
    distinct.len() == points.len()
}

fn bounding_box(points: &[[u32; 2]]) -> Option<Bounds> {
    let (&[x0, y0], rest) = points.split_first()?;
    let (x1, y1, x2, y2) = rest
        .iter()
        .fold((x0, y0, x0, y0), |(x1, y1, x2, y2), &[x, y]| {
            (x1.min(x), y1.min(y), x2.max(x), y2.max(y))
        });
    // Points are validated against the canvas before grouping, so they fit.
    Some(Bounds::from_corners(x1 as u16, y1 as u16, x2 as u16, y2 as u16))
}

struct PixelGroup {
    tile: TileId,
    color: PaletteColor,
    points: Vec<[u32; 2]>,
}

impl PixelGroup {
    fn into_shape(self) -> BatchShape {
        match bounding_box(&self.points) {
            Some(bounds)
                if self.points.len() >= MIN_REGION_PIXELS
                    && is_filled_rectangle(&self.points, &bounds) =>
            {
                BatchShape::Region(bounds)
            }
            _ => BatchShape::Pixels(self.points.iter().map(|&[x, y]| encode_point(x, y)).collect()),
        }
    }
}

/// Turns one writer's pixel writes into the fewest batch rows this scheme allows.
///
/// Pixels are grouped by `(tile, color)` in first-seen order. A group that fills its bounding box exactly (and has at least
/// [`MIN_REGION_PIXELS`] cells) becomes a [`BatchShape::Region`]; anything else becomes a [`BatchShape::Pixels`] carrying every
/// write of the group in submission order, repeats included. The output covers exactly the input.
pub struct BatchOptimizer {
    writer: UserId,
    default_color: Option<PaletteColor>,
    group_index: SmallKeyHashMap<(TileId, PaletteColor), usize>,
    groups: Vec<PixelGroup>,
}

impl BatchOptimizer {
    pub fn new(writer: UserId, default_color: Option<PaletteColor>) -> Self {
        Self {
            writer,
            default_color,
            group_index: Default::default(),
            groups: Vec::new(),
        }
    }

    pub fn add_pixel(&mut self, pixel: PixelWrite) -> Result<(), TileLogError> {
        let PixelWrite { tile, x, y, color } = pixel;
        let color = color
            .or(self.default_color)
            .ok_or(ConfigurationError::UnresolvableColor { tile, x, y })?;
        if x >= CANVAS_SIZE || y >= CANVAS_SIZE {
            return Err(FormatError::CoordinateOutOfBounds { x, y }.into());
        }

        let groups = &mut self.groups;
        let index = *self.group_index.entry((tile, color)).or_insert_with(|| {
            groups.push(PixelGroup {
                tile,
                color,
                points: Vec::new(),
            });
            groups.len() - 1
        });
        self.groups[index].points.push([x, y]);
        Ok(())
    }

    /// One request per `(tile, color)` group, in first-seen order.
    pub fn finish(self) -> Vec<BatchRequest> {
        let writer = self.writer;
        self.groups
            .into_iter()
            .map(|group| BatchRequest {
                user_id: writer,
                tile: group.tile,
                color: group.color,
                shape: group.into_shape(),
            })
            .collect()
    }
}

/// Plans the batches for one write call without persisting anything.
pub fn create_optimal_batches(
    writer: UserId,
    pixels: &[PixelWrite],
    default_color: Option<PaletteColor>,
) -> Result<Vec<BatchRequest>, TileLogError> {
    let mut optimizer = BatchOptimizer::new(writer, default_color);
    for &pixel in pixels {
        optimizer.add_pixel(pixel)?;
    }
    Ok(optimizer.finish())
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
    use crate::BatchKind;

    use std::collections::{BTreeMap, BTreeSet};

    fn covered(requests: &[BatchRequest]) -> BTreeSet<(TileId, PaletteColor, [u32; 2])> {
        requests
            .iter()
            .flat_map(|r| r.shape.points().map(move |p| (r.tile, r.color, p)))
            .collect()
    }

    #[test]
    fn filled_square_becomes_region() {
        let pixels: Vec<_> = [(50, 50), (51, 50), (50, 51), (51, 51)]
            .into_iter()
            .map(|(x, y)| PixelWrite::new(1, x, y))
            .collect();

        let batches = create_optimal_batches(8, &pixels, Some(PaletteColor::Green)).unwrap();

        assert_eq!(
            batches,
            vec![BatchRequest {
                user_id: 8,
                tile: 1,
                color: PaletteColor::Green,
                shape: BatchShape::Region(Bounds {
                    x1: 50,
                    y1: 50,
                    x2: 51,
                    y2: 51
                }),
            }]
        );
    }

    #[test]
    fn short_run_becomes_pixels_in_submission_order() {
        let pixels: Vec<_> = [(100, 100), (102, 100), (101, 100)]
            .into_iter()
            .map(|(x, y)| PixelWrite::new(0, x, y).with_color(PaletteColor::Red))
            .collect();

        let batches = create_optimal_batches(8, &pixels, None).unwrap();

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].color, PaletteColor::Red);
        assert_eq!(
            batches[0].shape,
            BatchShape::Pixels(vec![
                100 * CANVAS_SIZE + 100,
                100 * CANVAS_SIZE + 102,
                100 * CANVAS_SIZE + 101
            ])
        );
    }

    #[test]
    fn rectangle_with_hole_or_repeat_is_not_a_region() {
        // (1, 1) is missing, but the repeated (0, 0) makes the count match the box.
        let holed: Vec<_> = [(0, 0), (0, 0), (1, 0), (0, 1)]
            .into_iter()
            .map(|(x, y)| PixelWrite::new(0, x, y))
            .collect();
        let batches = create_optimal_batches(1, &holed, Some(PaletteColor::Black)).unwrap();
        assert_eq!(batches[0].kind(), BatchKind::Pixels);
        assert_eq!(batches[0].shape.pixels().unwrap().len(), 4);

        let l_shape: Vec<_> = [(0, 0), (1, 0), (2, 0), (0, 1), (0, 2)]
            .into_iter()
            .map(|(x, y)| PixelWrite::new(0, x, y))
            .collect();
        let batches = create_optimal_batches(1, &l_shape, Some(PaletteColor::Black)).unwrap();
        assert_eq!(batches[0].kind(), BatchKind::Pixels);
    }

    #[test]
    fn groups_by_tile_and_color_in_first_seen_order() {
        let pixels = vec![
            PixelWrite::new(2, 200, 300).with_color(PaletteColor::Purple),
            PixelWrite::new(0, 1, 1),
            PixelWrite::new(2, 205, 310).with_color(PaletteColor::Purple),
            PixelWrite::new(0, 1, 1).with_color(PaletteColor::Red),
            PixelWrite::new(1, 4, 4),
        ];

        let batches = create_optimal_batches(3, &pixels, Some(PaletteColor::Green)).unwrap();

        let keys: Vec<_> = batches.iter().map(|b| (b.tile, b.color)).collect();
        assert_eq!(
            keys,
            vec![
                (2, PaletteColor::Purple),
                (0, PaletteColor::Green),
                (0, PaletteColor::Red),
                (1, PaletteColor::Green),
            ]
        );
        assert!(batches.iter().all(|b| b.user_id == 3));
    }

    #[test]
    fn coverage_is_exact() {
        let mut pixels = Vec::new();
        for y in 10..14 {
            for x in 20..25 {
                pixels.push(PixelWrite::new(7, x, y));
            }
        }
        pixels.push(PixelWrite::new(7, 999, 999).with_color(PaletteColor::Blue));
        pixels.push(PixelWrite::new(8, 0, 0));
        pixels.push(PixelWrite::new(7, 21, 11).with_color(PaletteColor::Blue));

        let batches = create_optimal_batches(1, &pixels, Some(PaletteColor::Tan)).unwrap();

        let expected: BTreeSet<_> = pixels
            .iter()
            .map(|p| (p.tile, p.color.unwrap_or(PaletteColor::Tan), [p.x, p.y]))
            .collect();
        assert_eq!(covered(&batches), expected);

        let kinds: BTreeMap<_, _> = batches.iter().map(|b| ((b.tile, b.color), b.kind())).collect();
        assert_eq!(kinds[&(7, PaletteColor::Tan)], BatchKind::Region);
        assert_eq!(kinds[&(7, PaletteColor::Blue)], BatchKind::Pixels);
        assert_eq!(kinds[&(8, PaletteColor::Tan)], BatchKind::Pixels);
    }

    #[test]
    fn missing_color_is_a_configuration_error() {
        let pixels = vec![PixelWrite::new(0, 1, 1)];
        assert!(matches!(
            create_optimal_batches(1, &pixels, None),
            Err(TileLogError::Configuration(
                ConfigurationError::UnresolvableColor { tile: 0, x: 1, y: 1 }
            ))
        ));
    }

    #[test]
    fn off_canvas_pixel_is_a_format_error() {
        let pixels = vec![PixelWrite::new(0, CANVAS_SIZE, 0)];
        assert!(matches!(
            create_optimal_batches(1, &pixels, Some(PaletteColor::Red)),
            Err(TileLogError::Format(FormatError::CoordinateOutOfBounds { .. }))
        ));
    }

    #[test]
    fn empty_call_plans_nothing() {
        assert!(create_optimal_batches(1, &[], None).unwrap().is_empty());
    }
}
