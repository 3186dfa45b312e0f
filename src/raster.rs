use crate::{CanvasShape, DecodeError, PaintOp, PaletteColor, CANVAS_SIZE};

use ndshape::ConstShape;

/// A dense `CANVAS_SIZE x CANVAS_SIZE` RGBA8 buffer, rows top to bottom. Ready for an external image encoder.
#[derive(Clone, Eq, PartialEq)]
pub struct TileImage {
    rgba: Box<[u8]>,
}

impl std::fmt::Debug for TileImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileImage")
            .field("width", &CANVAS_SIZE)
            .field("height", &CANVAS_SIZE)
            .finish()
    }
}

impl Default for TileImage {
    /// Fully transparent.
    fn default() -> Self {
        Self {
            rgba: vec![0; (CANVAS_SIZE * CANVAS_SIZE * 4) as usize].into_boxed_slice(),
        }
    }
}

impl TileImage {
    pub const fn width(&self) -> u32 {
        CANVAS_SIZE
    }

    pub const fn height(&self) -> u32 {
        CANVAS_SIZE
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.rgba
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.rgba.into_vec()
    }

    fn offset(x: u32, y: u32) -> usize {
        CanvasShape::linearize([x, y]) as usize * 4
    }

    /// `None` off the canvas.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= CANVAS_SIZE || y >= CANVAS_SIZE {
            return None;
        }
        let i = Self::offset(x, y);
        let mut px = [0; 4];
        px.copy_from_slice(&self.rgba[i..i + 4]);
        Some(px)
    }

    /// Paints one operation over whatever is already there.
    ///
    /// Regions are normalized and clipped to the canvas; off-canvas run points are dropped.
    pub fn paint(&mut self, op: &PaintOp) {
        match op {
            &PaintOp::Region {
                color,
                x1,
                y1,
                x2,
                y2,
            } => {
                let last = CANVAS_SIZE - 1;
                let (min_x, max_x) = (x1.min(x2), x1.max(x2).min(last));
                let (min_y, max_y) = (y1.min(y2), y1.max(y2).min(last));
                if min_x > max_x || min_y > max_y {
                    return;
                }
                let rgba = color.rgba();
                for y in min_y..=max_y {
                    let row = Self::offset(min_x, y)..Self::offset(max_x, y) + 4;
                    for px in self.rgba[row].chunks_exact_mut(4) {
                        px.copy_from_slice(&rgba);
                    }
                }
            }
            PaintOp::Pixels { color, points } => {
                let rgba = color.rgba();
                for &[x, y] in points {
                    if x < CANVAS_SIZE && y < CANVAS_SIZE {
                        let i = Self::offset(x, y);
                        self.rgba[i..i + 4].copy_from_slice(&rgba);
                    }
                }
            }
        }
    }

    /// The palette entry at `(x, y)`. Every value this image holds came from the palette.
    pub fn palette_color(&self, x: u32, y: u32) -> Option<PaletteColor> {
        let px = self.pixel(x, y)?;
        PaletteColor::ALL.iter().copied().find(|c| c.rgba() == px)
    }
}

/// Paints every decoded operation in order. The first decode failure aborts the whole image.
pub fn rasterize<I>(ops: I) -> Result<TileImage, DecodeError>
where
    I: IntoIterator<Item = Result<PaintOp, DecodeError>>,
{
    let mut image = TileImage::default();
    for op in ops {
        image.paint(&op?);
    }
    Ok(image)
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
