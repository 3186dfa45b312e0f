//! The two opcode wire formats for resolved tile state.
//!
//! Both are streams of 32-bit unsigned words, one tagged operation after another, in paint order.
//!
//! Verbose:
//! - region: `[0, color, x1, y1, x2, y2]`
//! - pixel run: `[1, color, count, e_1 .. e_count]` with `e = y * CANVAS_SIZE + x`
//!
//! Packed:
//! - region: `[2, color, x1, y1, zz(x2 - x1), zz(y2 - y1)]`
//! - pixel run: `[3, color, count, x_0, y_0, zz(x_1 - x_0), zz(y_1 - y_0), ..]`
//!
//! Packed streams are LZ4 compressed (with the decompressed size prepended) before they leave the crate. Words are
//! little-endian on the wire.

use crate::{decode_point, Batch, BatchShape, DecodeError, PaletteColor, CANVAS_SIZE};

pub const OP_REGION: u32 = 0;
pub const OP_PIXELS: u32 = 1;
pub const OP_PACKED_REGION: u32 = 2;
pub const OP_PACKED_PIXELS: u32 = 3;

/// Folds a signed delta so that small magnitudes of either sign become small unsigned values.
pub const fn zigzag(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

pub const fn unzigzag(u: u32) -> i32 {
    ((u >> 1) as i32) ^ -((u & 1) as i32)
}

fn delta(from: u32, to: u32) -> u32 {
    zigzag((to as i32).wrapping_sub(from as i32))
}

fn undelta(from: u32, zz: u32) -> u32 {
    (from as i32).wrapping_add(unzigzag(zz)) as u32
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WireFormat {
    Verbose,
    Packed,
}

/// A decoded paint operation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PaintOp {
    /// Corners exactly as they appeared on the wire; they are not necessarily ordered or on the canvas.
    Region {
        color: PaletteColor,
        x1: u32,
        y1: u32,
        x2: u32,
        y2: u32,
    },
    Pixels {
        color: PaletteColor,
        points: Vec<[u32; 2]>,
    },
}

/// Serializes resolved layers, oldest first, in the verbose format.
pub fn encode_verbose(layers: &[Batch]) -> Vec<u32> {
    let mut words = Vec::new();
    for layer in layers {
        let color = layer.color.index();
        match &layer.shape {
            BatchShape::Region(b) => {
                words.extend([OP_REGION, color, b.x1 as u32, b.y1 as u32, b.x2 as u32, b.y2 as u32]);
            }
            BatchShape::Pixels(pixels) | BatchShape::Mixed { pixels, .. } => {
                words.extend([OP_PIXELS, color, pixels.len() as u32]);
                words.extend_from_slice(pixels);
            }
        }
    }
    words
}

/// Serializes resolved layers, oldest first, in the delta-packed format. Not yet compressed.
pub fn encode_packed(layers: &[Batch]) -> Vec<u32> {
    let mut words = Vec::new();
    for layer in layers {
        let color = layer.color.index();
        match &layer.shape {
            BatchShape::Region(b) => {
                let (x1, y1) = (b.x1 as u32, b.y1 as u32);
                words.extend([
                    OP_PACKED_REGION,
                    color,
                    x1,
                    y1,
                    delta(x1, b.x2 as u32),
                    delta(y1, b.y2 as u32),
                ]);
            }
            BatchShape::Pixels(pixels) | BatchShape::Mixed { pixels, .. } => {
                words.extend([OP_PACKED_PIXELS, color, pixels.len() as u32]);
                let mut previous: Option<[u32; 2]> = None;
                for [x, y] in pixels.iter().map(|&e| decode_point(e)) {
                    match previous {
                        None => words.extend([x, y]),
                        Some([px, py]) => words.extend([delta(px, x), delta(py, y)]),
                    }
                    previous = Some([x, y]);
                }
            }
        }
    }
    words
}

pub fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

pub fn bytes_to_words(bytes: &[u8]) -> Result<Vec<u32>, DecodeError> {
    if bytes.len() % 4 != 0 {
        return Err(DecodeError::MisalignedStream(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

pub fn compress_packed(words: &[u32]) -> Vec<u8> {
    lz4_flex::compress_prepend_size(&words_to_bytes(words))
}

/// Largest decompressed size [`decompress_packed`] accepts: three words per canvas cell.
pub const MAX_PACKED_BYTES: usize = CANVAS_SIZE as usize * CANVAS_SIZE as usize * 3 * 4;

pub fn decompress_packed(bytes: &[u8]) -> Result<Vec<u32>, DecodeError> {
    // The size prefix is checked before lz4 allocates for it.
    if let Some(&[a, b, c, d]) = bytes.get(..4) {
        let declared = u32::from_le_bytes([a, b, c, d]) as usize;
        if declared > MAX_PACKED_BYTES {
            return Err(DecodeError::OversizedStream {
                declared,
                limit: MAX_PACKED_BYTES,
            });
        }
    }
    bytes_to_words(&lz4_flex::decompress_size_prepended(bytes)?)
}

/// Reads [`PaintOp`]s from a word stream.
///
/// The first failure is yielded once and ends the stream; callers must treat it as fatal for the whole decode.
pub struct OpDecoder<'a> {
    format: WireFormat,
    words: &'a [u32],
    position: usize,
}

impl<'a> OpDecoder<'a> {
    pub fn new(format: WireFormat, words: &'a [u32]) -> Self {
        Self {
            format,
            words,
            position: 0,
        }
    }

    fn remaining(&self) -> usize {
        self.words.len() - self.position
    }

    fn read(&mut self, op_start: usize) -> Result<u32, DecodeError> {
        let word = *self
            .words
            .get(self.position)
            .ok_or(DecodeError::UnexpectedEnd { position: op_start })?;
        self.position += 1;
        Ok(word)
    }

    fn read_array<const N: usize>(&mut self, op_start: usize) -> Result<[u32; N], DecodeError> {
        let mut out = [0; N];
        for word in out.iter_mut() {
            *word = self.read(op_start)?;
        }
        Ok(out)
    }

    fn read_color(&mut self, op_start: usize) -> Result<PaletteColor, DecodeError> {
        let position = self.position;
        let index = self.read(op_start)?;
        PaletteColor::from_index(index).ok_or(DecodeError::UnknownColor { index, position })
    }

    /// Reads a point count and checks that the stream can hold that many points.
    fn read_count(&mut self, op_start: usize, words_per_point: usize) -> Result<usize, DecodeError> {
        let count = self.read(op_start)? as usize;
        if count.saturating_mul(words_per_point) > self.remaining() {
            return Err(DecodeError::UnexpectedEnd { position: op_start });
        }
        Ok(count)
    }

    fn next_op(&mut self) -> Result<PaintOp, DecodeError> {
        let start = self.position;
        let opcode = self.read(start)?;
        match (self.format, opcode) {
            (WireFormat::Verbose, OP_REGION) => {
                let color = self.read_color(start)?;
                let [x1, y1, x2, y2] = self.read_array::<4>(start)?;
                Ok(PaintOp::Region {
                    color,
                    x1,
                    y1,
                    x2,
                    y2,
                })
            }
            (WireFormat::Verbose, OP_PIXELS) => {
                let color = self.read_color(start)?;
                let count = self.read_count(start, 1)?;
                let mut points = Vec::with_capacity(count);
                for _ in 0..count {
                    points.push(decode_point(self.read(start)?));
                }
                Ok(PaintOp::Pixels { color, points })
            }
            (WireFormat::Packed, OP_PACKED_REGION) => {
                let color = self.read_color(start)?;
                let [x1, y1, dx, dy] = self.read_array::<4>(start)?;
                Ok(PaintOp::Region {
                    color,
                    x1,
                    y1,
                    x2: undelta(x1, dx),
                    y2: undelta(y1, dy),
                })
            }
            (WireFormat::Packed, OP_PACKED_PIXELS) => {
                let color = self.read_color(start)?;
                let count = self.read_count(start, 2)?;
                let mut points: Vec<[u32; 2]> = Vec::with_capacity(count);
                for _ in 0..count {
                    let [a, b] = self.read_array::<2>(start)?;
                    let point = match points.last() {
                        None => [a, b],
                        Some(&[px, py]) => [undelta(px, a), undelta(py, b)],
                    };
                    points.push(point);
                }
                Ok(PaintOp::Pixels { color, points })
            }
            _ => Err(DecodeError::UnknownOpcode {
                opcode,
                position: start,
            }),
        }
    }
}

impl<'a> Iterator for OpDecoder<'a> {
    type Item = Result<PaintOp, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining() == 0 {
            return None;
        }
        let op = self.next_op();
        if op.is_err() {
            self.position = self.words.len();
        }
        Some(op)
    }
}

pub fn decode_ops(format: WireFormat, words: &[u32]) -> Result<Vec<PaintOp>, DecodeError> {
    OpDecoder::new(format, words).collect()
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
    use crate::{encode_point, Bounds, Snowflake, CANVAS_SIZE};

    fn layer(id: u64, color: PaletteColor, shape: BatchShape) -> Batch {
        Batch {
            id: Snowflake(id),
            user_id: 1,
            tile: 0,
            color,
            shape,
        }
    }

    fn sample_layers() -> Vec<Batch> {
        vec![
            layer(1, PaletteColor::Red, BatchShape::Region(Bounds::from_corners(0, 0, 9, 4))),
            layer(
                2,
                PaletteColor::Blue,
                BatchShape::Pixels(vec![
                    encode_point(5, 5),
                    encode_point(4, 5),
                    encode_point(999, 0),
                    encode_point(0, 999),
                ]),
            ),
            layer(
                3,
                PaletteColor::Transparent,
                BatchShape::Mixed {
                    bounds: Bounds::from_corners(1, 1, 2, 2),
                    pixels: vec![encode_point(1, 1), encode_point(2, 2)],
                },
            ),
        ]
    }

    #[test]
    fn zigzag_values() {
        assert_eq!(zigzag(0), 0);
        assert_eq!(zigzag(-1), 1);
        assert_eq!(zigzag(1), 2);
        assert_eq!(zigzag(-2), 3);
        assert_eq!(zigzag(i32::MAX), u32::MAX - 1);
        assert_eq!(zigzag(i32::MIN), u32::MAX);
        for n in [0, 1, -1, 12345, -999, i32::MAX, i32::MIN, i32::MIN + 1] {
            assert_eq!(unzigzag(zigzag(n)), n);
        }
        for u in [0, 1, 2, 3, 4096, u32::MAX, u32::MAX - 1] {
            assert_eq!(zigzag(unzigzag(u)), u);
        }
    }

    #[test]
    fn verbose_layout() {
        let words = encode_verbose(&sample_layers()[..2]);
        let red = PaletteColor::Red.index();
        let blue = PaletteColor::Blue.index();
        assert_eq!(
            words,
            vec![
                0,
                red,
                0,
                0,
                9,
                4,
                1,
                blue,
                4,
                5 * CANVAS_SIZE + 5,
                5 * CANVAS_SIZE + 4,
                999,
                999 * CANVAS_SIZE
            ]
        );
    }

    #[test]
    fn packed_layout() {
        let words = encode_packed(&sample_layers()[..2]);
        let red = PaletteColor::Red.index();
        let blue = PaletteColor::Blue.index();
        assert_eq!(
            words,
            vec![
                2,
                red,
                0,
                0,
                zigzag(9),
                zigzag(4),
                3,
                blue,
                4,
                5,
                5,
                zigzag(-1),
                zigzag(0),
                zigzag(995),
                zigzag(-5),
                zigzag(-999),
                zigzag(999)
            ]
        );
    }

    #[test]
    fn both_formats_decode_to_the_same_ops() {
        let layers = sample_layers();
        let verbose = decode_ops(WireFormat::Verbose, &encode_verbose(&layers)).unwrap();
        let packed =
            decode_ops(WireFormat::Packed, &decompress_packed(&compress_packed(&encode_packed(&layers))).unwrap())
                .unwrap();
        assert_eq!(verbose, packed);
        assert_eq!(
            verbose[0],
            PaintOp::Region {
                color: PaletteColor::Red,
                x1: 0,
                y1: 0,
                x2: 9,
                y2: 4
            }
        );
        assert_eq!(
            verbose[2],
            PaintOp::Pixels {
                color: PaletteColor::Transparent,
                points: vec![[1, 1], [2, 2]]
            }
        );
    }

    #[test]
    fn opcodes_are_format_specific() {
        let verbose = encode_verbose(&sample_layers());
        assert!(matches!(
            decode_ops(WireFormat::Packed, &verbose),
            Err(DecodeError::UnknownOpcode { opcode: 0, position: 0 })
        ));
        let packed = encode_packed(&sample_layers());
        assert!(matches!(
            decode_ops(WireFormat::Verbose, &packed),
            Err(DecodeError::UnknownOpcode { opcode: 2, position: 0 })
        ));
    }

    #[test]
    fn errors_end_the_stream() {
        let mut words = encode_verbose(&sample_layers()[..1]);
        words.extend([7, 0, 0]);
        let mut decoder = OpDecoder::new(WireFormat::Verbose, &words);
        assert!(matches!(decoder.next(), Some(Ok(PaintOp::Region { .. }))));
        assert!(matches!(
            decoder.next(),
            Some(Err(DecodeError::UnknownOpcode { opcode: 7, position: 6 }))
        ));
        assert!(decoder.next().is_none());
    }

    #[test]
    fn malformed_streams() {
        assert!(matches!(
            decode_ops(WireFormat::Verbose, &[0, 0, 1, 2]),
            Err(DecodeError::UnexpectedEnd { position: 0 })
        ));
        assert!(matches!(
            decode_ops(WireFormat::Verbose, &[1, 0, u32::MAX, 5]),
            Err(DecodeError::UnexpectedEnd { position: 0 })
        ));
        assert!(matches!(
            decode_ops(WireFormat::Verbose, &[0, 64, 0, 0, 0, 0]),
            Err(DecodeError::UnknownColor { index: 64, position: 1 })
        ));
        assert!(matches!(bytes_to_words(&[1, 2, 3]), Err(DecodeError::MisalignedStream(3))));
        assert!(matches!(decompress_packed(&[1, 2]), Err(DecodeError::Decompress(_))));

        let mut huge = u32::MAX.to_le_bytes().to_vec();
        huge.extend([0x10, 0, 0, 0]);
        assert!(matches!(
            decompress_packed(&huge),
            Err(DecodeError::OversizedStream { declared, .. }) if declared == u32::MAX as usize
        ));
        assert!(decode_ops(WireFormat::Packed, &[]).unwrap().is_empty());
    }
}
