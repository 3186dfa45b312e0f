use crate::FormatError;

use rkyv::{Archive, Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! palette {
    ($($variant:ident => $hex:literal,)*) => {
        /// A color of the fixed canvas palette. Storage and both wire formats only ever carry [`PaletteColor::index`].
        #[derive(
            Archive, Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize,
        )]
        #[archive(check_bytes)]
        #[archive_attr(derive(Debug, Eq, PartialEq))]
        #[repr(u8)]
        pub enum PaletteColor {
            $($variant,)*
            Transparent,
        }

        impl PaletteColor {
            pub const ALL: &'static [PaletteColor] = &[$(PaletteColor::$variant,)* PaletteColor::Transparent];

            /// `#rrggbb` for opaque entries, `transparent` for the sentinel.
            pub const fn hex(self) -> &'static str {
                match self {
                    $(PaletteColor::$variant => $hex,)*
                    PaletteColor::Transparent => "transparent",
                }
            }
        }
    };
}

palette! {
    Black => "#000000",
    DarkGray => "#3c3c3c",
    Gray => "#787878",
    LightGray => "#aaaaaa",
    Silver => "#d2d2d2",
    White => "#ffffff",
    DeepRed => "#600018",
    DarkRed => "#a50e1e",
    Red => "#ed1c24",
    Salmon => "#fa8072",
    DarkOrange => "#e45c1a",
    Orange => "#ff7f27",
    Gold => "#f6aa09",
    Yellow => "#f9dd3b",
    LightYellow => "#fffabc",
    DarkGoldenrod => "#9c8431",
    Goldenrod => "#c5ad31",
    LightGoldenrod => "#e8d45f",
    DarkOlive => "#4a6b3a",
    Olive => "#5a944a",
    LightOlive => "#84c573",
    DarkGreen => "#0eb968",
    Green => "#13e67b",
    LightGreen => "#87ff5e",
    DarkTeal => "#0c816e",
    Teal => "#10aea6",
    LightTeal => "#13e1be",
    DarkCyan => "#0f799f",
    Cyan => "#60f7f2",
    LightCyan => "#bbfaf2",
    DarkBlue => "#28509e",
    Blue => "#4093e4",
    LightBlue => "#7dc7ff",
    DarkIndigo => "#4d31b8",
    Indigo => "#6b50f6",
    LightIndigo => "#99b1fb",
    DarkSlateBlue => "#4a4284",
    SlateBlue => "#7a71c4",
    LightSlateBlue => "#b5aef1",
    DarkPurple => "#780c99",
    Purple => "#aa38b9",
    LightPurple => "#e09ff9",
    DarkPink => "#cb007a",
    Pink => "#ec1f80",
    LightPink => "#f38da9",
    DarkPeach => "#9b5249",
    Peach => "#d18078",
    LightPeach => "#fab6a4",
    DarkBrown => "#684634",
    Brown => "#95682a",
    LightBrown => "#dba463",
    DarkTan => "#7b6352",
    Tan => "#9c846b",
    LightTan => "#d6b594",
    DarkBeige => "#d18051",
    Beige => "#f8b277",
    LightBeige => "#ffc5a5",
    DarkStone => "#6d643f",
    Stone => "#948c6b",
    LightStone => "#cdc59e",
    DarkSlate => "#333941",
    Slate => "#6d758d",
    LightSlate => "#b3b9d1",
}

impl PaletteColor {
    pub const fn index(self) -> u32 {
        self as u32
    }

    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// The sentinel is `(0, 0, 0, 0)`; every other entry is opaque.
    pub fn rgba(self) -> [u8; 4] {
        match self {
            Self::Transparent => [0; 4],
            color => {
                let rgb = u32::from_str_radix(&color.hex()[1..], 16).unwrap_or_default();
                let [_, r, g, b] = rgb.to_be_bytes();
                [r, g, b, 255]
            }
        }
    }
}

impl fmt::Display for PaletteColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.hex())
    }
}

/// Parses `#rrggbb` (any case) or `transparent`.
impl FromStr for PaletteColor {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.hex().eq_ignore_ascii_case(s))
            .ok_or_else(|| FormatError::UnknownColor(s.to_owned()))
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
    fn index_table_is_bijective() {
        assert_eq!(PaletteColor::ALL.len(), 64);
        for (i, &color) in PaletteColor::ALL.iter().enumerate() {
            assert_eq!(color.index(), i as u32);
            assert_eq!(PaletteColor::from_index(i as u32), Some(color));
            assert_eq!(color.hex().parse::<PaletteColor>().unwrap(), color);
        }
        assert_eq!(PaletteColor::from_index(64), None);
    }

    #[test]
    fn rgba_values() {
        assert_eq!(PaletteColor::Red.rgba(), [0xed, 0x1c, 0x24, 255]);
        assert_eq!(PaletteColor::Black.rgba(), [0, 0, 0, 255]);
        assert_eq!(PaletteColor::Transparent.rgba(), [0, 0, 0, 0]);
        assert_eq!(PaletteColor::Transparent.index(), 63);
    }

    #[test]
    fn parse_hex() {
        assert_eq!("#ED1C24".parse::<PaletteColor>().unwrap(), PaletteColor::Red);
        assert!(matches!(
            "#123456".parse::<PaletteColor>(),
            Err(FormatError::UnknownColor(_))
        ));
    }
}
