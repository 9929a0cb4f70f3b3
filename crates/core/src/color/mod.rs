use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{PaletteError, Result};

/// Number of colours in a [`DominantColorSet`].
pub const PALETTE_SIZE: usize = 4;

/// A normalised `#RRGGBB` colour.
///
/// Parsing accepts either case, rendering is always upper-case. Anything that
/// is not exactly a `#` followed by six hex digits is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorHex {
    rgb: [u8; 3],
}

impl ColorHex {
    /// Wraps raw channel values.
    pub const fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self { rgb: [r, g, b] }
    }

    /// Parses `#RRGGBB` in either case.
    pub fn parse(value: &str) -> Result<Self> {
        let digits = value
            .strip_prefix('#')
            .filter(|digits| digits.len() == 6 && digits.bytes().all(|b| b.is_ascii_hexdigit()))
            .ok_or_else(|| PaletteError::InvalidColor(value.to_string()))?;

        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16)
                .map_err(|_| PaletteError::InvalidColor(value.to_string()))
        };

        Ok(Self::from_rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    /// Channels as `[r, g, b]`.
    pub fn rgb(&self) -> [u8; 3] {
        self.rgb
    }

    /// All three channels are at or above `threshold`.
    pub fn is_near_white(&self, threshold: u8) -> bool {
        self.rgb.iter().all(|channel| *channel >= threshold)
    }
}

impl fmt::Display for ColorHex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b] = self.rgb;
        write!(f, "#{r:02X}{g:02X}{b:02X}")
    }
}

impl FromStr for ColorHex {
    type Err = PaletteError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for ColorHex {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ColorHex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// A dominant colour together with the number of pixels that voted for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Swatch {
    pub color: ColorHex,
    pub pixels: usize,
}

/// Exactly four colours ordered by descending dominance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DominantColorSet {
    swatches: [Swatch; PALETTE_SIZE],
}

impl DominantColorSet {
    /// Builds a set from ranked swatches. Pixel counts must not increase
    /// from one entry to the next.
    pub fn new(swatches: [Swatch; PALETTE_SIZE]) -> Result<Self> {
        if swatches.windows(2).any(|pair| pair[0].pixels < pair[1].pixels) {
            return Err(PaletteError::palette(
                "swatches must be ordered by descending pixel count",
            ));
        }
        Ok(Self { swatches })
    }

    /// Builds a set from bare colours, e.g. ones taken from configuration.
    pub fn from_colors(colors: [ColorHex; PALETTE_SIZE]) -> Self {
        Self {
            swatches: colors.map(|color| Swatch { color, pixels: 0 }),
        }
    }

    /// Like [`from_colors`](Self::from_colors) for a slice that must hold
    /// exactly four colours.
    pub fn from_slice(colors: &[ColorHex]) -> Result<Self> {
        let colors: [ColorHex; PALETTE_SIZE] = colors.try_into().map_err(|_| {
            PaletteError::palette(format!(
                "expected {PALETTE_SIZE} colours, got {}",
                colors.len()
            ))
        })?;
        Ok(Self::from_colors(colors))
    }

    /// Parses a comma separated list such as `#AA0000,#00bb00,#0000CC,#DDDDDD`.
    pub fn parse_list(value: &str) -> Result<Self> {
        let colors = value
            .split(',')
            .map(|item| ColorHex::parse(item.trim()))
            .collect::<Result<Vec<_>>>()?;
        Self::from_slice(&colors)
    }

    pub fn swatches(&self) -> &[Swatch; PALETTE_SIZE] {
        &self.swatches
    }

    pub fn colors(&self) -> [ColorHex; PALETTE_SIZE] {
        self.swatches.map(|swatch| swatch.color)
    }

    /// Colour at `index`, wrapping around the four entries.
    pub fn color(&self, index: usize) -> ColorHex {
        self.swatches[index % PALETTE_SIZE].color
    }

    pub fn contains(&self, color: &ColorHex) -> bool {
        self.swatches.iter().any(|swatch| swatch.color == *color)
    }
}

/// The expanded pattern handed to output drivers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColorSequence(Vec<ColorHex>);

impl ColorSequence {
    pub fn new(colors: Vec<ColorHex>) -> Self {
        Self(colors)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[ColorHex] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColorHex> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Vec<ColorHex> {
        self.0
    }
}

impl fmt::Display for ColorSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, color) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            write!(f, "{color}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalises_to_upper_case() {
        let color = ColorHex::parse("#aabb0c").unwrap();
        assert_eq!(color.to_string(), "#AABB0C");
        assert_eq!(color.rgb(), [0xAA, 0xBB, 0x0C]);
    }

    #[test]
    fn rejects_malformed_literals() {
        for raw in ["AABBCC", "#ABC", "#AABBCCDD", "#GG0000", "", "#", " #AABBCC", "#+A0000"] {
            let err = ColorHex::parse(raw).unwrap_err();
            assert!(matches!(err, PaletteError::InvalidColor(_)), "{raw} accepted");
        }
    }

    #[test]
    fn serializes_as_hex_string() {
        let json = serde_json::to_string(&ColorHex::from_rgb(1, 2, 255)).unwrap();
        assert_eq!(json, "\"#0102FF\"");

        let parsed: ColorHex = serde_json::from_str("\"#0102ff\"").unwrap();
        assert_eq!(parsed, ColorHex::from_rgb(1, 2, 255));
        assert!(serde_json::from_str::<ColorHex>("\"red\"").is_err());
    }

    #[test]
    fn parses_colour_lists() {
        let set = DominantColorSet::parse_list("#AA0000, #00bb00,#0000CC,#DDDDDD").unwrap();
        assert_eq!(set.color(1).to_string(), "#00BB00");

        let err = DominantColorSet::parse_list("#AA0000,#00BB00").unwrap_err();
        assert!(matches!(err, PaletteError::Palette(_)));
    }

    #[test]
    fn rejects_swatches_out_of_order() {
        let swatch = |pixels| Swatch {
            color: ColorHex::from_rgb(0, 0, 0),
            pixels,
        };
        assert!(DominantColorSet::new([swatch(5), swatch(5), swatch(2), swatch(1)]).is_ok());
        let err = DominantColorSet::new([swatch(5), swatch(6), swatch(2), swatch(1)]).unwrap_err();
        assert!(matches!(err, PaletteError::Palette(_)));
        assert!(!err.to_string().contains("pattern options"));
    }

    #[test]
    fn sequence_displays_comma_separated() {
        let sequence = ColorSequence::new(vec![
            ColorHex::from_rgb(0xAA, 0, 0),
            ColorHex::from_rgb(0, 0xBB, 0),
        ]);
        assert_eq!(sequence.to_string(), "#AA0000,#00BB00");
    }
}
