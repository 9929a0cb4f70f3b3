use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{ColorSequence, DominantColorSet, PaletteError, Result, PALETTE_SIZE};

/// Ping-pong period across the palette: 0,1,2,3,2,1.
const MIRROR_PERIOD: usize = 2 * PALETTE_SIZE - 2;

/// Strategy used to expand four colours into a longer sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternMode {
    /// `ABCDABCD...`
    #[default]
    Repeat,
    /// `ABCDCBABCD...`
    Mirror,
    /// Strides through the palette `step` colours at a time.
    Rotate,
}

impl PatternMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Repeat => "repeat",
            Self::Mirror => "mirror",
            Self::Rotate => "rotate",
        }
    }
}

impl fmt::Display for PatternMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatternMode {
    type Err = PaletteError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "repeat" => Ok(Self::Repeat),
            "mirror" => Ok(Self::Mirror),
            "rotate" => Ok(Self::Rotate),
            other => Err(PaletteError::invalid_options(format!(
                "unknown pattern mode `{other}`"
            ))),
        }
    }
}

/// How a [`DominantColorSet`] is expanded by [`generate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternOptions {
    pub mode: PatternMode,
    pub length: usize,
    /// Stride for [`PatternMode::Rotate`]; ignored by the other modes.
    pub step: usize,
}

impl Default for PatternOptions {
    fn default() -> Self {
        Self {
            mode: PatternMode::Repeat,
            length: 16,
            step: 1,
        }
    }
}

impl PatternOptions {
    /// Creates validated options.
    pub fn new(mode: PatternMode, length: usize, step: usize) -> Result<Self> {
        let options = Self { mode, length, step };
        options.validate()?;
        Ok(options)
    }

    /// `length` must be positive, and so must `step` in rotate mode.
    pub fn validate(&self) -> Result<()> {
        if self.length == 0 {
            return Err(PaletteError::invalid_options(
                "pattern length must be positive",
            ));
        }
        if self.mode == PatternMode::Rotate && self.step == 0 {
            return Err(PaletteError::invalid_options(
                "rotate mode requires a positive step",
            ));
        }
        Ok(())
    }
}

/// Expands `colors` into a sequence of exactly `options.length` entries, each
/// one of the four input colours.
pub fn generate(colors: &DominantColorSet, options: &PatternOptions) -> Result<ColorSequence> {
    options.validate()?;

    let sequence = (0..options.length)
        .map(|i| colors.color(palette_index(options, i)))
        .collect();

    Ok(ColorSequence::new(sequence))
}

fn palette_index(options: &PatternOptions, i: usize) -> usize {
    match options.mode {
        PatternMode::Repeat => i % PALETTE_SIZE,
        PatternMode::Mirror => {
            let phase = i % MIRROR_PERIOD;
            if phase < PALETTE_SIZE {
                phase
            } else {
                MIRROR_PERIOD - phase
            }
        }
        // Reduce first so large indices or strides cannot overflow.
        PatternMode::Rotate => ((i % PALETTE_SIZE) * (options.step % PALETTE_SIZE)) % PALETTE_SIZE,
    }
}
