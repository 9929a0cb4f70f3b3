//! Core library for Palette Sync.
//!
//! Palette Sync watches what is playing, notices when the artwork changes,
//! reduces the artwork to four dominant colours and expands them into a
//! repeatable colour pattern for lights and displays. Each module owns one
//! step of that chain; [`pipeline`] strings them together per polling tick.
//! Nothing in this crate talks to the network: playback sources and artwork
//! fetchers are supplied by the caller through the traits in [`pipeline`].

pub mod color;
pub mod config;
pub mod detect;
pub mod error;
pub mod extract;
pub mod output;
pub mod pattern;
pub mod pipeline;

pub use color::{ColorHex, ColorSequence, DominantColorSet, Swatch, PALETTE_SIZE};
pub use config::{AppConfig, PollConfig};
pub use detect::{evaluate, ChangeDetector, Evaluation, Fingerprint, PlaybackSnapshot};
pub use error::{PaletteError, Result};
pub use extract::{ColorExtractor, ExtractorConfig};
pub use output::{
    ConsoleDriver, JsonFileDriver, OutputDispatcher, OutputDriver, PaletteUpdate, RecordingDriver,
};
pub use pattern::{generate, PatternMode, PatternOptions};
pub use pipeline::{ArtworkFetcher, PipelineCoordinator, PlaybackSource, PollStats, Poller};
