use std::time::Duration;

/// Result alias that carries the custom [`PaletteError`] type.
pub type Result<T> = std::result::Result<T, PaletteError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum PaletteError {
    /// The artwork bytes are not a JPEG or PNG image, or are corrupt.
    #[error("failed to decode artwork: {0}")]
    Decode(String),
    /// A colour literal that is not of the form `#RRGGBB`.
    #[error("invalid colour `{0}`, expected #RRGGBB")]
    InvalidColor(String),
    /// Pattern options that violate the generator's preconditions.
    #[error("invalid pattern options: {0}")]
    InvalidOptions(String),
    /// A colour set with the wrong size or out of dominance order.
    #[error("invalid colour palette: {0}")]
    Palette(String),
    #[error("fetching artwork `{artwork_ref}` timed out after {timeout:?}")]
    FetchTimeout {
        artwork_ref: String,
        timeout: Duration,
    },
    #[error("fetching artwork `{artwork_ref}` failed: {reason}")]
    FetchFailed { artwork_ref: String, reason: String },
    /// The playback source could not produce a snapshot.
    #[error("playback source error: {0}")]
    Source(String),
    /// An output driver rejected a connect, send or close.
    #[error("output driver error: {0}")]
    Output(String),
    #[error("configuration error: {0}")]
    Config(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl PaletteError {
    pub fn invalid_options<T: Into<String>>(msg: T) -> Self {
        Self::InvalidOptions(msg.into())
    }

    pub fn palette<T: Into<String>>(msg: T) -> Self {
        Self::Palette(msg.into())
    }

    pub fn fetch_failed(artwork_ref: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FetchFailed {
            artwork_ref: artwork_ref.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors that only abandon the current tick.
    pub fn is_tick_local(&self) -> bool {
        matches!(
            self,
            Self::Decode(_) | Self::FetchTimeout { .. } | Self::FetchFailed { .. }
        )
    }
}

impl From<image::ImageError> for PaletteError {
    fn from(value: image::ImageError) -> Self {
        Self::Decode(value.to_string())
    }
}
