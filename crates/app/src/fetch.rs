use std::{fs, path::Path, time::Duration};

use palette_sync_core::{ArtworkFetcher, PaletteError, Result};
use ureq::Agent;

/// Artwork larger than this is refused rather than buffered.
const MAX_ARTWORK_BYTES: u64 = 16 * 1024 * 1024;

/// Fetches `http(s)://` artwork with `ureq`; `file://` references and bare
/// paths are read from disk.
#[derive(Debug, Clone, Default)]
pub struct HttpArtworkFetcher;

impl HttpArtworkFetcher {
    pub fn new() -> Self {
        Self
    }

    fn fetch_http(&self, url: &str, timeout: Duration) -> Result<Vec<u8>> {
        let mut response = build_agent(timeout)
            .get(url)
            .call()
            .map_err(|err| map_http_error(url, timeout, err))?;

        response
            .body_mut()
            .with_config()
            .limit(MAX_ARTWORK_BYTES)
            .read_to_vec()
            .map_err(|err| map_http_error(url, timeout, err))
    }
}

impl ArtworkFetcher for HttpArtworkFetcher {
    fn fetch(&self, artwork_ref: &str, timeout: Duration) -> Result<Vec<u8>> {
        if artwork_ref.is_empty() {
            return Err(PaletteError::fetch_failed(artwork_ref, "empty artwork reference"));
        }

        if artwork_ref.starts_with("http://") || artwork_ref.starts_with("https://") {
            return self.fetch_http(artwork_ref, timeout);
        }

        let path = artwork_ref.strip_prefix("file://").unwrap_or(artwork_ref);
        fs::read(Path::new(path)).map_err(|err| PaletteError::fetch_failed(artwork_ref, err.to_string()))
    }
}

pub fn build_agent(timeout: Duration) -> Agent {
    Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

fn map_http_error(url: &str, timeout: Duration, err: ureq::Error) -> PaletteError {
    match err {
        ureq::Error::Timeout(_) => PaletteError::FetchTimeout {
            artwork_ref: url.to_string(),
            timeout,
        },
        other => PaletteError::fetch_failed(url, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_local_artwork_and_file_urls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cover.png");
        fs::write(&path, b"bytes").unwrap();

        let fetcher = HttpArtworkFetcher::new();
        let timeout = Duration::from_secs(1);
        let plain = path.to_string_lossy().to_string();
        assert_eq!(fetcher.fetch(&plain, timeout).unwrap(), b"bytes");
        assert_eq!(
            fetcher.fetch(&format!("file://{plain}"), timeout).unwrap(),
            b"bytes"
        );
    }

    #[test]
    fn missing_artwork_is_a_fetch_failure() {
        let fetcher = HttpArtworkFetcher::new();
        let timeout = Duration::from_secs(1);

        let err = fetcher.fetch("/no/such/cover.jpg", timeout).unwrap_err();
        assert!(matches!(err, PaletteError::FetchFailed { .. }));

        let err = fetcher.fetch("", timeout).unwrap_err();
        assert!(err.is_tick_local());
    }
}
