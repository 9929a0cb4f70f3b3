use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{ColorHex, ColorSequence, DominantColorSet, PaletteError, Result, PALETTE_SIZE};

/// A freshly generated sequence together with what it was derived from.
#[derive(Debug, Clone, Copy)]
pub struct PaletteUpdate<'a> {
    pub sequence: &'a ColorSequence,
    pub colors: Option<&'a DominantColorSet>,
    pub artwork_ref: Option<&'a str>,
}

impl<'a> PaletteUpdate<'a> {
    /// An update that carries only the sequence.
    pub fn bare(sequence: &'a ColorSequence) -> Self {
        Self {
            sequence,
            colors: None,
            artwork_ref: None,
        }
    }
}

/// A device or sink that displays colour sequences.
pub trait OutputDriver {
    /// Short label used in log events.
    fn name(&self) -> &str;

    fn connect(&mut self) -> Result<()>;

    fn send(&mut self, sequence: &ColorSequence) -> Result<()>;

    /// Receives a sequence with its source colours. Drivers that only show
    /// the sequence can keep the default.
    fn send_update(&mut self, update: &PaletteUpdate<'_>) -> Result<()> {
        self.send(update.sequence)
    }

    fn close(&mut self) -> Result<()>;
}

/// Fans every produced sequence out to all registered drivers.
#[derive(Default)]
pub struct OutputDispatcher {
    drivers: Vec<Box<dyn OutputDriver>>,
}

impl OutputDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a driver. Drivers receive sequences in registration order.
    pub fn register(&mut self, driver: impl OutputDriver + 'static) {
        self.register_boxed(Box::new(driver));
    }

    pub fn register_boxed(&mut self, driver: Box<dyn OutputDriver>) {
        self.drivers.push(driver);
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    /// Connects every driver. A driver that cannot connect is a startup error.
    pub fn connect_all(&mut self) -> Result<()> {
        for driver in &mut self.drivers {
            driver.connect().map_err(|err| {
                PaletteError::Output(format!("`{}` failed to connect: {err}", driver.name()))
            })?;
            tracing::info!(driver = driver.name(), "output connected");
        }
        Ok(())
    }

    /// Sends `sequence` to every driver and returns how many accepted it.
    /// A failing driver is logged and skipped.
    pub fn dispatch(&mut self, sequence: &ColorSequence) -> usize {
        self.dispatch_update(&PaletteUpdate::bare(sequence))
    }

    /// Like [`dispatch`](Self::dispatch), with the colours and artwork the
    /// sequence came from.
    pub fn dispatch_update(&mut self, update: &PaletteUpdate<'_>) -> usize {
        let mut delivered = 0;
        for driver in &mut self.drivers {
            match driver.send_update(update) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    tracing::warn!(driver = driver.name(), error = %err, "output rejected sequence")
                }
            }
        }
        delivered
    }

    pub fn close_all(&mut self) {
        for driver in &mut self.drivers {
            if let Err(err) = driver.close() {
                tracing::warn!(driver = driver.name(), error = %err, "output failed to close");
            }
        }
    }
}

impl std::fmt::Debug for OutputDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.drivers.iter().map(|driver| driver.name()).collect();
        f.debug_struct("OutputDispatcher")
            .field("drivers", &names)
            .finish()
    }
}

/// Prints each sequence as one comma separated line.
#[derive(Debug)]
pub struct ConsoleDriver<W: Write = io::Stdout> {
    writer: W,
}

impl ConsoleDriver<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ConsoleDriver<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> OutputDriver for ConsoleDriver<W> {
    fn name(&self) -> &str {
        "console"
    }

    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    fn send(&mut self, sequence: &ColorSequence) -> Result<()> {
        writeln!(self.writer, "{sequence}")?;
        self.writer.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PaletteDocument<'a> {
    updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    artwork: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    base: Option<[ColorHex; PALETTE_SIZE]>,
    pattern: &'a ColorSequence,
}

/// Keeps a JSON document with the latest sequence on disk so other processes
/// can pick it up.
#[derive(Debug, Clone)]
pub struct JsonFileDriver {
    path: PathBuf,
}

impl JsonFileDriver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OutputDriver for JsonFileDriver {
    fn name(&self) -> &str {
        "json-file"
    }

    fn connect(&mut self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    fn send(&mut self, sequence: &ColorSequence) -> Result<()> {
        self.send_update(&PaletteUpdate::bare(sequence))
    }

    fn send_update(&mut self, update: &PaletteUpdate<'_>) -> Result<()> {
        let document = PaletteDocument {
            updated_at: Utc::now(),
            artwork: update.artwork_ref,
            base: update.colors.map(DominantColorSet::colors),
            pattern: update.sequence,
        };
        // Write beside the target and rename so readers never see a torn file.
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, serde_json::to_vec_pretty(&document)?)?;
        fs::rename(&staging, &self.path)?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Keeps every sequence it receives. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingDriver {
    sent: Arc<Mutex<Vec<ColorSequence>>>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Result<Vec<ColorSequence>> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<ColorSequence>>> {
        self.sent
            .lock()
            .map_err(|_| PaletteError::Output("recording has been poisoned".to_string()))
    }
}

impl OutputDriver for RecordingDriver {
    fn name(&self) -> &str {
        "recording"
    }

    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    fn send(&mut self, sequence: &ColorSequence) -> Result<()> {
        self.lock()?.push(sequence.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
