//! Per-tick orchestration: change detection, extraction, pattern generation
//! and dispatch to outputs.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use crate::{
    pattern, ChangeDetector, ColorExtractor, ColorSequence, DominantColorSet, OutputDispatcher,
    PaletteUpdate, PatternOptions, PlaybackSnapshot, PollConfig, Result,
};

/// Longest uninterrupted sleep between ticks, so a stop request is noticed
/// promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Supplies the current playback state once per poll.
pub trait PlaybackSource {
    /// `Ok(None)` means there is nothing to report this tick.
    fn poll(&mut self) -> Result<Option<PlaybackSnapshot>>;
}

/// Resolves an artwork reference to raw image bytes.
pub trait ArtworkFetcher {
    /// Must give up after `timeout` with [`crate::PaletteError::FetchTimeout`].
    fn fetch(&self, artwork_ref: &str, timeout: Duration) -> Result<Vec<u8>>;
}

/// Runs the detect → extract → generate chain for one polling target.
#[derive(Debug)]
pub struct PipelineCoordinator<F> {
    detector: ChangeDetector,
    extractor: ColorExtractor,
    options: PatternOptions,
    fetcher: F,
    fetch_timeout: Duration,
    last_colors: Option<DominantColorSet>,
}

impl<F: ArtworkFetcher> PipelineCoordinator<F> {
    pub fn new(
        fetcher: F,
        extractor: ColorExtractor,
        options: PatternOptions,
        fetch_timeout: Duration,
    ) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            detector: ChangeDetector::new(),
            extractor,
            options,
            fetcher,
            fetch_timeout,
            last_colors: None,
        })
    }

    /// Processes one snapshot. Returns a fresh sequence only when the
    /// artwork changed and could be processed; every failure inside the tick
    /// is logged and reported as `None`.
    pub fn tick(&mut self, snapshot: &PlaybackSnapshot) -> Option<ColorSequence> {
        let evaluation = self.detector.observe(snapshot);
        if !evaluation.changed {
            tracing::debug!(
                track_id = %snapshot.track_id,
                is_playing = snapshot.is_playing,
                "playback unchanged"
            );
            return None;
        }

        match self.process(snapshot) {
            Ok(sequence) => {
                tracing::info!(
                    track_id = %snapshot.track_id,
                    colors = %sequence,
                    "artwork changed, generated new pattern"
                );
                Some(sequence)
            }
            Err(err) => {
                if err.is_tick_local() {
                    tracing::warn!(
                        track_id = %snapshot.track_id,
                        artwork_ref = %snapshot.artwork_ref,
                        error = %err,
                        "skipping tick"
                    );
                } else {
                    tracing::error!(
                        track_id = %snapshot.track_id,
                        artwork_ref = %snapshot.artwork_ref,
                        error = %err,
                        "unexpected failure, skipping tick"
                    );
                }
                None
            }
        }
    }

    fn process(&mut self, snapshot: &PlaybackSnapshot) -> Result<ColorSequence> {
        let bytes = self
            .fetcher
            .fetch(&snapshot.artwork_ref, self.fetch_timeout)?;
        let colors = self.extractor.extract(&bytes)?;
        let sequence = pattern::generate(&colors, &self.options)?;
        self.last_colors = Some(colors);
        Ok(sequence)
    }

    /// Replaces the pattern options. Invalid options are rejected and the
    /// current ones kept.
    pub fn set_options(&mut self, options: PatternOptions) -> Result<()> {
        options.validate()?;
        self.options = options;
        Ok(())
    }

    pub fn options(&self) -> &PatternOptions {
        &self.options
    }

    pub fn detector(&self) -> &ChangeDetector {
        &self.detector
    }

    /// Colours behind the most recent successful tick.
    pub fn last_colors(&self) -> Option<&DominantColorSet> {
        self.last_colors.as_ref()
    }
}

/// Counters reported when a [`Poller`] returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    pub ticks: u64,
    pub dispatched: u64,
    pub source_errors: u64,
}

/// Drives a coordinator from a playback source at a fixed cadence.
#[derive(Debug, Clone)]
pub struct Poller {
    interval: Duration,
    max_ticks: Option<u64>,
    stop: Arc<AtomicBool>,
}

impl Poller {
    /// A poller that runs until stopped.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            max_ticks: None,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_config(config: &PollConfig) -> Self {
        Self::new(config.interval()).with_max_ticks(config.max_ticks)
    }

    pub fn with_max_ticks(mut self, max_ticks: Option<u64>) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    /// Flag that stops the loop before its next tick once set.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Polls until the stop flag is set or `max_ticks` is reached.
    pub fn run<S, F>(
        &self,
        source: &mut S,
        coordinator: &mut PipelineCoordinator<F>,
        outputs: &mut OutputDispatcher,
    ) -> PollStats
    where
        S: PlaybackSource,
        F: ArtworkFetcher,
    {
        let mut stats = PollStats::default();
        tracing::info!(interval = ?self.interval, max_ticks = ?self.max_ticks, "polling started");

        loop {
            if self.should_stop() || self.reached_limit(stats.ticks) {
                break;
            }
            let started = Instant::now();

            match source.poll() {
                Ok(Some(snapshot)) => {
                    if let Some(sequence) = coordinator.tick(&snapshot) {
                        let update = PaletteUpdate {
                            sequence: &sequence,
                            colors: coordinator.last_colors(),
                            artwork_ref: Some(&snapshot.artwork_ref),
                        };
                        outputs.dispatch_update(&update);
                        stats.dispatched += 1;
                    }
                }
                Ok(None) => tracing::debug!("nothing playing"),
                Err(err) => {
                    stats.source_errors += 1;
                    tracing::warn!(error = %err, "playback source failed");
                }
            }

            stats.ticks += 1;
            if self.reached_limit(stats.ticks) {
                break;
            }

            match started.checked_add(self.interval) {
                Some(deadline) => self.sleep_until(deadline),
                None => self.wait_for_stop(),
            }
        }

        tracing::info!(ticks = stats.ticks, dispatched = stats.dispatched, "polling stopped");
        stats
    }

    fn reached_limit(&self, ticks: u64) -> bool {
        self.max_ticks.is_some_and(|max| ticks >= max)
    }

    /// Used when the interval is too long to express as a deadline.
    fn wait_for_stop(&self) {
        while !self.should_stop() {
            thread::sleep(SLEEP_SLICE);
        }
    }

    fn sleep_until(&self, deadline: Instant) {
        loop {
            if self.should_stop() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, collections::HashMap, collections::VecDeque};

    use image::{Rgb, RgbImage};

    use super::*;
    use crate::{extract::encode_png, PaletteError, PatternMode, RecordingDriver};

    #[derive(Default)]
    struct MapFetcher {
        artwork: HashMap<String, Vec<u8>>,
        calls: Cell<usize>,
    }

    impl MapFetcher {
        fn with(mut self, artwork_ref: &str, bytes: Vec<u8>) -> Self {
            self.artwork.insert(artwork_ref.to_string(), bytes);
            self
        }
    }

    impl ArtworkFetcher for MapFetcher {
        fn fetch(&self, artwork_ref: &str, timeout: Duration) -> Result<Vec<u8>> {
            self.calls.set(self.calls.get() + 1);
            self.artwork
                .get(artwork_ref)
                .cloned()
                .ok_or_else(|| PaletteError::FetchTimeout {
                    artwork_ref: artwork_ref.to_string(),
                    timeout,
                })
        }
    }

    struct ScriptedSource {
        script: VecDeque<Result<Option<PlaybackSnapshot>>>,
    }

    impl PlaybackSource for ScriptedSource {
        fn poll(&mut self) -> Result<Option<PlaybackSnapshot>> {
            self.script.pop_front().unwrap_or(Ok(None))
        }
    }

    fn solid_png(color: [u8; 3]) -> Vec<u8> {
        encode_png(&RgbImage::from_pixel(4, 4, Rgb(color)))
    }

    fn coordinator(fetcher: MapFetcher) -> PipelineCoordinator<MapFetcher> {
        PipelineCoordinator::new(
            fetcher,
            ColorExtractor::new(),
            PatternOptions::new(PatternMode::Repeat, 6, 1).unwrap(),
            Duration::from_secs(1),
        )
        .unwrap()
    }

    fn playing(track: &str, art: &str) -> PlaybackSnapshot {
        PlaybackSnapshot::new(track, art, true)
    }

    #[test]
    fn produces_a_sequence_only_when_artwork_changes() {
        let fetcher = MapFetcher::default()
            .with("red", solid_png([255, 0, 0]))
            .with("blue", solid_png([0, 0, 255]));
        let mut coordinator = coordinator(fetcher);

        let sequence = coordinator.tick(&playing("t1", "red")).unwrap();
        assert_eq!(sequence.len(), 6);
        assert!(sequence.iter().all(|c| c.to_string() == "#FF0000"));

        assert!(coordinator.tick(&playing("t1", "red")).is_none());
        assert!(coordinator
            .tick(&PlaybackSnapshot::new("t2", "blue", false))
            .is_none());
        assert_eq!(coordinator.fetcher.calls.get(), 1);

        let sequence = coordinator.tick(&playing("t3", "blue")).unwrap();
        assert_eq!(sequence.as_slice()[0].to_string(), "#0000FF");
        assert_eq!(
            coordinator.last_colors().unwrap().color(0).to_string(),
            "#0000FF"
        );
    }

    #[test]
    fn corrupt_artwork_is_contained_and_not_retried() {
        let fetcher = MapFetcher::default().with("broken", b"\x89PNG\r\n\x1a\ngarbage".to_vec());
        let mut coordinator = coordinator(fetcher);
        let snapshot = playing("t1", "broken");

        assert!(coordinator.tick(&snapshot).is_none());
        assert_eq!(
            coordinator.detector().previous(),
            Some(&snapshot.fingerprint())
        );

        assert!(coordinator.tick(&snapshot).is_none());
        assert_eq!(coordinator.fetcher.calls.get(), 1);
        assert!(coordinator.last_colors().is_none());
    }

    #[test]
    fn fetch_failures_degrade_to_no_update() {
        let mut coordinator = coordinator(MapFetcher::default());
        let snapshot = playing("t1", "https://unreachable.invalid/cover.jpg");

        assert!(coordinator.tick(&snapshot).is_none());
        assert_eq!(
            coordinator.detector().previous(),
            Some(&snapshot.fingerprint())
        );
    }

    #[test]
    fn invalid_options_are_rejected_without_replacing_current() {
        let mut coordinator = coordinator(MapFetcher::default());
        let current = *coordinator.options();

        let invalid = PatternOptions {
            mode: PatternMode::Rotate,
            length: 4,
            step: 0,
        };
        assert!(coordinator.set_options(invalid).is_err());
        assert_eq!(*coordinator.options(), current);

        let result = PipelineCoordinator::new(
            MapFetcher::default(),
            ColorExtractor::new(),
            invalid,
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(PaletteError::InvalidOptions(_))));
    }

    #[test]
    fn poller_dispatches_new_sequences_and_survives_failures() {
        let fetcher = MapFetcher::default()
            .with("red", solid_png([255, 0, 0]))
            .with("green", solid_png([0, 255, 0]));
        let mut coordinator = coordinator(fetcher);

        let mut source = ScriptedSource {
            script: VecDeque::from(vec![
                Ok(Some(playing("t1", "red"))),
                Ok(Some(playing("t1", "red"))),
                Err(PaletteError::Source("api unavailable".to_string())),
                Ok(None),
                Ok(Some(playing("t2", "missing"))),
                Ok(Some(playing("t3", "green"))),
            ]),
        };

        let recorder = RecordingDriver::new();
        let mut outputs = OutputDispatcher::new();
        outputs.register(recorder.clone());

        let poller = Poller::new(Duration::ZERO).with_max_ticks(Some(6));
        let stats = poller.run(&mut source, &mut coordinator, &mut outputs);

        assert_eq!(
            stats,
            PollStats {
                ticks: 6,
                dispatched: 2,
                source_errors: 1,
            }
        );
        let sent = recorder.sent().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].as_slice()[0].to_string(), "#00FF00");
    }

    #[test]
    fn zero_tick_limit_never_polls() {
        let mut coordinator = coordinator(MapFetcher::default());
        let mut source = ScriptedSource {
            script: VecDeque::from(vec![Ok(Some(playing("t1", "red")))]),
        };
        let mut outputs = OutputDispatcher::new();

        let poller = Poller::new(Duration::ZERO).with_max_ticks(Some(0));
        let stats = poller.run(&mut source, &mut coordinator, &mut outputs);

        assert_eq!(stats.ticks, 0);
        assert_eq!(source.script.len(), 1);
    }

    #[test]
    fn unrepresentable_interval_waits_for_the_stop_flag() {
        let mut coordinator = coordinator(MapFetcher::default());
        let mut source = ScriptedSource {
            script: VecDeque::new(),
        };
        let mut outputs = OutputDispatcher::new();

        let poller = Poller::new(Duration::from_secs(u64::MAX)).with_max_ticks(Some(5));
        let stop = poller.stop_handle();
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            stop.store(true, Ordering::SeqCst);
        });

        let stats = poller.run(&mut source, &mut coordinator, &mut outputs);
        stopper.join().unwrap();
        assert_eq!(stats.ticks, 1);
    }

    #[test]
    fn poller_honours_the_stop_flag_between_ticks() {
        let mut coordinator = coordinator(MapFetcher::default());
        let mut source = ScriptedSource {
            script: VecDeque::new(),
        };
        let mut outputs = OutputDispatcher::new();

        let poller = Poller::new(Duration::from_secs(60));
        poller.stop_handle().store(true, Ordering::SeqCst);
        let stats = poller.run(&mut source, &mut coordinator, &mut outputs);
        assert_eq!(stats.ticks, 0);
    }
}
