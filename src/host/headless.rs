//! Host without an audio device.
//!
//! Media is resolved and probed for real, playback positions advance on the
//! tokio clock, and every asynchronous media event a browser-style element
//! would raise is reported: metadata, buffering, stalls, completion, errors.
//! Useful for driving the player from a terminal and for tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::audio::mixer::{Clock, GainGraph, GainNode, TokioClock};
use crate::audio::slot::SlotPair;
use crate::audio::track::Track;
use crate::error::{PlayerError, Result};
use crate::host::probe::{MediaInfo, MediaProbe};
use crate::host::{AudioHost, ContextState, MediaEvent, MediaOutput, SlotEventSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoplayPolicy {
    #[default]
    Allowed,
    /// Playback and context resume are refused until a gesture is granted.
    RequiresGesture,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessConfig {
    pub gain_graph: bool,
    pub autoplay: AutoplayPolicy,
    pub start_suspended: bool,
    pub time_update_interval: Duration,
    /// Loads that take longer than this report `Stalled` once.
    pub stall_timeout: Duration,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            gain_graph: true,
            autoplay: AutoplayPolicy::Allowed,
            start_suspended: false,
            time_update_interval: Duration::from_millis(250),
            stall_timeout: Duration::from_secs(3),
        }
    }
}

/// Stand-in for "the user has interacted with the page".
#[derive(Debug, Clone, Default)]
pub struct GestureGate(Arc<AtomicBool>);

impl GestureGate {
    pub fn grant(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn granted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct HeadlessHost {
    config: HeadlessConfig,
    probe: Arc<dyn MediaProbe>,
    clock: Arc<TokioClock>,
    graph: Option<GainGraph>,
    gesture: GestureGate,
    suspended: Arc<AtomicBool>,
}

impl HeadlessHost {
    pub fn new(config: HeadlessConfig, probe: impl MediaProbe) -> Self {
        let clock = Arc::new(TokioClock::new());
        let graph = config.gain_graph.then(|| GainGraph::new(clock.clone()));
        let suspended = Arc::new(AtomicBool::new(config.start_suspended));
        Self { config, probe: Arc::new(probe), clock, graph, gesture: GestureGate::default(), suspended }
    }

    pub fn gesture(&self) -> GestureGate {
        self.gesture.clone()
    }
}

impl AudioHost for HeadlessHost {
    type Output = HeadlessOutput;

    fn create_outputs(&mut self, events: SlotEventSender) -> SlotPair<HeadlessOutput> {
        SlotPair::from_fn(|slot| HeadlessOutput {
            events: events.for_slot(slot),
            probe: self.probe.clone(),
            gesture: self.gesture.clone(),
            autoplay: self.config.autoplay,
            tick: self.config.time_update_interval,
            stall_timeout: self.config.stall_timeout,
            clock: self.clock.clone(),
            gain: self.graph.as_ref().map(|g| g.node(slot).clone()),
            media: Arc::new(Mutex::new(Media::default())),
            loader: None,
            ticker: None,
        })
    }

    fn gain_graph(&self) -> Option<GainGraph> {
        self.graph.clone()
    }

    fn context_state(&self) -> ContextState {
        if self.suspended.load(Ordering::SeqCst) { ContextState::Suspended } else { ContextState::Running }
    }

    fn resume(&mut self) -> BoxFuture<'static, Result<()>> {
        let gate = self.gesture.clone();
        let policy = self.config.autoplay;
        let suspended = self.suspended.clone();
        async move {
            if policy == AutoplayPolicy::RequiresGesture && !gate.granted() {
                return Err(PlayerError::ContextResume("audio context needs a user gesture".into()));
            }
            suspended.store(false, Ordering::SeqCst);
            Ok(())
        }
        .boxed()
    }
}

#[derive(Debug)]
struct Media {
    /// Bumped on every `load`.
    generation: u64,
    /// Bumped whenever the playback clock starts or stops.
    run: u64,
    track: Option<Track>,
    duration: Option<Duration>,
    paused: bool,
    looping: bool,
    volume: f32,
    offset: Duration,
    started: Option<Instant>,
}

impl Default for Media {
    fn default() -> Self {
        Self {
            generation: 0,
            run: 0,
            track: None,
            duration: None,
            paused: true,
            looping: false,
            volume: 1.0,
            offset: Duration::ZERO,
            started: None,
        }
    }
}

impl Media {
    fn position(&self) -> Duration {
        let raw = self.offset + self.started.map_or(Duration::ZERO, |s| s.elapsed());
        match self.duration {
            Some(d) if self.looping && !d.is_zero() => Duration::from_nanos((raw.as_nanos() % d.as_nanos()) as u64),
            Some(d) => raw.min(d),
            None => raw,
        }
    }

    fn begin_run(&mut self) -> u64 {
        self.run += 1;
        self.started = Some(Instant::now());
        self.run
    }

    fn halt(&mut self) {
        if self.started.is_some() {
            self.offset = self.position();
            self.started = None;
        }
        self.run += 1;
    }
}

pub struct HeadlessOutput {
    events: SlotEventSender,
    probe: Arc<dyn MediaProbe>,
    gesture: GestureGate,
    autoplay: AutoplayPolicy,
    tick: Duration,
    stall_timeout: Duration,
    clock: Arc<TokioClock>,
    gain: Option<GainNode>,
    media: Arc<Mutex<Media>>,
    loader: Option<AbortHandle>,
    ticker: Option<AbortHandle>,
}

impl HeadlessOutput {
    fn media(&self) -> MutexGuard<'_, Media> {
        lock(&self.media)
    }

    /// What this output would currently contribute to the mix.
    pub fn level(&self) -> f32 {
        let m = self.media();
        if m.started.is_none() {
            return 0.0;
        }
        let gain = self.gain.as_ref().map_or(1.0, |g| g.value_at(self.clock.now()));
        m.volume * gain
    }

    fn start_clock(&mut self, run: u64) {
        if let Some(t) = self.ticker.take() {
            t.abort();
        }
        let task = tokio::spawn(run_clock(self.media.clone(), self.events.clone(), run, self.tick));
        self.ticker = Some(task.abort_handle());
    }

    fn stop_tasks(&mut self) {
        for task in [self.loader.take(), self.ticker.take()].into_iter().flatten() {
            task.abort();
        }
    }
}

impl MediaOutput for HeadlessOutput {
    fn load(&mut self, track: &Track) {
        self.stop_tasks();
        let generation = {
            let mut m = self.media();
            m.halt();
            m.generation += 1;
            m.track = Some(track.clone());
            m.duration = None;
            m.offset = Duration::ZERO;
            m.paused = true;
            m.generation
        };
        let loader = Loader {
            media: self.media.clone(),
            events: self.events.clone(),
            probe: self.probe.clone(),
            track: track.clone(),
            generation,
            tick: self.tick,
            stall_timeout: self.stall_timeout,
        };
        self.loader = Some(tokio::spawn(loader.run()).abort_handle());
    }

    fn play(&mut self) -> Result<()> {
        if self.autoplay == AutoplayPolicy::RequiresGesture && !self.gesture.granted() {
            return Err(PlayerError::PlaybackBlocked("user gesture required".into()));
        }
        let run = {
            let mut m = self.media();
            if m.track.is_none() {
                return Err(PlayerError::PlaybackBlocked("no source".into()));
            }
            if !m.paused {
                return Ok(());
            }
            m.paused = false;
            match m.duration {
                Some(d) => {
                    if !m.looping && m.offset >= d {
                        m.offset = Duration::ZERO;
                    }
                    Some(m.begin_run())
                }
                None => None,
            }
        };
        match run {
            Some(run) => self.start_clock(run),
            // Still loading; the loader starts the clock once media is ready.
            None => {
                self.events.send(MediaEvent::Waiting);
            }
        }
        Ok(())
    }

    fn pause(&mut self) {
        {
            let mut m = self.media();
            if m.paused {
                return;
            }
            m.paused = true;
            m.halt();
        }
        if let Some(t) = self.ticker.take() {
            t.abort();
        }
    }

    fn is_paused(&self) -> bool {
        self.media().paused
    }

    fn set_volume(&mut self, volume: f32) {
        self.media().volume = volume;
    }

    fn set_looping(&mut self, looping: bool) {
        let mut m = self.media();
        if m.started.is_some() {
            m.offset = m.position();
            m.started = Some(Instant::now());
        }
        m.looping = looping;
    }

    fn position(&self) -> Duration {
        self.media().position()
    }

    fn duration(&self) -> Option<Duration> {
        self.media().duration
    }
}

impl Drop for HeadlessOutput {
    fn drop(&mut self) {
        self.stop_tasks();
    }
}

fn lock(media: &Mutex<Media>) -> MutexGuard<'_, Media> {
    media.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Loader {
    media: Arc<Mutex<Media>>,
    events: SlotEventSender,
    probe: Arc<dyn MediaProbe>,
    track: Track,
    generation: u64,
    tick: Duration,
    stall_timeout: Duration,
}

impl Loader {
    fn is_current(&self) -> bool {
        lock(&self.media).generation == self.generation
    }

    async fn probe(&self) -> Result<MediaInfo> {
        if !self.probe.is_blocking() {
            return self.probe.probe(&self.track);
        }
        let probe = self.probe.clone();
        let track = self.track.clone();
        let mut probing = tokio::task::spawn_blocking(move || probe.probe(&track));
        let joined = match tokio::time::timeout(self.stall_timeout, &mut probing).await {
            Ok(joined) => joined,
            Err(_) => {
                if self.is_current() {
                    debug!(url = %self.track.url, "media load stalled");
                    self.events.send(MediaEvent::Stalled);
                }
                probing.await
            }
        };
        joined.unwrap_or_else(|e| {
            Err(PlayerError::MediaLoad { locator: self.track.url.clone(), reason: format!("probe task failed: {e}") })
        })
    }

    async fn run(self) {
        let probed = self.probe().await;
        let run = {
            let mut m = lock(&self.media);
            if m.generation != self.generation {
                return;
            }
            match &probed {
                Ok(info) => {
                    m.duration = Some(info.duration);
                    (!m.paused).then(|| m.begin_run())
                }
                Err(_) => {
                    m.paused = true;
                    None
                }
            }
        };

        match probed {
            Ok(info) => {
                debug!(url = %self.track.url, duration = ?info.duration, "media ready");
                self.events.send(MediaEvent::LoadedMetadata(info.duration));
                self.events.send(MediaEvent::CanPlayThrough);
                if let Some(run) = run {
                    run_clock(self.media.clone(), self.events.clone(), run, self.tick).await;
                }
            }
            Err(error) => {
                self.events.send(MediaEvent::Error(error));
            }
        }
    }
}

/// Emits time updates until the run is superseded or the media ends.
async fn run_clock(media: Arc<Mutex<Media>>, events: SlotEventSender, run: u64, tick: Duration) {
    loop {
        let wait = {
            let m = lock(&media);
            if m.run != run {
                return;
            }
            match (m.looping, m.duration) {
                (false, Some(d)) => d.saturating_sub(m.position()).min(tick),
                _ => tick,
            }
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }

        let event = {
            let mut m = lock(&media);
            if m.run != run {
                return;
            }
            let position = m.position();
            match m.duration {
                Some(d) if !m.looping && position >= d => {
                    m.halt();
                    m.paused = true;
                    MediaEvent::Ended
                }
                _ => MediaEvent::TimeUpdate(position),
            }
        };
        trace!(slot = ?events.slot(), ?event, "media clock");
        let ended = event == MediaEvent::Ended;
        if !events.send(event) || ended {
            return;
        }
    }
}
