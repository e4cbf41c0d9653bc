#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::broadcast;

use tandem_audio::audio::mixer::{GainGraph, TokioClock};
use tandem_audio::host::{ContextState, SlotEventSender};
use tandem_audio::{
    AudioHost, CrossfadePlayer, MediaEvent, MediaOutput, PlayerConfig, PlayerError, PlayerEvent, SlotIndex,
    SlotPair, Track,
};

/// Scriptable media element.
#[derive(Debug)]
pub struct MockMedia {
    pub track: Option<Track>,
    pub paused: bool,
    pub volume: f32,
    pub looping: bool,
    pub position: Duration,
    pub duration: Option<Duration>,
    pub loads: usize,
    pub plays: usize,
    /// Plays that fail synchronously.
    pub refuse_plays: usize,
    /// Plays that return `Ok` but leave the element paused.
    pub ignore_plays: usize,
    events: Option<SlotEventSender>,
}

impl Default for MockMedia {
    fn default() -> Self {
        Self {
            track: None,
            paused: true,
            volume: 1.0,
            looping: false,
            position: Duration::ZERO,
            duration: None,
            loads: 0,
            plays: 0,
            refuse_plays: 0,
            ignore_plays: 0,
            events: None,
        }
    }
}

type SharedMedia = Arc<Mutex<MockMedia>>;

pub struct MockOutput {
    media: SharedMedia,
}

impl MediaOutput for MockOutput {
    fn load(&mut self, track: &Track) {
        let mut m = self.media.lock().unwrap();
        m.track = Some(track.clone());
        m.paused = true;
        m.position = Duration::ZERO;
        m.duration = None;
        m.loads += 1;
    }

    fn play(&mut self) -> tandem_audio::Result<()> {
        let mut m = self.media.lock().unwrap();
        m.plays += 1;
        if m.refuse_plays > 0 {
            m.refuse_plays -= 1;
            return Err(PlayerError::PlaybackBlocked("mock refused".into()));
        }
        if m.ignore_plays > 0 {
            m.ignore_plays -= 1;
            return Ok(());
        }
        m.paused = false;
        Ok(())
    }

    fn pause(&mut self) {
        self.media.lock().unwrap().paused = true;
    }

    fn is_paused(&self) -> bool {
        self.media.lock().unwrap().paused
    }

    fn set_volume(&mut self, volume: f32) {
        self.media.lock().unwrap().volume = volume;
    }

    fn set_looping(&mut self, looping: bool) {
        self.media.lock().unwrap().looping = looping;
    }

    fn position(&self) -> Duration {
        self.media.lock().unwrap().position
    }

    fn duration(&self) -> Option<Duration> {
        self.media.lock().unwrap().duration
    }
}

pub struct MockHost {
    media: SlotPair<SharedMedia>,
    gains: Option<GainGraph>,
    suspended: bool,
    resume_error: Option<String>,
}

impl AudioHost for MockHost {
    type Output = MockOutput;

    fn create_outputs(&mut self, events: SlotEventSender) -> SlotPair<MockOutput> {
        SlotPair::from_fn(|slot| {
            self.media[slot].lock().unwrap().events = Some(events.for_slot(slot));
            MockOutput { media: self.media[slot].clone() }
        })
    }

    fn gain_graph(&self) -> Option<GainGraph> {
        self.gains.clone()
    }

    fn context_state(&self) -> ContextState {
        if self.suspended { ContextState::Suspended } else { ContextState::Running }
    }

    fn resume(&mut self) -> BoxFuture<'static, tandem_audio::Result<()>> {
        let result = match &self.resume_error {
            Some(reason) => Err(PlayerError::ContextResume(reason.clone())),
            None => {
                self.suspended = false;
                Ok(())
            }
        };
        futures::future::ready(result).boxed()
    }
}

/// Test-side view of the host after it has been moved into the player.
#[derive(Clone)]
pub struct MockControl {
    media: SlotPair<SharedMedia>,
    pub gains: Option<GainGraph>,
}

impl MockControl {
    pub fn media(&self, slot: SlotIndex) -> MutexGuard<'_, MockMedia> {
        self.media[slot].lock().unwrap()
    }

    pub fn is_paused(&self, slot: SlotIndex) -> bool {
        self.media(slot).paused
    }

    pub fn url(&self, slot: SlotIndex) -> Option<String> {
        self.media(slot).track.as_ref().map(|t| t.url.clone())
    }

    pub fn gain(&self, slot: SlotIndex) -> f32 {
        self.gains.as_ref().expect("host has a gain graph").level(slot)
    }

    pub fn emit(&self, slot: SlotIndex, event: MediaEvent) {
        let sender = self.media(slot).events.clone().expect("outputs created");
        assert!(sender.send(event), "player is gone");
    }
}

pub struct MockBuilder {
    gain_graph: bool,
    suspended: bool,
    resume_error: Option<String>,
}

impl MockBuilder {
    pub fn without_gain_graph(mut self) -> Self {
        self.gain_graph = false;
        self
    }

    pub fn suspended(mut self, resume_error: Option<&str>) -> Self {
        self.suspended = true;
        self.resume_error = resume_error.map(str::to_string);
        self
    }

    pub fn build(self) -> (MockHost, MockControl) {
        let media = SlotPair::from_fn(|_| Arc::new(Mutex::new(MockMedia::default())));
        let gains = self.gain_graph.then(|| GainGraph::new(Arc::new(TokioClock::new())));
        let control = MockControl { media: media.clone(), gains: gains.clone() };
        let host = MockHost { media, gains, suspended: self.suspended, resume_error: self.resume_error };
        (host, control)
    }
}

pub fn mock() -> MockBuilder {
    MockBuilder { gain_graph: true, suspended: false, resume_error: None }
}

pub fn tracks(n: usize) -> Vec<Track> {
    ["Honey Jam", "Peach Prosecco", "Aromatic", "Noon"]
        .iter()
        .take(n)
        .enumerate()
        .map(|(i, name)| Track::new(format!("t{i}"), *name, format!("/track{i}.mp3")))
        .collect()
}

/// Player over a mock host, already initialised with `n` tracks.
pub async fn player_with(
    builder: MockBuilder,
    n: usize,
) -> (CrossfadePlayer<MockHost>, MockControl, broadcast::Receiver<PlayerEvent>) {
    let (host, control) = builder.build();
    let player = CrossfadePlayer::new(host, PlayerConfig::default());
    let rx = player.events();
    player.init(tracks(n), 0).await;
    (player, control, rx)
}

/// Long enough for a default crossfade plus a play retry to run out.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(400)).await;
}

/// Lets the event pump run.
pub async fn pump() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub fn drain(rx: &mut broadcast::Receiver<PlayerEvent>) -> Vec<PlayerEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

pub fn track_changes(events: &[PlayerEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|e| match e {
            PlayerEvent::TrackChange { track } => Some(*track),
            _ => None,
        })
        .collect()
}

pub fn errors(events: &[PlayerEvent]) -> Vec<PlayerError> {
    events
        .iter()
        .filter_map(|e| match e {
            PlayerEvent::Error { error, .. } => Some(error.clone()),
            _ => None,
        })
        .collect()
}
