//! Seam between the player and whatever actually produces sound.
//!
//! A host hands the player two [`MediaOutput`]s and, optionally, a
//! [`GainGraph`]. Outputs react to control calls synchronously and report
//! everything asynchronous (metadata, buffering, completion, failures) as
//! [`SlotEvent`]s on the channel given to [`AudioHost::create_outputs`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::audio::mixer::GainGraph;
use crate::audio::slot::{SlotIndex, SlotPair};
use crate::audio::track::Track;
use crate::error::{PlayerError, Result};

pub mod headless;
pub mod probe;

pub use headless::{AutoplayPolicy, GestureGate, HeadlessConfig, HeadlessHost, HeadlessOutput};
pub use probe::{MediaInfo, MediaProbe, StaticProbe, SymphoniaProbe};

/// One playable media handle.
pub trait MediaOutput: Send + 'static {
    /// Binds `track`, rewinds to zero and starts preloading. Leaves the
    /// output paused. Events still in flight for the previous source must
    /// not be reported after this call.
    fn load(&mut self, track: &Track);

    /// Requests playback. Synchronous refusals are returned; refusals the
    /// host only learns about later arrive as [`MediaEvent::PlayRejected`].
    fn play(&mut self) -> Result<()>;

    fn pause(&mut self);

    fn is_paused(&self) -> bool;

    fn set_volume(&mut self, volume: f32);

    /// Native single-track looping: a looping output never reports
    /// [`MediaEvent::Ended`].
    fn set_looping(&mut self, looping: bool);

    fn position(&self) -> Duration;

    fn duration(&self) -> Option<Duration>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Running,
    /// Audio is held until [`AudioHost::resume`] succeeds.
    Suspended,
}

pub trait AudioHost: Send + 'static {
    type Output: MediaOutput;

    fn create_outputs(&mut self, events: SlotEventSender) -> SlotPair<Self::Output>;

    /// `None` when the host has no per-slot gain stage.
    fn gain_graph(&self) -> Option<GainGraph>;

    fn context_state(&self) -> ContextState {
        ContextState::Running
    }

    fn resume(&mut self) -> BoxFuture<'static, Result<()>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    TimeUpdate(Duration),
    LoadedMetadata(Duration),
    Waiting,
    CanPlayThrough,
    Stalled,
    Ended,
    PlayRejected(String),
    Error(PlayerError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlotEvent {
    pub slot: SlotIndex,
    /// Load generation of the slot when the event was sent.
    pub generation: u64,
    pub event: MediaEvent,
}

/// Sending half handed to each output; tagging with the slot and its current
/// load generation is done here so outputs cannot report under the wrong
/// index, and events queued before a rebind can be told apart.
#[derive(Debug, Clone)]
pub struct SlotEventSender {
    slot: Option<SlotIndex>,
    generations: SlotPair<Arc<AtomicU64>>,
    tx: mpsc::UnboundedSender<SlotEvent>,
}

impl SlotEventSender {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SlotEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let generations = SlotPair::from_fn(|_| Arc::new(AtomicU64::new(0)));
        (Self { slot: None, generations, tx }, rx)
    }

    pub fn for_slot(&self, slot: SlotIndex) -> Self {
        Self { slot: Some(slot), generations: self.generations.clone(), tx: self.tx.clone() }
    }

    /// Counter the player bumps each time `slot` is bound to a new track.
    pub(crate) fn generation(&self, slot: SlotIndex) -> Arc<AtomicU64> {
        self.generations[slot].clone()
    }

    pub fn slot(&self) -> Option<SlotIndex> {
        self.slot
    }

    /// Returns `false` once the player is gone.
    pub fn send(&self, event: MediaEvent) -> bool {
        let Some(slot) = self.slot else {
            tracing::warn!(?event, "media event sent without a slot binding; dropped");
            return false;
        };
        let generation = self.generations[slot].load(Ordering::SeqCst);
        self.tx.send(SlotEvent { slot, generation, event }).is_ok()
    }
}
