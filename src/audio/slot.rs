use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::audio::track::Track;
use crate::error::{PlayerError, Result};
use crate::host::MediaOutput;

/// Selector for one of the two output slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SlotIndex {
    A,
    B,
}

impl SlotIndex {
    pub const ALL: [SlotIndex; 2] = [SlotIndex::A, SlotIndex::B];

    pub fn other(self) -> Self {
        match self {
            SlotIndex::A => SlotIndex::B,
            SlotIndex::B => SlotIndex::A,
        }
    }

    pub fn index(self) -> usize {
        match self {
            SlotIndex::A => 0,
            SlotIndex::B => 1,
        }
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotIndex::A => f.write_str("A"),
            SlotIndex::B => f.write_str("B"),
        }
    }
}

/// Exactly two values addressed by [`SlotIndex`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotPair<T>([T; 2]);

impl<T> SlotPair<T> {
    pub fn new(a: T, b: T) -> Self {
        Self([a, b])
    }

    pub fn from_fn(mut f: impl FnMut(SlotIndex) -> T) -> Self {
        Self([f(SlotIndex::A), f(SlotIndex::B)])
    }

    pub fn map<U>(self, mut f: impl FnMut(SlotIndex, T) -> U) -> SlotPair<U> {
        let [a, b] = self.0;
        SlotPair([f(SlotIndex::A, a), f(SlotIndex::B, b)])
    }

    pub fn into_inner(self) -> [T; 2] {
        self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotIndex, &T)> {
        SlotIndex::ALL.into_iter().zip(self.0.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SlotIndex, &mut T)> {
        SlotIndex::ALL.into_iter().zip(self.0.iter_mut())
    }
}

impl<T> From<[T; 2]> for SlotPair<T> {
    fn from(pair: [T; 2]) -> Self {
        Self(pair)
    }
}

impl<T> std::ops::Index<SlotIndex> for SlotPair<T> {
    type Output = T;
    fn index(&self, slot: SlotIndex) -> &T {
        &self.0[slot.index()]
    }
}

impl<T> std::ops::IndexMut<SlotIndex> for SlotPair<T> {
    fn index_mut(&mut self, slot: SlotIndex) -> &mut T {
        &mut self.0[slot.index()]
    }
}

/// Lifecycle of one slot: `Empty → Loading → Ready → Playing ⇄ Paused`,
/// back to `Loading` whenever a new track is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotState {
    Empty,
    Loading,
    Ready,
    Playing,
    Paused,
}

/// A host output plus the player's bookkeeping for it.
pub(crate) struct Slot<O> {
    pub output: O,
    pub state: SlotState,
    /// Overlay on top of `state` while a gain ramp involving this slot runs.
    pub fading: bool,
    pub track: Option<usize>,
    pub duration: Option<Duration>,
    /// Shared with the slot's event sender; bumped on every bind.
    generation: Arc<AtomicU64>,
}

impl<O: MediaOutput> Slot<O> {
    pub fn new(output: O, generation: Arc<AtomicU64>) -> Self {
        Self { output, state: SlotState::Empty, fading: false, track: None, duration: None, generation }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn load(&mut self, index: usize, track: &Track, volume: f32) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(track = index, generation, name = %track.display_name(), "binding slot source");
        self.track = Some(index);
        self.duration = None;
        self.state = SlotState::Loading;
        self.output.set_volume(volume);
        self.output.load(track);
    }

    pub fn play(&mut self) -> Result<()> {
        if self.track.is_none() {
            return Err(PlayerError::PlaybackBlocked("no source bound".into()));
        }
        self.output.play()?;
        self.state = SlotState::Playing;
        Ok(())
    }

    pub fn pause(&mut self) {
        self.output.pause();
        if self.state == SlotState::Playing {
            self.state = SlotState::Paused;
        }
    }

    pub fn on_metadata(&mut self, duration: Duration) {
        self.duration = Some(duration);
        self.on_ready();
    }

    pub fn on_ready(&mut self) {
        if self.state == SlotState::Loading {
            self.state = SlotState::Ready;
        }
    }

    pub fn on_stopped(&mut self) {
        if self.state == SlotState::Playing {
            self.state = SlotState::Paused;
        }
    }

    pub fn on_error(&mut self) {
        self.state = SlotState::Empty;
        self.duration = None;
    }

    pub fn snapshot(&self, slot: SlotIndex) -> SlotSnapshot {
        SlotSnapshot {
            slot,
            state: self.state,
            fading: self.fading,
            track: self.track,
            duration: self.duration,
            paused: self.output.is_paused(),
            position: self.output.position(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotSnapshot {
    pub slot: SlotIndex,
    pub state: SlotState,
    pub fading: bool,
    pub track: Option<usize>,
    pub duration: Option<Duration>,
    pub paused: bool,
    pub position: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_index_flips_and_indexes() {
        assert_eq!(SlotIndex::A.other(), SlotIndex::B);
        assert_eq!(SlotIndex::B.other().other(), SlotIndex::B);
        let mut pair = SlotPair::new("a", "b");
        assert_eq!(pair[SlotIndex::B], "b");
        pair[SlotIndex::A] = "z";
        assert_eq!(pair, SlotPair::from(["z", "b"]));
        let order: Vec<_> = pair.iter().map(|(slot, _)| slot).collect();
        assert_eq!(order, SlotIndex::ALL);
    }
}
