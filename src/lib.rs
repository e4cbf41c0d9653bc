//! Dual-slot crossfading music player core.
//!
//! [`CrossfadePlayer`] drives two media outputs supplied by an [`AudioHost`],
//! switching between them with short gain ramps. [`HeadlessHost`] is a
//! complete host with no audio device, used by the `tandem` binary and tests.

pub mod audio;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod session;
pub mod utils;

pub use audio::player::{CrossfadePlayer, PlayerConfig, PlayerSnapshot, WeakPlayer};
pub use audio::slot::{SlotIndex, SlotPair, SlotSnapshot, SlotState};
pub use audio::track::{Locator, Playlist, Track};
pub use error::{PlayerError, Result};
pub use events::{EventKind, PlayerEvent, SubscriptionId};
pub use host::{AudioHost, HeadlessConfig, HeadlessHost, MediaEvent, MediaOutput};
pub use session::{ListeningSession, LoopMode};
