//! What happens when a track finishes.
//!
//! The player only reports `Ended`; whether to repeat, advance or stop is a
//! listening-session decision made here.

use std::sync::{Arc, Mutex};

use serde::Deserialize;
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::audio::player::{CrossfadePlayer, WeakPlayer};
use crate::events::{EventKind, PlayerEvent, SubscriptionId};
use crate::host::AudioHost;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    /// Play through the playlist once.
    None,
    /// Repeat the current track; the host loops natively.
    #[default]
    Track,
    /// Advance through the playlist and wrap around at the end.
    Queue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndAction {
    Replay,
    Advance(usize),
    Stop,
}

pub fn on_track_end(mode: LoopMode, index: usize, len: usize) -> EndAction {
    if len == 0 {
        return EndAction::Stop;
    }
    match mode {
        LoopMode::Track => EndAction::Replay,
        LoopMode::Queue => EndAction::Advance((index + 1) % len),
        LoopMode::None if index + 1 < len => EndAction::Advance(index + 1),
        LoopMode::None => EndAction::Stop,
    }
}

pub struct ListeningSession<H: AudioHost> {
    player: CrossfadePlayer<H>,
    mode: Arc<Mutex<LoopMode>>,
    stopped: Arc<Notify>,
    subscription: SubscriptionId,
}

impl<H: AudioHost> ListeningSession<H> {
    pub async fn start(player: &CrossfadePlayer<H>, mode: LoopMode) -> Self {
        let shared_mode = Arc::new(Mutex::new(mode));
        let stopped = Arc::new(Notify::new());

        let weak = player.downgrade();
        let (m, s) = (shared_mode.clone(), stopped.clone());
        let subscription = player.on(EventKind::Ended, move |event| {
            if let PlayerEvent::Ended { track } = event {
                let mode = *m.lock().unwrap_or_else(|p| p.into_inner());
                tokio::spawn(handle_end(weak.clone(), s.clone(), mode, *track));
            }
            Ok(())
        });

        player.set_loop(mode == LoopMode::Track).await;
        info!(?mode, "listening session started");
        Self { player: player.clone(), mode: shared_mode, stopped, subscription }
    }

    pub async fn set_mode(&self, mode: LoopMode) {
        *self.mode.lock().unwrap_or_else(|p| p.into_inner()) = mode;
        self.player.set_loop(mode == LoopMode::Track).await;
        debug!(?mode, "loop mode changed");
    }

    pub fn mode(&self) -> LoopMode {
        *self.mode.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Resolves once the playlist has played out in [`LoopMode::None`].
    pub async fn stopped(&self) {
        self.stopped.notified().await;
    }
}

impl<H: AudioHost> Drop for ListeningSession<H> {
    fn drop(&mut self) {
        self.player.off(EventKind::Ended, Some(self.subscription));
    }
}

async fn handle_end<H: AudioHost>(player: WeakPlayer<H>, stopped: Arc<Notify>, mode: LoopMode, track: usize) {
    let Some(player) = player.upgrade() else { return };
    let len = player.playlist().await.len();
    match on_track_end(mode, track, len) {
        EndAction::Replay => player.set_track(track, true).await,
        EndAction::Advance(next) => {
            debug!(from = track, to = next, "advancing after track end");
            player.set_track(next, true).await;
        }
        EndAction::Stop => {
            info!(track, "end of playlist");
            stopped.notify_one();
        }
    }
}
