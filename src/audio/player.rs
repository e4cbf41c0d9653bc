use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, Mutex, MutexGuard};
use tracing::{debug, info, trace, warn};

use crate::audio::mixer::GainGraph;
use crate::audio::slot::{Slot, SlotIndex, SlotPair, SlotSnapshot};
use crate::audio::track::{Playlist, Track};
use crate::audio::transition::Transition;
use crate::error::PlayerError;
use crate::events::{EventBus, EventKind, PlayerEvent, SubscriptionId};
use crate::host::{AudioHost, ContextState, MediaEvent, MediaOutput, SlotEvent, SlotEventSender};

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerConfig {
    /// Length of the gain ramps on a track switch.
    pub crossfade: Duration,
    /// Extra wait after the ramps before the switch is finalized.
    pub finalize_grace: Duration,
    /// Wait before retrying a play request that did not take.
    pub retry_delay: Duration,
    pub initial_volume: f32,
    pub event_capacity: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            crossfade: Duration::from_millis(120),
            finalize_grace: Duration::from_millis(10),
            retry_delay: Duration::from_millis(150),
            initial_volume: 0.7,
            event_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerSnapshot {
    pub active: SlotIndex,
    pub current_index: usize,
    pub pending_target: Option<usize>,
    pub looping: bool,
    pub volume: f32,
    pub playlist_len: usize,
    pub slots: [SlotSnapshot; 2],
}

struct Inner<H: AudioHost> {
    host: H,
    slots: SlotPair<Slot<H::Output>>,
    gains: Option<GainGraph>,
    active: SlotIndex,
    playlist: Playlist,
    current: usize,
    looping: bool,
    volume: f32,
    epoch: u64,
    /// Switch whose gain ramps are running.
    pending: Option<Transition>,
    /// Switch that is promoted but still has a play retry scheduled.
    settling: Option<Transition>,
    outbox: Vec<PlayerEvent>,
}

impl<H: AudioHost> Inner<H> {
    fn emit(&mut self, event: PlayerEvent) {
        self.outbox.push(event);
    }

    fn report(&mut self, track: Option<usize>, error: PlayerError) {
        if error.is_user_facing() {
            warn!(?track, %error, "playback error");
        } else {
            info!(?track, %error, "playback error");
        }
        self.emit(PlayerEvent::Error { track, error });
    }

    fn play_slot(&mut self, slot: SlotIndex) {
        if let Err(error) = self.slots[slot].play() {
            let track = self.slots[slot].track;
            self.report(track, error);
        }
    }

    /// Drops both in-flight transitions, aborting their tasks, and freezes
    /// the gain lanes where they are.
    fn cancel_transitions(&mut self) -> Option<Transition> {
        self.settling = None;
        let pending = self.pending.take();
        if pending.is_some() {
            if let Some(graph) = &self.gains {
                graph.cancel_all();
            }
            for (_, slot) in self.slots.iter_mut() {
                slot.fading = false;
            }
        }
        pending
    }

    fn next_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }

    fn effective_index(&self) -> usize {
        self.pending.as_ref().map_or(self.current, |t| t.target)
    }

    fn announce_metadata(&mut self, slot: SlotIndex) {
        let s = &self.slots[slot];
        if let (Some(track), Some(duration)) = (s.track, s.duration) {
            self.emit(PlayerEvent::MetadataLoaded { track, duration });
        }
    }

    fn promote(&mut self, winner: SlotIndex, target: usize) {
        self.active = winner;
        self.current = target;
        info!(slot = %winner, track = target, "track switch complete");
        self.emit(PlayerEvent::TrackChange { track: target });
        self.announce_metadata(winner);
    }

    fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            active: self.active,
            current_index: self.current,
            pending_target: self.pending.as_ref().map(|t| t.target),
            looping: self.looping,
            volume: self.volume,
            playlist_len: self.playlist.len(),
            slots: [
                self.slots[SlotIndex::A].snapshot(SlotIndex::A),
                self.slots[SlotIndex::B].snapshot(SlotIndex::B),
            ],
        }
    }
}

struct Shared<H: AudioHost> {
    state: Mutex<Inner<H>>,
    bus: EventBus,
    config: PlayerConfig,
}

/// Two-slot crossfading player.
///
/// Cloning yields another handle to the same player. All control methods are
/// infallible from the caller's point of view; failures surface as
/// [`PlayerEvent::Error`]. Must be created inside a tokio runtime.
pub struct CrossfadePlayer<H: AudioHost> {
    shared: Arc<Shared<H>>,
}

impl<H: AudioHost> Clone for CrossfadePlayer<H> {
    fn clone(&self) -> Self {
        Self { shared: self.shared.clone() }
    }
}

/// Handle that does not keep the player alive; for subscribers that need to
/// call back into the player they listen to.
pub struct WeakPlayer<H: AudioHost> {
    shared: Weak<Shared<H>>,
}

impl<H: AudioHost> Clone for WeakPlayer<H> {
    fn clone(&self) -> Self {
        Self { shared: self.shared.clone() }
    }
}

impl<H: AudioHost> WeakPlayer<H> {
    pub fn upgrade(&self) -> Option<CrossfadePlayer<H>> {
        self.shared.upgrade().map(|shared| CrossfadePlayer { shared })
    }
}

impl<H: AudioHost> CrossfadePlayer<H> {
    pub fn downgrade(&self) -> WeakPlayer<H> {
        WeakPlayer { shared: Arc::downgrade(&self.shared) }
    }

    pub fn new(mut host: H, config: PlayerConfig) -> Self {
        let (events, rx) = SlotEventSender::channel();
        let generations = SlotPair::from_fn(|slot| events.generation(slot));
        let mut slots =
            host.create_outputs(events).map(|slot, output| Slot::new(output, generations[slot].clone()));
        let gains = host.gain_graph();
        let volume = config.initial_volume.clamp(0.0, 1.0);

        for (_, slot) in slots.iter_mut() {
            slot.output.set_volume(volume);
        }
        if let Some(graph) = &gains {
            graph.node(SlotIndex::A).set_value(volume);
            graph.node(SlotIndex::B).set_value(0.0);
        }
        info!(
            gain_graph = gains.is_some(),
            crossfade_ms = config.crossfade.as_millis() as u64,
            volume,
            "crossfade player ready"
        );

        let inner = Inner {
            host,
            slots,
            gains,
            active: SlotIndex::A,
            playlist: Playlist::default(),
            current: 0,
            looping: false,
            volume,
            epoch: 0,
            pending: None,
            settling: None,
            outbox: Vec::new(),
        };
        let shared = Arc::new(Shared {
            state: Mutex::new(inner),
            bus: EventBus::new(config.event_capacity),
            config,
        });
        tokio::spawn(pump(Arc::downgrade(&shared), rx));
        Self { shared }
    }

    /// Replaces the playlist and binds the start track to slot A without
    /// playing it. An empty playlist leaves the player idle.
    pub async fn init(&self, playlist: impl Into<Playlist>, start: usize) {
        let playlist = playlist.into();
        let mut guard = self.lock().await;
        let inner = &mut *guard;

        if let Some(prev) = inner.cancel_transitions() {
            debug!(superseded = prev.target, "init cancels in-flight switch");
        }
        inner.next_epoch();
        for (_, slot) in inner.slots.iter_mut() {
            slot.pause();
        }

        inner.playlist = playlist;
        inner.active = SlotIndex::A;
        inner.current = inner.playlist.clamp_index(start);
        if let Some(graph) = &inner.gains {
            graph.node(SlotIndex::A).set_value(inner.volume);
            graph.node(SlotIndex::B).set_value(0.0);
        }

        match inner.playlist.get(inner.current).cloned() {
            Some(track) => {
                info!(tracks = inner.playlist.len(), start = inner.current, name = %track.display_name(), "playlist loaded");
                let (current, volume) = (inner.current, inner.volume);
                inner.slots[SlotIndex::A].load(current, &track, volume);
            }
            None => info!("empty playlist; player idle"),
        }
        self.release(guard);
    }

    /// Starts the active slot, resuming a suspended audio context first.
    pub async fn play(&self) {
        let mut guard = self.lock().await;
        if guard.playlist.is_empty() {
            return;
        }

        if guard.host.context_state() == ContextState::Suspended {
            debug!("resuming suspended audio context");
            let resume = guard.host.resume();
            self.release(guard);
            let resumed = resume.await;
            guard = self.lock().await;
            if let Err(error) = resumed {
                let track = Some(guard.current);
                guard.report(track, error);
                return self.release(guard);
            }
            if guard.playlist.is_empty() {
                return;
            }
        }

        let inner = &mut *guard;
        let target = match inner.pending.as_mut() {
            Some(t) => {
                t.should_play = true;
                t.winner
            }
            None => inner.active,
        };
        inner.play_slot(target);
        self.release(guard);
    }

    /// Pauses both slots. Safe in any state.
    pub async fn pause(&self) {
        let mut guard = self.lock().await;
        let inner = &mut *guard;
        inner.settling = None;
        if let Some(t) = inner.pending.as_mut() {
            t.should_play = false;
        }
        for (_, slot) in inner.slots.iter_mut() {
            slot.pause();
        }
        self.release(guard);
    }

    /// Switches to the track at `index`, crossfading when the host has a gain
    /// graph. A switch already in flight is superseded, never queued.
    pub async fn set_track(&self, index: usize, should_play: bool) {
        let mut guard = self.lock().await;
        let inner = &mut *guard;
        let len = inner.playlist.len();
        if len == 0 {
            return;
        }
        let Some(track) = inner.playlist.get(index).cloned() else {
            let error = PlayerError::TrackOutOfRange { index, len };
            warn!(%error, "ignoring track switch");
            return;
        };

        if let Some(t) = inner.pending.as_mut().filter(|t| t.target == index) {
            debug!(track = index, should_play, "switch to this track already in flight");
            t.should_play = should_play;
            return self.release(guard);
        }

        if index == inner.current && inner.pending.is_none() {
            inner.settling = None;
            let active = inner.active;
            if should_play {
                inner.play_slot(active);
            } else {
                inner.slots[active].pause();
            }
            return self.release(guard);
        }

        let id = inner.next_epoch();
        inner.settling = None;
        if let Some(prev) = inner.pending.take() {
            let superseded = PlayerError::TransitionSuperseded(prev.target);
            debug!(%superseded, track = index, "superseding in-flight switch");
        }

        let volume = inner.volume;
        let reverting = index == inner.current;
        let winner = if reverting { inner.active } else { inner.active.other() };
        let loser = winner.other();
        if reverting {
            info!(track = index, "returning to current track");
        } else {
            info!(track = index, name = %track.display_name(), slot = %winner, "switching track");
            inner.slots[winner].load(index, &track, volume);
        }

        match inner.gains.clone() {
            Some(graph) => {
                let config = &self.shared.config;
                let fade_end = graph.crossfade(winner, loser, !reverting, volume, config.crossfade);
                inner.slots[winner].fading = true;
                inner.slots[loser].fading = true;
                // The incoming slot plays through the ramp so its media is
                // decoding by the time it is promoted.
                if !reverting || should_play {
                    inner.play_slot(winner);
                }

                let mut transition = Transition::new(id, index, winner, should_play, fade_end);
                let delay = config.crossfade + config.finalize_grace;
                let task = tokio::spawn(Self::finalize_after(self.shared.clone(), id, delay));
                transition.attach(task.abort_handle());
                inner.pending = Some(transition);
            }
            None => {
                debug!(track = index, "no gain graph; hard cut");
                inner.slots[loser].pause();
                if should_play {
                    inner.play_slot(winner);
                }
                if winner != inner.active {
                    inner.promote(winner, index);
                }
                let transition = Transition::new(id, index, winner, should_play, Duration::ZERO);
                self.settle(inner, transition);
            }
        }
        self.release(guard);
    }

    pub async fn next(&self) {
        let target = {
            let guard = self.lock().await;
            guard.playlist.wrap_next(guard.effective_index())
        };
        if let Some(index) = target {
            self.set_track(index, true).await;
        }
    }

    pub async fn previous(&self) {
        let target = {
            let guard = self.lock().await;
            guard.playlist.wrap_prev(guard.effective_index())
        };
        if let Some(index) = target {
            self.set_track(index, true).await;
        }
    }

    /// Native single-track looping on both slots.
    pub async fn set_loop(&self, looping: bool) {
        let mut guard = self.lock().await;
        let inner = &mut *guard;
        inner.looping = looping;
        for (_, slot) in inner.slots.iter_mut() {
            slot.output.set_looping(looping);
        }
        debug!(looping, "loop mode set");
        self.release(guard);
    }

    /// Clamps to `[0, 1]` and applies to both slots and the active gain lane.
    /// NaN is ignored.
    pub async fn set_volume(&self, volume: f32) {
        if volume.is_nan() {
            warn!("ignoring NaN volume");
            return;
        }
        let volume = volume.clamp(0.0, 1.0);
        let mut guard = self.lock().await;
        let inner = &mut *guard;
        inner.volume = volume;
        for (_, slot) in inner.slots.iter_mut() {
            slot.output.set_volume(volume);
        }
        if let Some(graph) = &inner.gains {
            match &inner.pending {
                // Retarget the running fade-in instead of cutting it short.
                Some(t) => {
                    let now = graph.now();
                    let node = graph.node(t.winner);
                    node.cancel_and_hold(now);
                    node.linear_ramp(volume, now, t.fade_end.max(now));
                }
                None => graph.node(inner.active).set_value(volume),
            }
        }
        debug!(volume, "volume set");
        self.release(guard);
    }

    pub async fn volume(&self) -> f32 {
        self.lock().await.volume
    }

    /// Index of the track the active slot is bound to.
    pub async fn current_index(&self) -> usize {
        self.lock().await.current
    }

    pub async fn is_looping(&self) -> bool {
        self.lock().await.looping
    }

    pub async fn position(&self) -> Duration {
        let guard = self.lock().await;
        guard.slots[guard.active].output.position()
    }

    pub async fn duration(&self) -> Option<Duration> {
        let guard = self.lock().await;
        let slot = &guard.slots[guard.active];
        slot.duration.or_else(|| slot.output.duration())
    }

    pub async fn current_track(&self) -> Option<Track> {
        let guard = self.lock().await;
        guard.playlist.get(guard.current).cloned()
    }

    pub async fn playlist(&self) -> Playlist {
        self.lock().await.playlist.clone()
    }

    pub async fn snapshot(&self) -> PlayerSnapshot {
        self.lock().await.snapshot()
    }

    pub fn on<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&PlayerEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.shared.bus.on(kind, handler)
    }

    pub fn off(&self, kind: EventKind, id: Option<SubscriptionId>) -> usize {
        self.shared.bus.off(kind, id)
    }

    pub fn events(&self) -> broadcast::Receiver<PlayerEvent> {
        self.shared.bus.subscribe()
    }

    async fn lock(&self) -> MutexGuard<'_, Inner<H>> {
        self.shared.state.lock().await
    }

    /// Unlocks, then delivers whatever events the locked section produced.
    fn release(&self, mut guard: MutexGuard<'_, Inner<H>>) {
        let events = std::mem::take(&mut guard.outbox);
        drop(guard);
        for event in &events {
            self.shared.bus.emit(event);
        }
    }

    async fn finalize_after(shared: Arc<Shared<H>>, id: u64, delay: Duration) {
        tokio::time::sleep(delay).await;
        Self { shared }.finalize(id).await;
    }

    async fn finalize(&self, id: u64) {
        let mut guard = self.lock().await;
        let inner = &mut *guard;
        if inner.pending.as_ref().map(|t| t.id) != Some(id) {
            debug!(id, "stale crossfade finalize ignored");
            return;
        }
        let Some(mut transition) = inner.pending.take() else { return };
        transition.disarm();

        let (winner, loser) = (transition.winner, transition.loser());
        inner.slots[loser].pause();
        inner.slots[loser].fading = false;
        inner.slots[winner].fading = false;
        if let Some(graph) = &inner.gains {
            graph.node(winner).set_value(inner.volume);
        }
        if winner != inner.active {
            inner.promote(winner, transition.target);
        }
        self.settle(inner, transition);
        self.release(guard);
    }

    /// Brings the winner's play state in line with the request, scheduling a
    /// single play retry when the host left it paused.
    fn settle(&self, inner: &mut Inner<H>, mut transition: Transition) {
        let winner = transition.winner;
        let paused = inner.slots[winner].output.is_paused();
        if !transition.should_play {
            if !paused {
                debug!(track = transition.target, "pausing after track change (autoplay off)");
                inner.slots[winner].pause();
            }
            return transition.finish();
        }
        if !paused {
            return transition.finish();
        }

        debug!(track = transition.target, "playback did not start; retrying once");
        let delay = self.shared.config.retry_delay;
        let task = tokio::spawn(Self::retry_after(self.shared.clone(), transition.id, delay));
        transition.attach(task.abort_handle());
        inner.settling = Some(transition);
    }

    async fn retry_after(shared: Arc<Shared<H>>, id: u64, delay: Duration) {
        tokio::time::sleep(delay).await;
        Self { shared }.retry(id).await;
    }

    async fn retry(&self, id: u64) {
        let mut guard = self.lock().await;
        let inner = &mut *guard;
        if inner.settling.as_ref().map(|t| t.id) != Some(id) {
            debug!(id, "stale play retry ignored");
            return;
        }
        let Some(transition) = inner.settling.take() else { return };
        let winner = transition.winner;
        transition.finish();
        if winner != inner.active {
            return;
        }

        let track = inner.slots[winner].track;
        match inner.slots[winner].play() {
            Err(error) => inner.report(track, error),
            Ok(()) if inner.slots[winner].output.is_paused() => {
                inner.report(track, PlayerError::PlaybackBlocked("playback did not start after retry".into()))
            }
            Ok(()) => debug!(?track, "play retry succeeded"),
        }
        self.release(guard);
    }

    async fn on_slot_event(&self, event: SlotEvent) {
        let mut guard = self.lock().await;
        let inner = &mut *guard;
        let SlotEvent { slot, generation, event } = event;
        if generation != inner.slots[slot].generation() {
            trace!(%slot, generation, ?event, "dropping event from a previous binding");
            return;
        }
        let is_active = slot == inner.active;
        let track = inner.slots[slot].track;

        match event {
            MediaEvent::TimeUpdate(position) => {
                if is_active {
                    inner.emit(PlayerEvent::TimeUpdate { position });
                }
            }
            MediaEvent::LoadedMetadata(duration) => {
                inner.slots[slot].on_metadata(duration);
                if is_active {
                    inner.announce_metadata(slot);
                } else {
                    debug!(%slot, ?duration, "standby slot metadata held until promotion");
                }
            }
            MediaEvent::Waiting => {
                if is_active {
                    inner.emit(PlayerEvent::Waiting);
                }
            }
            MediaEvent::CanPlayThrough => {
                inner.slots[slot].on_ready();
                if is_active {
                    inner.emit(PlayerEvent::CanPlayThrough);
                }
            }
            MediaEvent::Stalled => {
                if is_active {
                    inner.emit(PlayerEvent::Stalled);
                }
            }
            MediaEvent::Ended => {
                inner.slots[slot].on_stopped();
                // The outgoing slot of a pending switch has already been replaced.
                let outgoing = inner.pending.as_ref().is_some_and(|t| t.loser() == slot);
                match track {
                    Some(track) if is_active && !outgoing => inner.emit(PlayerEvent::Ended { track }),
                    _ => trace!(%slot, ?track, "end of a slot that is not playing out"),
                }
            }
            MediaEvent::PlayRejected(reason) => {
                inner.slots[slot].on_stopped();
                inner.report(track, PlayerError::PlaybackBlocked(reason));
            }
            MediaEvent::Error(error) => {
                inner.slots[slot].on_error();
                inner.report(track, error);
            }
        }
        self.release(guard);
    }
}

async fn pump<H: AudioHost>(shared: Weak<Shared<H>>, mut rx: mpsc::UnboundedReceiver<SlotEvent>) {
    while let Some(event) = rx.recv().await {
        let Some(shared) = shared.upgrade() else { break };
        CrossfadePlayer { shared }.on_slot_event(event).await;
    }
    debug!("slot event pump stopped");
}
