use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{error, trace};

use crate::error::PlayerError;

/// Everything the player tells its subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    TimeUpdate { position: Duration },
    /// Duration of the active track is known.
    MetadataLoaded { track: usize, duration: Duration },
    /// Active slot started buffering.
    Waiting,
    /// Active slot recovered from buffering.
    CanPlayThrough,
    Stalled,
    Ended { track: usize },
    TrackChange { track: usize },
    Error { track: Option<usize>, error: PlayerError },
}

impl PlayerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            PlayerEvent::TimeUpdate { .. } => EventKind::TimeUpdate,
            PlayerEvent::MetadataLoaded { .. } => EventKind::LoadedMetadata,
            PlayerEvent::Waiting => EventKind::Waiting,
            PlayerEvent::CanPlayThrough => EventKind::CanPlayThrough,
            PlayerEvent::Stalled => EventKind::Stalled,
            PlayerEvent::Ended { .. } => EventKind::Ended,
            PlayerEvent::TrackChange { .. } => EventKind::TrackChange,
            PlayerEvent::Error { .. } => EventKind::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    TimeUpdate,
    LoadedMetadata,
    Waiting,
    CanPlayThrough,
    Stalled,
    Ended,
    TrackChange,
    Error,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::TimeUpdate,
        EventKind::LoadedMetadata,
        EventKind::Waiting,
        EventKind::CanPlayThrough,
        EventKind::Stalled,
        EventKind::Ended,
        EventKind::TrackChange,
        EventKind::Error,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EventKind::TimeUpdate => "timeupdate",
            EventKind::LoadedMetadata => "loadedmetadata",
            EventKind::Waiting => "waiting",
            EventKind::CanPlayThrough => "canplaythrough",
            EventKind::Stalled => "stalled",
            EventKind::Ended => "ended",
            EventKind::TrackChange => "trackchange",
            EventKind::Error => "error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown player event '{0}'")]
pub struct UnknownEvent(pub String);

impl FromStr for EventKind {
    type Err = UnknownEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL.into_iter().find(|k| k.name() == s).ok_or_else(|| UnknownEvent(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type Handler = Arc<dyn Fn(&PlayerEvent) -> anyhow::Result<()> + Send + Sync>;

/// Named-event fan-out with per-subscriber failure isolation, plus a
/// broadcast stream carrying every event.
pub struct EventBus {
    handlers: Mutex<HashMap<EventKind, Vec<(SubscriptionId, Handler)>>>,
    next_id: AtomicU64,
    stream: broadcast::Sender<PlayerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (stream, _) = broadcast::channel(capacity.max(1));
        Self { handlers: Mutex::new(HashMap::new()), next_id: AtomicU64::new(1), stream }
    }

    pub fn on<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&PlayerEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().entry(kind).or_default().push((id, Arc::new(handler)));
        id
    }

    /// Detaches one subscriber, or every subscriber of `kind` when `id` is
    /// `None`. Returns how many were removed.
    pub fn off(&self, kind: EventKind, id: Option<SubscriptionId>) -> usize {
        let mut handlers = self.lock();
        let Some(list) = handlers.get_mut(&kind) else { return 0 };
        let before = list.len();
        match id {
            Some(id) => list.retain(|(sub, _)| *sub != id),
            None => list.clear(),
        }
        before - list.len()
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.lock().get(&kind).map_or(0, Vec::len)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.stream.subscribe()
    }

    /// Delivers `event` to every subscriber of its kind. Handlers run without
    /// the registry lock held, so they may subscribe or unsubscribe.
    pub fn emit(&self, event: &PlayerEvent) {
        let kind = event.kind();
        let handlers: Vec<(SubscriptionId, Handler)> = self.lock().get(&kind).cloned().unwrap_or_default();
        trace!(%kind, subscribers = handlers.len(), "emit");
        for (id, handler) in handlers {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(event)));
            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => format!("{e:#}"),
                Err(payload) => panic_message(payload),
            };
            let err = PlayerError::Subscriber(failure);
            error!(%kind, subscription = id.0, %err, "player event listener error");
        }
        let _ = self.stream.send(event.clone());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<EventKind, Vec<(SubscriptionId, Handler)>>> {
        self.handlers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        return (*msg).to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}
