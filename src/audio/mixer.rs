//! Per-slot gain automation.
//!
//! A [`GainGraph`] holds one [`GainNode`] per output slot and a [`Clock`]
//! shared with the host, so automation scheduled by the player can be sampled
//! by whatever renders the audio. Hosts without a gain stage simply do not
//! provide a graph and the player falls back to hard cuts.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::audio::slot::{SlotIndex, SlotPair};

/// Lowest gain a ramp targets. Linear ramps to exactly zero are avoided so
/// the fade shape matches hosts whose ramps are exponential-safe.
pub const RAMP_FLOOR: f32 = 0.0001;

/// Monotonic audio time as seen by the host.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Duration;
}

/// Clock driven by tokio's time source, so paused test runtimes control it.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self { origin: tokio::time::Instant::now() }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Ramp {
    start: Duration,
    end: Duration,
    from: f32,
    to: f32,
}

/// Automation lane for a single gain value: a resting value plus at most one
/// linear ramp.
#[derive(Debug, Clone, PartialEq)]
pub struct GainParam {
    value: f32,
    ramp: Option<Ramp>,
}

impl GainParam {
    pub fn new(value: f32) -> Self {
        Self { value, ramp: None }
    }

    pub fn value_at(&self, t: Duration) -> f32 {
        let Some(r) = self.ramp else { return self.value };
        if t <= r.start {
            return r.from;
        }
        if t >= r.end || r.end <= r.start {
            return r.to;
        }
        let p = (t - r.start).as_secs_f64() / (r.end - r.start).as_secs_f64();
        r.from + (r.to - r.from) * p as f32
    }

    /// Sets the value immediately, dropping any scheduled ramp.
    pub fn set_value(&mut self, value: f32) {
        self.value = value;
        self.ramp = None;
    }

    /// Drops scheduled automation and freezes the lane at its value at `t`.
    pub fn cancel_and_hold(&mut self, t: Duration) {
        self.value = self.value_at(t);
        self.ramp = None;
    }

    /// Ramps linearly from the value at `start` to `target`, reaching it at
    /// `end`. Replaces any previous ramp.
    pub fn linear_ramp(&mut self, target: f32, start: Duration, end: Duration) {
        let from = self.value_at(start);
        self.value = target;
        self.ramp = Some(Ramp { start, end, from, to: target });
    }

    pub fn is_ramping(&self, t: Duration) -> bool {
        self.ramp.is_some_and(|r| t < r.end)
    }
}

/// Shared handle to a [`GainParam`]; the player writes automation, the host
/// samples it.
#[derive(Debug, Clone)]
pub struct GainNode {
    param: Arc<Mutex<GainParam>>,
}

impl GainNode {
    pub fn new(value: f32) -> Self {
        Self { param: Arc::new(Mutex::new(GainParam::new(value))) }
    }

    fn with<R>(&self, f: impl FnOnce(&mut GainParam) -> R) -> R {
        let mut guard = self.param.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    pub fn value_at(&self, t: Duration) -> f32 {
        self.with(|p| p.value_at(t))
    }

    pub fn set_value(&self, value: f32) {
        self.with(|p| p.set_value(value))
    }

    pub fn cancel_and_hold(&self, t: Duration) {
        self.with(|p| p.cancel_and_hold(t))
    }

    pub fn linear_ramp(&self, target: f32, start: Duration, end: Duration) {
        self.with(|p| p.linear_ramp(target, start, end))
    }
}

/// Two gain nodes and the clock they are scheduled against.
#[derive(Clone)]
pub struct GainGraph {
    clock: Arc<dyn Clock>,
    nodes: SlotPair<GainNode>,
}

impl GainGraph {
    /// Slot A starts audible at unity, slot B silent.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock, nodes: SlotPair::new(GainNode::new(1.0), GainNode::new(0.0)) }
    }

    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    pub fn node(&self, slot: SlotIndex) -> &GainNode {
        &self.nodes[slot]
    }

    /// Current gain of `slot`.
    pub fn level(&self, slot: SlotIndex) -> f32 {
        self.nodes[slot].value_at(self.now())
    }

    /// Schedules a crossfade from `outgoing` to `incoming` over `window` and
    /// returns the time at which it completes.
    ///
    /// Both lanes are frozen at their current values first, so a crossfade
    /// started while another is running continues from where the gains are
    /// rather than jumping. A `fresh` incoming slot (new media bound) starts
    /// from [`RAMP_FLOOR`].
    pub fn crossfade(
        &self,
        incoming: SlotIndex,
        outgoing: SlotIndex,
        fresh: bool,
        target: f32,
        window: Duration,
    ) -> Duration {
        let now = self.now();
        let end = now + window;
        let inc = self.node(incoming);
        let out = self.node(outgoing);

        inc.cancel_and_hold(now);
        out.cancel_and_hold(now);
        if fresh {
            inc.set_value(RAMP_FLOOR);
        }
        inc.linear_ramp(target, now, end);
        out.linear_ramp(RAMP_FLOOR, now, end);
        end
    }

    /// Stops all automation, holding both lanes where they are.
    pub fn cancel_all(&self) {
        let now = self.now();
        for (_, node) in self.nodes.iter() {
            node.cancel_and_hold(now);
        }
    }
}

impl std::fmt::Debug for GainGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let now = self.now();
        f.debug_struct("GainGraph")
            .field("now", &now)
            .field("a", &self.nodes[SlotIndex::A].value_at(now))
            .field("b", &self.nodes[SlotIndex::B].value_at(now))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct ManualClock(AtomicU64);

    impl ManualClock {
        fn set_ms(&self, ms: u64) {
            self.0.store(ms, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Duration {
            Duration::from_millis(self.0.load(Ordering::SeqCst))
        }
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn linear_ramp_interpolates() {
        let mut p = GainParam::new(0.0);
        p.linear_ramp(1.0, ms(100), ms(200));
        assert_eq!(p.value_at(ms(50)), 0.0);
        assert!((p.value_at(ms(150)) - 0.5).abs() < 1e-6);
        assert_eq!(p.value_at(ms(250)), 1.0);
        assert!(p.is_ramping(ms(199)));
        assert!(!p.is_ramping(ms(200)));
    }

    #[test]
    fn cancel_and_hold_freezes_mid_ramp() {
        let mut p = GainParam::new(1.0);
        p.linear_ramp(0.0, ms(0), ms(100));
        p.cancel_and_hold(ms(25));
        assert!((p.value_at(ms(500)) - 0.75).abs() < 1e-6);
        assert!(!p.is_ramping(ms(30)));
    }

    #[test]
    fn crossfade_moves_both_lanes() {
        let clock = Arc::new(ManualClock::default());
        let graph = GainGraph::new(clock.clone());
        graph.node(SlotIndex::A).set_value(0.7);

        let end = graph.crossfade(SlotIndex::B, SlotIndex::A, true, 0.7, ms(120));
        assert_eq!(end, ms(120));
        assert!((graph.level(SlotIndex::B) - RAMP_FLOOR).abs() < 1e-6);
        assert!((graph.level(SlotIndex::A) - 0.7).abs() < 1e-6);

        clock.set_ms(60);
        let mid_b = graph.level(SlotIndex::B);
        let mid_a = graph.level(SlotIndex::A);
        assert!(mid_b > 0.3 && mid_b < 0.4, "incoming halfway: {mid_b}");
        assert!(mid_a > 0.3 && mid_a < 0.4, "outgoing halfway: {mid_a}");

        clock.set_ms(120);
        assert!((graph.level(SlotIndex::B) - 0.7).abs() < 1e-6);
        assert!((graph.level(SlotIndex::A) - RAMP_FLOOR).abs() < 1e-6);
    }

    #[test]
    fn superseding_crossfade_continues_from_current_gain() {
        let clock = Arc::new(ManualClock::default());
        let graph = GainGraph::new(clock.clone());
        graph.node(SlotIndex::A).set_value(1.0);
        graph.crossfade(SlotIndex::B, SlotIndex::A, true, 1.0, ms(100));

        clock.set_ms(50);
        let held = graph.level(SlotIndex::A);
        graph.crossfade(SlotIndex::B, SlotIndex::A, true, 1.0, ms(100));
        assert!((graph.level(SlotIndex::A) - held).abs() < 1e-6);
        assert!((graph.level(SlotIndex::B) - RAMP_FLOOR).abs() < 1e-6);

        clock.set_ms(150);
        assert!((graph.level(SlotIndex::B) - 1.0).abs() < 1e-6);
    }
}
