use std::time::Duration;

use tokio::task::AbortHandle;

use crate::audio::slot::SlotIndex;

/// One in-flight track switch.
///
/// The scheduled task that completes the switch is owned through an abort
/// handle: dropping a `Transition` without calling [`Transition::finish`]
/// cancels that task. Every step of the task also compares its `id` against
/// the player's current transition before touching any state.
#[derive(Debug)]
pub(crate) struct Transition {
    pub id: u64,
    pub target: usize,
    /// Slot that is audible and authoritative once the switch completes.
    pub winner: SlotIndex,
    pub should_play: bool,
    pub fade_end: Duration,
    task: Option<AbortHandle>,
}

impl Transition {
    pub fn new(id: u64, target: usize, winner: SlotIndex, should_play: bool, fade_end: Duration) -> Self {
        Self { id, target, winner, should_play, fade_end, task: None }
    }

    pub fn attach(&mut self, task: AbortHandle) {
        if let Some(old) = self.task.replace(task) {
            old.abort();
        }
    }

    pub fn loser(&self) -> SlotIndex {
        self.winner.other()
    }

    /// Forgets the cancellation handle. The scheduled task calls this on
    /// its own transition so that dropping it does not abort the caller.
    pub fn disarm(&mut self) {
        self.task = None;
    }

    pub fn finish(mut self) {
        self.disarm();
    }
}

impl Drop for Transition {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
