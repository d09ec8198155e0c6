use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Unarmed,
    /// A timer task is sleeping and will flush once it wakes up.
    Armed,
    /// The timer went off and a batch is being written.
    Firing,
}

/// Handed to the task that waits for the delay. The task must stop once `token` is cancelled and
/// present `generation` to [DebounceTimer::fire].
#[derive(Debug)]
pub struct Ticket {
    pub generation: u64,
    pub token: CancellationToken,
}

/// Bookkeeping for the single flush timer of a store. It doesn't sleep by itself, the owner
/// spawns a task per [Ticket].
///
/// Every arm bumps the generation, so a task that wakes up after being replaced is ignored even
/// if it missed the cancellation.
#[derive(Debug)]
pub struct DebounceTimer {
    state: TimerState,
    generation: u64,
    cancel: Option<CancellationToken>,
}

impl Default for DebounceTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl DebounceTimer {
    pub fn new() -> Self {
        Self {
            state: TimerState::Unarmed,
            generation: 0,
            cancel: None,
        }
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    /// Starts a new quiet period. A previously armed timer is cancelled. A flush already in
    /// progress is left alone, it just no longer owns the timer.
    pub fn arm(&mut self) -> Ticket {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        self.generation += 1;
        let token = CancellationToken::new();
        self.cancel = Some(token.clone());
        self.state = TimerState::Armed;
        Ticket {
            generation: self.generation,
            token,
        }
    }

    /// Called when the delay of `generation` elapsed. Returns whether the caller should flush.
    pub fn fire(&mut self, generation: u64) -> bool {
        if self.state != TimerState::Armed || self.generation != generation {
            return false;
        }
        self.cancel = None;
        self.state = TimerState::Firing;
        true
    }

    /// Marks the flush started by `generation` as done.
    pub fn finish(&mut self, generation: u64) {
        if self.state == TimerState::Firing && self.generation == generation {
            self.state = TimerState::Unarmed;
        }
    }

    /// Cancels whatever is armed, used when pending writes are flushed by hand.
    pub fn disarm(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        self.generation += 1;
        self.state = TimerState::Unarmed;
    }
}
