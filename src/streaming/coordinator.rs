//! Read/write gating for the split pipeline.
//!
//! The coordinator holds no I/O. It consumes signals (data is readable, the
//! source ended, a drain finished) and answers with the action the driver
//! must take next. Only one of reading and writing is ever in progress: a
//! new buffer is admitted only while `writable` is set, and admitting it
//! clears `writable` until every block of that buffer has been written.

/// Externally observable coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// Not started.
    Idle,
    /// Output is caught up; waiting for the source.
    AwaitingReadable,
    /// A buffer is being written.
    Draining,
    /// Data arrived while a buffer is still being written.
    AwaitingDrain,
    /// Terminal.
    Completed,
}

/// Input to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// The source has bytes available.
    Readable,
    /// The source has no more bytes.
    SourceEnded,
    /// Every block of the admitted buffer has been written.
    Drained,
}

/// What the driver must do after a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Wait for the next signal.
    Wait,
    /// Take all available chunks and scan, plan and write them.
    BeginDrain,
    /// Emit the terminal completion notification.
    Complete,
}

/// Flag-based state machine coordinating chunk admission and writes.
#[derive(Debug, Clone, Default)]
pub struct StreamCoordinator {
    started: bool,
    readable: bool,
    writable: bool,
    source_exhausted: bool,
    completed: bool,
}

impl StreamCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the coordinator: the first shard is open and empty, so output
    /// is writable. Returns `false` if it was already started.
    pub fn start(&mut self) -> bool {
        if self.started {
            return false;
        }
        self.started = true;
        self.writable = true;
        true
    }

    /// Applies a signal and evaluates the transition rule.
    ///
    /// Signals arriving before `start` or after completion are ignored.
    pub fn on(&mut self, signal: Signal) -> Action {
        if !self.started || self.completed {
            return Action::Wait;
        }

        match signal {
            Signal::Readable => self.readable = true,
            Signal::SourceEnded => self.source_exhausted = true,
            Signal::Drained => self.writable = true,
        }

        self.evaluate()
    }

    fn evaluate(&mut self) -> Action {
        if !self.writable {
            return Action::Wait;
        }
        if self.readable {
            self.readable = false;
            self.writable = false;
            return Action::BeginDrain;
        }
        if self.source_exhausted {
            self.completed = true;
            return Action::Complete;
        }
        Action::Wait
    }

    pub fn state(&self) -> CoordinatorState {
        match (self.started, self.completed, self.writable, self.readable) {
            (false, _, _, _) => CoordinatorState::Idle,
            (_, true, _, _) => CoordinatorState::Completed,
            (_, _, true, _) => CoordinatorState::AwaitingReadable,
            (_, _, false, false) => CoordinatorState::Draining,
            (_, _, false, true) => CoordinatorState::AwaitingDrain,
        }
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn is_source_exhausted(&self) -> bool {
        self.source_exhausted
    }
}
