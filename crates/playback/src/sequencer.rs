use std::time::Duration;

use tokio::time::Instant;

/// Delay between the end of a slide's narration and the automatic move to the next slide.
pub const DEFAULT_ADVANCE_GRACE: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Playing,
    Advancing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingAdvance {
    pub from: usize,
    pub to: usize,
    pub due: Instant,
    pub generation: u64,
}

/// Schedules auto-advance after narration ends.
///
/// At most one advance is pending. Each scheduled advance gets a fresh
/// generation; firing with an older generation, or after the current slide
/// moved away from `from`, is a no-op.
#[derive(Debug, Clone)]
pub struct Sequencer {
    grace: Duration,
    pending: Option<PendingAdvance>,
    generation: u64,
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new(DEFAULT_ADVANCE_GRACE)
    }
}

impl Sequencer {
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            pending: None,
            generation: 0,
        }
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    pub fn pending(&self) -> Option<PendingAdvance> {
        self.pending
    }

    pub fn is_advancing(&self) -> bool {
        self.pending.is_some()
    }

    pub fn on_playback_ended(
        &mut self,
        current: usize,
        len: usize,
        auto_advance: bool,
        now: Instant,
    ) -> Option<PendingAdvance> {
        if !auto_advance || current + 1 >= len {
            return None;
        }
        self.generation += 1;
        let pending = PendingAdvance {
            from: current,
            to: current + 1,
            due: now + self.grace,
            generation: self.generation,
        };
        self.pending = Some(pending);
        Some(pending)
    }

    pub fn cancel(&mut self) -> Option<PendingAdvance> {
        self.pending.take()
    }

    /// Consumes the pending advance for `generation` and returns the target
    /// slide, or `None` if it was superseded.
    pub fn fire(&mut self, generation: u64, current: usize) -> Option<usize> {
        match self.pending {
            Some(pending) if pending.generation == generation => {
                self.pending = None;
                (pending.from == current).then_some(pending.to)
            }
            _ => None,
        }
    }
}
