//! Bounded register polling
//!
//! Every hardware wait in the driver goes through a [`Budget`]. A budget
//! never blocks forever; once it's spent, the caller decides whether that's
//! an error (see [`TimeoutPolicy`](crate::TimeoutPolicy)).
//!
//! A budget counts polls. Between polls it may tick a clock: the driver
//! passes its delay provider, so a budget with a tick interval bounds the
//! wait in time as well as in polls. Supply the budget through
//! [`Config::budget`](crate::Config::budget).

/// A bounded retry budget for hardware polling loops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub struct Budget {
    limit: u32,
    tick_us: u32,
}

/// The budget was spent before the condition held
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Exhausted;

impl Budget {
    /// The iteration count used for soft reset and FIFO flush waits
    pub const DEFAULT: Self = Self::iterations(200_000);

    /// A budget of `limit` polls
    ///
    /// A zero budget still checks the condition once.
    pub const fn iterations(limit: u32) -> Self {
        Self { limit, tick_us: 0 }
    }

    /// Wait `tick_us` microseconds between polls
    ///
    /// A budget of `limit` polls then spans at least `limit * tick_us`
    /// microseconds. Zero, the default, polls back to back.
    pub const fn ticking(self, tick_us: u32) -> Self {
        Self { tick_us, ..self }
    }

    /// Returns the number of polls allowed
    pub const fn limit(&self) -> u32 {
        self.limit
    }

    /// Returns the wait between polls, in microseconds
    pub const fn tick_us(&self) -> u32 {
        self.tick_us
    }

    /// Poll `done` until it returns `true`, or until the budget is spent
    ///
    /// `tick` runs between polls, with the tick interval, when the interval
    /// isn't zero. Returns the number of polls it took.
    pub(crate) fn spin(
        &self,
        mut done: impl FnMut() -> bool,
        mut tick: impl FnMut(u32),
    ) -> Result<u32, Exhausted> {
        let mut polls = 0u32;
        loop {
            polls = polls.saturating_add(1);
            if done() {
                return Ok(polls);
            }
            if polls > self.limit {
                return Err(Exhausted);
            }
            if self.tick_us != 0 {
                tick(self.tick_us);
            }
        }
    }
}

impl Default for Budget {
    fn default() -> Self {
        Self::DEFAULT
    }
}
