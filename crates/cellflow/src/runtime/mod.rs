//! Single-threaded event loop that settles asynchronous cell results.

use futures::executor::{LocalPool, LocalSpawner};

pub mod clock;
pub use clock::Timers;

pub struct EventLoop {
    pool: LocalPool,
    timers: Timers,
}

impl EventLoop {
    pub fn new() -> Self {
        Self {
            pool: LocalPool::new(),
            timers: Timers::new(),
        }
    }

    pub fn spawner(&self) -> LocalSpawner {
        self.pool.spawner()
    }

    pub fn timers(&self) -> Timers {
        self.timers.clone()
    }

    pub fn now_ms(&self) -> u64 {
        self.timers.now_ms()
    }

    /// Runs every task until none of them can make progress.
    pub fn run_until_stalled(&mut self) {
        self.pool.run_until_stalled();
    }

    /// Moves virtual time forward and lets the woken tasks run.
    pub fn advance_by(&mut self, ms: u64) {
        self.pool.run_until_stalled();
        let fired = self.timers.advance_by(ms);
        log::trace!("Advanced virtual clock by {ms} ms, {fired} timers fired");
        self.pool.run_until_stalled();
    }

    /// Runs tasks and jumps the clock from timer to timer until nothing is left to do.
    ///
    /// Returns the virtual time that elapsed.
    pub fn run_until_idle(&mut self) -> u64 {
        let started_at = self.timers.now_ms();
        loop {
            self.pool.run_until_stalled();
            let Some(delay_ms) = self.timers.time_to_next_timer() else {
                break;
            };
            self.timers.advance_by(delay_ms);
        }
        self.timers.now_ms() - started_at
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}
