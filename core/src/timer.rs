//! Single-slot timers on the tokio clock
//!
//! Scheduling always cancels whatever was armed before. Every schedule gets a
//! fresh generation number which the fire callback receives; the owner checks
//! it with [`SingleSlotTimer::fire`] so a tick that raced a cancel is ignored.
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};

#[derive(Debug, Default)]
pub struct SingleSlotTimer {
    generation: u64,
    armed: Option<JoinHandle<()>>,
    repeating: bool,
}

impl SingleSlotTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a one-shot timer. `on_fire` runs once after `delay` with the
    /// generation returned here.
    pub fn schedule<F>(&mut self, delay: Duration, on_fire: F) -> u64
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;
        self.repeating = false;
        self.armed = Some(tokio::spawn(async move {
            sleep(delay).await;
            on_fire(generation);
        }));
        generation
    }

    /// Arm a repeating timer; the first tick comes one `period` from now
    pub fn schedule_every<F>(&mut self, period: Duration, mut on_tick: F) -> u64
    where
        F: FnMut(u64) + Send + 'static,
    {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;
        self.repeating = true;
        self.armed = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                on_tick(generation);
            }
        }));
        generation
    }

    /// Disarm. Fires already in flight become stale.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.armed.take() {
            handle.abort();
        }
        self.generation += 1;
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Accept a fire for `generation`. One-shot timers disarm on the first
    /// accepted fire; repeating timers stay armed.
    pub fn fire(&mut self, generation: u64) -> bool {
        if self.armed.is_none() || generation != self.generation {
            return false;
        }
        if !self.repeating {
            self.armed = None;
        }
        true
    }
}

impl Drop for SingleSlotTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.armed.take() {
            handle.abort();
        }
    }
}
