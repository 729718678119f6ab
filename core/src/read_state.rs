//! Debounced read acknowledgements
use crate::models::ConversationId;
use crate::timer::SingleSlotTimer;
use std::time::Duration;
use tracing::debug;

/// Holds at most one pending read-ack. Each schedule replaces the previous
/// one whatever conversation it targeted, so a burst only fires for its last
/// call.
#[derive(Debug)]
pub struct ReadStateCoordinator {
    quiet_period: Duration,
    timer: SingleSlotTimer,
    target: Option<ConversationId>,
}

impl ReadStateCoordinator {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            timer: SingleSlotTimer::new(),
            target: None,
        }
    }

    /// (Re)arm the ack for `id`. `on_due` is called with the generation to
    /// hand back to [`take_due`](Self::take_due).
    pub fn schedule_mark_read<F>(&mut self, id: ConversationId, on_due: F) -> u64
    where
        F: FnOnce(u64) + Send + 'static,
    {
        debug!("Read ack for {} in {:?}", id, self.quiet_period);
        self.target = Some(id);
        self.timer.schedule(self.quiet_period, on_due)
    }

    pub fn cancel(&mut self) {
        if let Some(id) = self.target.take() {
            debug!("Cancelled pending read ack for {}", id);
        }
        self.timer.cancel();
    }

    pub fn pending_target(&self) -> Option<&ConversationId> {
        self.target.as_ref()
    }

    /// Resolve a timer fire. Returns the conversation to acknowledge, or
    /// `None` when the fire is stale or the target is no longer `open`.
    pub fn take_due(&mut self, generation: u64, open: Option<&ConversationId>) -> Option<ConversationId> {
        if !self.timer.fire(generation) {
            return None;
        }
        let target = self.target.take()?;
        if open != Some(&target) {
            debug!("Suppressing read ack for {} - no longer open", target);
            return None;
        }
        Some(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio::time::{sleep, Instant};

    #[tokio::test(start_paused = true)]
    async fn test_switch_fires_for_last_target_only() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut coordinator = ReadStateCoordinator::new(Duration::from_secs(2));
        let a = ConversationId::from("a@c.us");
        let b = ConversationId::from("b@c.us");

        let tx_a = tx.clone();
        let gen_a = coordinator.schedule_mark_read(a.clone(), move |g| {
            let _ = tx_a.send(g);
        });
        sleep(Duration::from_secs(1)).await;
        coordinator.schedule_mark_read(b.clone(), move |g| {
            let _ = tx.send(g);
        });

        let generation = rx.recv().await.unwrap();
        assert_ne!(generation, gen_a);
        assert_eq!(coordinator.take_due(generation, Some(&b)), Some(b));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_restarts_quiet_period() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut coordinator = ReadStateCoordinator::new(Duration::from_secs(2));
        let a = ConversationId::from("a@c.us");
        let start = Instant::now();

        for _ in 0..3 {
            let tx = tx.clone();
            coordinator.schedule_mark_read(a.clone(), move |g| {
                let _ = tx.send(g);
            });
            sleep(Duration::from_millis(1500)).await;
        }
        drop(tx);

        let generation = rx.recv().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert_eq!(coordinator.take_due(generation, Some(&a)), Some(a));
    }

    #[tokio::test(start_paused = true)]
    async fn test_due_ack_suppressed_after_navigation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut coordinator = ReadStateCoordinator::new(Duration::from_secs(2));
        let a = ConversationId::from("a@c.us");
        coordinator.schedule_mark_read(a, move |g| {
            let _ = tx.send(g);
        });
        let generation = rx.recv().await.unwrap();
        assert_eq!(coordinator.take_due(generation, None), None);
        assert!(coordinator.pending_target().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_discards_inflight_fire() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut coordinator = ReadStateCoordinator::new(Duration::from_secs(2));
        let a = ConversationId::from("a@c.us");
        coordinator.schedule_mark_read(a.clone(), move |g| {
            let _ = tx.send(g);
        });
        let generation = rx.recv().await.unwrap();
        coordinator.cancel();
        assert_eq!(coordinator.take_due(generation, Some(&a)), None);
    }
}
