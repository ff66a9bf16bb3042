use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};
use uuid::Uuid;

use crate::config::Config;
use crate::store::{StoreError, TicketStore};

/// Releases holds whose payment session was abandoned without an expiry callback.
///
/// A hold is only swept `grace` after its `expires_at`, by which time the
/// processor has closed the matching session and no payment can complete.
pub struct HoldSweeper {
    store: Arc<dyn TicketStore>,
    grace: Duration,
}

impl HoldSweeper {
    pub fn new(store: Arc<dyn TicketStore>, grace: Duration) -> Self {
        Self { store, grace }
    }

    pub fn from_config(store: Arc<dyn TicketStore>, config: &Config) -> Self {
        Self::new(
            store,
            Duration::seconds(i64::from(config.hold_release_grace_secs)),
        )
    }

    /// One pass: releases every open hold that expired more than `grace` before `now`.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError> {
        let released = self.store.release_expired_holds(now - self.grace).await?;
        if !released.is_empty() {
            info!(count = released.len(), "Released expired checkout holds");
        }
        Ok(released)
    }

    /// Runs [`HoldSweeper::sweep`] every `every` until the task is aborted.
    pub fn spawn(self, every: StdDuration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(err) = self.sweep(Utc::now()).await {
                    error!(error = %err, "Hold sweep failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CheckoutLine, HoldStatus, NewEvent, NewTier};
    use crate::store::{HoldOutcome, MemoryTicketStore};

    async fn store_with_hold(expires_at: DateTime<Utc>) -> (Arc<MemoryTicketStore>, Uuid, Uuid) {
        let store = Arc::new(MemoryTicketStore::new());
        let organizer = store.create_user("Org", "org@example.com").await.unwrap();
        let event = store
            .create_event(
                organizer.id,
                NewEvent {
                    title: "Show".to_string(),
                    description: None,
                    location: "Hall".to_string(),
                    start_time: Utc::now(),
                    end_time: None,
                    tiers: vec![NewTier {
                        name: "General".to_string(),
                        description: None,
                        price: 1000,
                        capacity: Some(2),
                    }],
                },
            )
            .await
            .unwrap();
        let lines = [CheckoutLine {
            id: event.tiers[0].id,
            quantity: 2,
        }];
        let HoldOutcome::Held(hold) = store
            .hold_capacity(event.event.id, organizer.id, &lines, expires_at)
            .await
            .unwrap()
        else {
            panic!("expected hold");
        };
        (store, event.event.id, hold.id)
    }

    #[tokio::test]
    async fn test_hold_within_grace_is_kept() {
        let now = Utc::now();
        let (store, _, hold_id) = store_with_hold(now - Duration::minutes(1)).await;
        let sweeper = HoldSweeper::new(store.clone(), Duration::minutes(5));

        assert!(sweeper.sweep(now).await.unwrap().is_empty());
        let hold = store.hold(hold_id).await.unwrap().unwrap();
        assert_eq!(hold.status, HoldStatus::Open);
    }

    #[tokio::test]
    async fn test_hold_past_grace_returns_capacity() {
        let now = Utc::now();
        let (store, event_id, hold_id) = store_with_hold(now - Duration::minutes(10)).await;
        let sweeper = HoldSweeper::new(store.clone(), Duration::minutes(5));

        assert_eq!(sweeper.sweep(now).await.unwrap(), vec![hold_id]);
        let tiers = store.event_with_tiers(event_id).await.unwrap().unwrap().tiers;
        assert_eq!(tiers[0].held_count, 0);
    }

    #[tokio::test]
    async fn test_spawned_sweeper_releases_expired_hold() {
        let (store, _, hold_id) = store_with_hold(Utc::now() - Duration::hours(1)).await;
        let handle = HoldSweeper::new(store.clone(), Duration::zero())
            .spawn(StdDuration::from_millis(10));

        for _ in 0..100 {
            tokio::time::sleep(StdDuration::from_millis(10)).await;
            if store.hold(hold_id).await.unwrap().unwrap().status == HoldStatus::Released {
                break;
            }
        }
        handle.abort();

        let hold = store.hold(hold_id).await.unwrap().unwrap();
        assert_eq!(hold.status, HoldStatus::Released);
    }
}
