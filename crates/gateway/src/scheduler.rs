use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::info;

use crate::dispatcher::WebhookDispatcher;

/// Background loop that resubmits due retries.
///
/// Every tick pops the deliveries whose retry time has passed and spawns an
/// attempt for each. The loop itself never waits on an HTTP call.
pub struct RetryScheduler {
    dispatcher: WebhookDispatcher,
    tick: Duration,
    shutdown_rx: mpsc::Receiver<()>,
}

impl RetryScheduler {
    /// Create a scheduler polling at the dispatcher's configured interval.
    ///
    /// Returns the scheduler and a shutdown sender.
    pub fn new(dispatcher: WebhookDispatcher) -> (Self, mpsc::Sender<()>) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let tick = dispatcher.config().scheduler_interval;
        (
            Self {
                dispatcher,
                tick,
                shutdown_rx,
            },
            shutdown_tx,
        )
    }

    /// Run until shutdown is signaled or every sender is dropped.
    pub async fn run(&mut self) {
        info!(interval_ms = self.tick.as_millis(), "retry scheduler starting");
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!("retry scheduler received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    self.dispatcher.run_due(Utc::now());
                }
            }
        }
    }
}

impl std::fmt::Debug for RetryScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryScheduler")
            .field("tick", &self.tick)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeDelta;
    use hookline_core::{DeliveryStatus, WebhookEndpoint};
    use hookline_executor::DispatcherConfig;
    use hookline_state::WebhookRepository;
    use hookline_state_memory::MemoryRepository;
    use serde_json::json;

    use super::*;
    use crate::builder::DispatcherBuilder;
    use crate::testing::ScriptedTransport;

    #[tokio::test]
    async fn due_retries_are_resubmitted_until_shutdown() {
        let repo = Arc::new(MemoryRepository::new());
        let endpoint = WebhookEndpoint::new("https://hooks.example.com", "s");
        repo.save_endpoint(&endpoint).await.unwrap();
        let transport = Arc::new(ScriptedTransport::statuses([500]));
        let dispatcher = DispatcherBuilder::new()
            .repository(repo.clone())
            .transport(transport.clone())
            .config(DispatcherConfig {
                scheduler_interval: Duration::from_millis(10),
                ..DispatcherConfig::default()
            })
            .build()
            .unwrap();

        let delivery = dispatcher.delivery_for(&endpoint, "order.created", json!({}));
        let id = delivery.id.clone();
        let first = dispatcher.dispatch(delivery).await.unwrap();
        assert_eq!(first.status, DeliveryStatus::Retrying);

        // Pull the retry forward so the next tick picks it up.
        dispatcher
            .queue()
            .schedule(id.clone(), Utc::now() - TimeDelta::seconds(1));

        let (mut scheduler, shutdown_tx) = RetryScheduler::new(dispatcher.clone());
        let handle = tokio::spawn(async move { scheduler.run().await });

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let current = repo.get_delivery(&id).await.unwrap().unwrap();
                if current.status == DeliveryStatus::Success {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("retry was not resubmitted");

        shutdown_tx.send(()).await.unwrap();
        handle.await.unwrap();
        dispatcher.shutdown().await;
        assert_eq!(transport.calls(), 2);
        assert!(dispatcher.queue().is_empty());
    }

    #[tokio::test]
    async fn dropping_the_sender_stops_the_loop() {
        let dispatcher = DispatcherBuilder::new()
            .repository(Arc::new(MemoryRepository::new()))
            .transport(Arc::new(ScriptedTransport::always(200)))
            .build()
            .unwrap();
        let (mut scheduler, shutdown_tx) = RetryScheduler::new(dispatcher);
        drop(shutdown_tx);
        tokio::time::timeout(Duration::from_secs(1), scheduler.run())
            .await
            .expect("scheduler kept running without a sender");
    }
}
