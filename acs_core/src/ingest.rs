//! Message-queue ingestion.
//!
//! The [`QueueIngestor`] polls a [`MessageSource`] for one message at a
//! time, parses the body as JSON and hands the value to every registered
//! [`MessageConsumer`] in registration order. A body that is not JSON is
//! dropped with a log record and never reaches a consumer; the next poll
//! proceeds as usual.

use crate::energy::EnergySystem;
use crate::error::{AcsError, AcsResult};
use acs_env::{AcsContext, MessageSource, QueueSettings};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Receiver of parsed queue messages.
pub trait MessageConsumer: Send + Sync {
    fn name(&self) -> &str;

    fn consume(&self, message: &serde_json::Value) -> AcsResult<()>;
}

/// Counters kept by the ingestor.
#[derive(Debug, Default)]
pub struct IngestStats {
    received: AtomicU64,
    malformed: AtomicU64,
    consumer_failures: AtomicU64,
}

impl IngestStats {
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::SeqCst)
    }

    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::SeqCst)
    }

    pub fn consumer_failures(&self) -> u64 {
        self.consumer_failures.load(Ordering::SeqCst)
    }
}

pub struct QueueIngestor {
    settings: QueueSettings,
    consumers: Vec<Arc<dyn MessageConsumer>>,
    started: AtomicBool,
    stop_tx: watch::Sender<bool>,
    stats: IngestStats,
}

impl QueueIngestor {
    pub fn new(settings: QueueSettings) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            settings,
            consumers: Vec::new(),
            started: AtomicBool::new(false),
            stop_tx,
            stats: IngestStats::default(),
        }
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    /// Registers a consumer. Consumers must be added before [`run`].
    ///
    /// [`run`]: QueueIngestor::run
    pub fn add_consumer(&mut self, consumer: impl MessageConsumer + 'static) -> AcsResult<()> {
        if self.started.load(Ordering::SeqCst) {
            return Err(AcsError::invalid_state(format!(
                "consumer '{}' added after ingestion started",
                consumer.name()
            )));
        }
        debug!("Queue consumer '{}' registered", consumer.name());
        self.consumers.push(Arc::new(consumer));
        Ok(())
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    /// Polls `source` every poll interval until [`stop`] is called.
    ///
    /// Returns `Ok(())` when stopped and the transport error if the source
    /// fails.
    ///
    /// [`stop`]: QueueIngestor::stop
    pub async fn run(&self, ctx: Arc<dyn AcsContext>, source: Arc<dyn MessageSource>) -> AcsResult<()> {
        self.started.store(true, Ordering::SeqCst);
        let mut stop_rx = self.stop_tx.subscribe();
        info!(
            "Consuming queue '{}' on {}:{} as '{}'",
            source.queue_name(),
            self.settings.host,
            self.settings.port,
            self.settings.username
        );

        loop {
            if *stop_rx.borrow() {
                break;
            }
            match source.poll().await {
                Ok(Some(message)) => {
                    debug!("Queue message #{} received", message.delivery_tag);
                    if let Err(err) = self.process(&message.body) {
                        warn!("Queue message #{} dropped: {}", message.delivery_tag, err);
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    error!("Queue '{}' failed: {}", source.queue_name(), err);
                    return Err(err.into());
                }
            }
            tokio::select! {
                _ = ctx.sleep(self.settings.poll_interval) => {}
                _ = stop_rx.changed() => {}
            }
        }
        info!("Stopped consuming queue '{}'", source.queue_name());
        Ok(())
    }

    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Parses one body and delivers it to every consumer.
    ///
    /// Returns the number of consumers that accepted the message, or
    /// `MalformedMessage` if the body is not JSON. A failing consumer is
    /// logged and does not keep the message from the others.
    pub fn process(&self, body: &[u8]) -> AcsResult<usize> {
        self.stats.received.fetch_add(1, Ordering::SeqCst);
        let message: serde_json::Value = serde_json::from_slice(body).map_err(|err| {
            self.stats.malformed.fetch_add(1, Ordering::SeqCst);
            AcsError::MalformedMessage(err.to_string())
        })?;

        let mut accepted = 0;
        for consumer in &self.consumers {
            match consumer.consume(&message) {
                Ok(()) => accepted += 1,
                Err(err) => {
                    self.stats.consumer_failures.fetch_add(1, Ordering::SeqCst);
                    error!("Queue consumer '{}' failed: {}", consumer.name(), err);
                }
            }
        }
        Ok(accepted)
    }
}

/// Command carried by a control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlCommand {
    Start,
    Stop,
}

/// `{"cell": "cell-1", "command": "start"}`, optionally narrowed to one
/// subsystem with `"subsystem": "cooling"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlMessage {
    pub cell: String,
    pub command: ControlCommand,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subsystem: Option<String>,
}

/// Applies control messages through the energy-system manager.
pub struct ControlMessageConsumer {
    energy: EnergySystem,
}

impl ControlMessageConsumer {
    pub fn new(energy: EnergySystem) -> Self {
        Self { energy }
    }
}

impl MessageConsumer for ControlMessageConsumer {
    fn name(&self) -> &str {
        "cell-control"
    }

    fn consume(&self, message: &serde_json::Value) -> AcsResult<()> {
        let control = ControlMessage::deserialize(message)
            .map_err(|err| AcsError::MalformedMessage(err.to_string()))?;
        let on = control.command == ControlCommand::Start;
        match &control.subsystem {
            Some(kind) => self.energy.set_subsystem_named(&control.cell, kind, on),
            None if on => self.energy.start_cell(&control.cell),
            None => self.energy.stop_cell(&control.cell),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Model;
    use acs_env::{MemoryQueue, TokioContext};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        seen: Arc<Mutex<Vec<serde_json::Value>>>,
    }

    impl MessageConsumer for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn consume(&self, message: &serde_json::Value) -> AcsResult<()> {
            self.seen.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    struct Failing;

    impl MessageConsumer for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn consume(&self, _message: &serde_json::Value) -> AcsResult<()> {
            Err(AcsError::invalid_state("nope"))
        }
    }

    fn settings() -> QueueSettings {
        QueueSettings {
            poll_interval: Duration::from_millis(100),
            ..QueueSettings::default()
        }
    }

    #[test]
    fn test_malformed_body_reaches_no_consumer() {
        let recorder = Recorder::default();
        let seen = Arc::clone(&recorder.seen);
        let mut ingestor = QueueIngestor::new(settings());
        ingestor.add_consumer(recorder).unwrap();

        let err = ingestor.process(b"not-json").unwrap_err();
        assert!(matches!(err, AcsError::MalformedMessage(_)));
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(ingestor.stats().malformed(), 1);
    }

    #[test]
    fn test_failing_consumer_does_not_block_others() {
        let recorder = Recorder::default();
        let seen = Arc::clone(&recorder.seen);
        let mut ingestor = QueueIngestor::new(settings());
        ingestor.add_consumer(Failing).unwrap();
        ingestor.add_consumer(recorder).unwrap();

        assert_eq!(ingestor.process(br#"{"a": 1}"#).unwrap(), 1);
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(ingestor.stats().consumer_failures(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_survives_malformed_message() {
        let recorder = Recorder::default();
        let seen = Arc::clone(&recorder.seen);
        let mut ingestor = QueueIngestor::new(settings());
        ingestor.add_consumer(recorder).unwrap();
        let ingestor = Arc::new(ingestor);

        let queue = MemoryQueue::new("facility");
        queue.publish("not-json").unwrap();
        queue.publish(r#"{"cell": "cell-1", "command": "start"}"#).unwrap();

        let ctx: Arc<dyn AcsContext> = TokioContext::shared(1);
        let source: Arc<dyn MessageSource> = Arc::new(queue.clone());
        let runner = Arc::clone(&ingestor);
        let handle = tokio::spawn(async move { runner.run(ctx, source).await });

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(seen.lock().unwrap()[0]["command"], "start");
        assert_eq!(ingestor.stats().received(), 2);

        ingestor.stop();
        assert!(handle.await.unwrap().is_ok());
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ends_on_transport_error() {
        let ingestor = QueueIngestor::new(settings());
        let queue = MemoryQueue::new("facility");
        queue.close();

        let ctx: Arc<dyn AcsContext> = TokioContext::shared(1);
        let result = ingestor.run(ctx, Arc::new(queue)).await;
        assert!(matches!(result, Err(AcsError::Env(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_consumer_rejected() {
        let mut ingestor = QueueIngestor::new(settings());
        let queue = MemoryQueue::new("facility");
        queue.close();
        let ctx: Arc<dyn AcsContext> = TokioContext::shared(1);
        let _ = ingestor.run(ctx, Arc::new(queue)).await;

        assert!(ingestor.add_consumer(Recorder::default()).is_err());
    }

    #[test]
    fn test_control_consumer() {
        let model = Model::new(["cell-1"], Vec::<String>::new());
        let consumer = ControlMessageConsumer::new(EnergySystem::new(model.clone()));

        consumer
            .consume(&serde_json::json!({ "cell": "cell-1", "command": "start" }))
            .unwrap();
        assert!(model.cell("cell-1").unwrap().lock().is_on());

        consumer
            .consume(&serde_json::json!({ "cell": "cell-1", "command": "stop", "subsystem": "cooling" }))
            .unwrap();
        let cell = model.cell("cell-1").unwrap().snapshot();
        assert!(cell.is_on());
        assert!(!crate::model::Subsystem::is_on(&cell.cooling_system));

        let err = consumer
            .consume(&serde_json::json!({ "cell": "cell-1", "command": "explode" }))
            .unwrap_err();
        assert!(matches!(err, AcsError::MalformedMessage(_)));
        assert!(consumer
            .consume(&serde_json::json!({ "cell": "cell-7", "command": "start" }))
            .unwrap_err()
            .is_not_found());
    }
}
