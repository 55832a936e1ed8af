//! Central event clock.
//!
//! The [`EventExecutor`] keeps a queue of events keyed by (due time,
//! insertion order) and a list of observers. On each tick it takes every
//! event due at the tick's start time and hands each one to every observer,
//! observers in registration order, events in queue order. The push observer
//! given to `start` has its own slot and is called after the registered ones;
//! a restart replaces it. Delivery runs on
//! the clock task and completes before the next tick is awaited, so
//! observers never see two ticks interleave.

use crate::error::{AcsError, AcsResult};
use acs_env::{AcsContext, EventId, Ticker};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info};

/// What an event is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ScenarioStarted,
    ActionStarted,
    ActionComplete,
    ScenarioEnded,
    TeamDispatched,
    TeamStateChanged,
    TeamRecalled,
    RepairApplied,
    CellAlarm,
    Custom(String),
}

/// A timed notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub kind: EventKind,
    pub payload: serde_json::Value,

    /// Logical due time, milliseconds since the clock started
    pub due_ms: u64,

    /// Insertion order, breaks ties between equal due times
    pub seq: u64,
}

type ObserverFn = Arc<dyn Fn(&Event) -> AcsResult<()> + Send + Sync>;

#[derive(Clone)]
struct Observer {
    name: String,
    callback: ObserverFn,
}

/// Cloneable handle to the event clock.
#[derive(Clone)]
pub struct EventExecutor {
    inner: Arc<ExecutorInner>,
}

struct ExecutorInner {
    ctx: Arc<dyn AcsContext>,
    interval: Duration,
    queue: Mutex<BTreeMap<(Duration, u64), Event>>,
    next_seq: AtomicU64,
    observers: Mutex<Vec<Observer>>,
    notify: Mutex<Option<Observer>>,
    /// Held for a whole tick so two deliveries never interleave
    delivery: Mutex<()>,
    ticker: Mutex<Option<Ticker>>,
    delivered: AtomicU64,
    observer_failures: AtomicU64,
}

impl EventExecutor {
    /// Creates a stopped executor ticking every `interval` once started.
    pub fn new(ctx: Arc<dyn AcsContext>, interval: Duration) -> Self {
        Self {
            inner: Arc::new(ExecutorInner {
                ctx,
                interval,
                queue: Mutex::new(BTreeMap::new()),
                next_seq: AtomicU64::new(0),
                observers: Mutex::new(Vec::new()),
                notify: Mutex::new(None),
                delivery: Mutex::new(()),
                ticker: Mutex::new(None),
                delivered: AtomicU64::new(0),
                observer_failures: AtomicU64::new(0),
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Registers an observer. Observers are called in registration order.
    pub fn add_observer<F>(&self, name: &str, callback: F)
    where
        F: Fn(&Event) -> AcsResult<()> + Send + Sync + 'static,
    {
        lock(&self.inner.observers).push(Observer {
            name: name.to_string(),
            callback: Arc::new(callback),
        });
    }

    /// Registered observers, plus the push observer if one is set.
    pub fn observer_count(&self) -> usize {
        lock(&self.inner.observers).len() + usize::from(lock(&self.inner.notify).is_some())
    }

    /// Enqueues an event due `delay` from now. Safe to call from any thread.
    pub fn schedule(&self, kind: EventKind, payload: serde_json::Value, delay: Duration) -> EventId {
        let id = EventId::new();

        // Due time and sequence number are taken under the queue lock so a
        // drain never sees a later number without every earlier one.
        let mut queue = lock(&self.inner.queue);
        let due = self.inner.ctx.now() + delay;
        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);
        debug!("Queued {:?} event {} (due {:?})", kind, id, due);
        queue.insert(
            (due, seq),
            Event {
                id,
                kind,
                payload,
                due_ms: due.as_millis() as u64,
                seq,
            },
        );
        id
    }

    /// Enqueues an event for the next tick.
    pub fn trigger(&self, kind: EventKind, payload: serde_json::Value) -> EventId {
        self.schedule(kind, payload, Duration::ZERO)
    }

    /// Number of queued, undelivered events.
    pub fn pending(&self) -> usize {
        lock(&self.inner.queue).len()
    }

    /// Total event deliveries (event x observer).
    pub fn delivered(&self) -> u64 {
        self.inner.delivered.load(Ordering::SeqCst)
    }

    pub fn observer_failures(&self) -> u64 {
        self.inner.observer_failures.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner.ticker)
            .as_ref()
            .map(|ticker| !ticker.is_stopped())
            .unwrap_or(false)
    }

    /// Sets `notify` as the push observer and starts the tick loop.
    ///
    /// Allowed again after `stop`; the new `notify` replaces the old one.
    pub fn start<F>(&self, notify: F) -> AcsResult<()>
    where
        F: Fn(&Event) -> AcsResult<()> + Send + Sync + 'static,
    {
        let mut ticker = lock(&self.inner.ticker);
        if ticker.as_ref().map(|t| !t.is_stopped()).unwrap_or(false) {
            return Err(AcsError::invalid_state("event executor already running"));
        }
        *lock(&self.inner.notify) = Some(Observer {
            name: "notify".to_string(),
            callback: Arc::new(notify),
        });

        info!("Starting event executor (tick {:?})", self.inner.interval);
        let executor = self.clone();
        *ticker = Some(Ticker::spawn(
            Arc::clone(&self.inner.ctx),
            "event-executor",
            self.inner.interval,
            move |_| {
                executor.deliver_due();
            },
        ));
        Ok(())
    }

    /// Halts the tick loop and discards undelivered events.
    pub fn stop(&self) {
        if let Some(ticker) = lock(&self.inner.ticker).as_ref() {
            ticker.stop();
        }
        let discarded = {
            let mut queue = lock(&self.inner.queue);
            let n = queue.len();
            queue.clear();
            n
        };
        if discarded > 0 {
            info!("Event executor stopped, {} undelivered events discarded", discarded);
        }
    }

    /// Runs one tick: delivers every event due now.
    ///
    /// Events enqueued while this tick delivers (including by observers)
    /// wait for the next tick. Returns the number of events delivered.
    pub fn deliver_due(&self) -> usize {
        let _tick = lock(&self.inner.delivery);
        let now = self.inner.ctx.now();

        let due: Vec<Event> = {
            let mut queue = lock(&self.inner.queue);
            let mut due = Vec::new();
            while let Some(entry) = queue.first_entry() {
                if entry.key().0 > now {
                    break;
                }
                due.push(entry.remove());
            }
            due
        };
        if due.is_empty() {
            return 0;
        }

        let mut observers = lock(&self.inner.observers).clone();
        observers.extend(lock(&self.inner.notify).clone());
        for event in &due {
            for observer in &observers {
                self.notify(observer, event);
            }
        }
        due.len()
    }

    fn notify(&self, observer: &Observer, event: &Event) {
        let outcome = catch_unwind(AssertUnwindSafe(|| (observer.callback)(event)));
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err.to_string()),
            Err(_) => Some("observer panicked".to_string()),
        };
        match failure {
            None => {
                self.inner.delivered.fetch_add(1, Ordering::SeqCst);
            }
            Some(reason) => {
                self.inner.observer_failures.fetch_add(1, Ordering::SeqCst);
                let err = AcsError::observer(&observer.name, reason);
                error!("Event {} ({:?}): {}", event.id, event.kind, err);
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use acs_env::TokioContext;
    use serde_json::json;

    fn executor(tick_ms: u64) -> EventExecutor {
        let ctx: Arc<dyn AcsContext> = TokioContext::shared(1);
        EventExecutor::new(ctx, Duration::from_millis(tick_ms))
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> impl Fn(&Event) -> AcsResult<()> {
        let log = Arc::clone(log);
        move |event| {
            log.lock().unwrap().push(format!("{}:{}", tag, event.payload));
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_order_and_observer_order() {
        let exec = executor(100);
        let log = Arc::new(Mutex::new(Vec::new()));
        exec.add_observer("a", recorder(&log, "a"));
        exec.add_observer("b", recorder(&log, "b"));

        exec.trigger(EventKind::Custom("x".into()), json!(1));
        exec.trigger(EventKind::Custom("x".into()), json!(2));

        assert_eq!(exec.deliver_due(), 2);
        assert_eq!(*log.lock().unwrap(), vec!["a:1", "b:1", "a:2", "b:2"]);
        assert_eq!(exec.delivered(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_future_event_waits_for_its_tick() {
        let exec = executor(100);
        let log = Arc::new(Mutex::new(Vec::new()));
        exec.add_observer("a", recorder(&log, "a"));

        exec.schedule(EventKind::CellAlarm, json!("later"), Duration::from_millis(150));
        exec.trigger(EventKind::CellAlarm, json!("now"));

        assert_eq!(exec.deliver_due(), 1);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(exec.deliver_due(), 0);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(exec.deliver_due(), 1);

        assert_eq!(*log.lock().unwrap(), vec!["a:\"now\"", "a:\"later\""]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_observer_does_not_stop_delivery() {
        let exec = executor(100);
        let log = Arc::new(Mutex::new(Vec::new()));
        exec.add_observer("broken", |_| Err(AcsError::invalid_state("socket closed")));
        exec.add_observer("panicky", |_| panic!("observer bug"));
        exec.add_observer("ok", recorder(&log, "ok"));

        exec.trigger(EventKind::Custom("x".into()), json!(1));
        exec.trigger(EventKind::Custom("x".into()), json!(2));
        exec.deliver_due();

        assert_eq!(*log.lock().unwrap(), vec!["ok:1", "ok:2"]);
        assert_eq!(exec.observer_failures(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_enqueued_event_goes_to_next_tick() {
        let exec = executor(100);
        let log = Arc::new(Mutex::new(Vec::new()));
        let chained = exec.clone();
        exec.add_observer("chain", move |event| {
            if event.payload == json!("first") {
                chained.trigger(EventKind::Custom("y".into()), json!("second"));
            }
            Ok(())
        });
        exec.add_observer("log", recorder(&log, "log"));

        exec.trigger(EventKind::Custom("y".into()), json!("first"));
        assert_eq!(exec.deliver_due(), 1);
        assert_eq!(exec.pending(), 1);
        assert_eq!(exec.deliver_due(), 1);
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_delivers_and_stop_discards() {
        let exec = executor(100);
        let log = Arc::new(Mutex::new(Vec::new()));
        exec.start(recorder(&log, "ws")).unwrap();
        assert!(exec.is_running());
        assert!(exec.start(|_| Ok(())).is_err());

        exec.trigger(EventKind::ScenarioStarted, json!(null));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(log.lock().unwrap().len(), 1);

        exec.schedule(EventKind::ScenarioEnded, json!(null), Duration::from_secs(10));
        exec.stop();
        assert_eq!(exec.pending(), 0);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(log.lock().unwrap().len(), 1);
        assert!(!exec.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_push_observer() {
        let exec = executor(100);
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));
        exec.add_observer("audit", recorder(&first, "audit"));

        exec.start(recorder(&first, "ws")).unwrap();
        exec.stop();
        exec.start(recorder(&second, "ws")).unwrap();
        assert!(exec.is_running());
        assert_eq!(exec.observer_count(), 2);

        exec.trigger(EventKind::Custom("x".into()), json!(1));
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(*first.lock().unwrap(), vec!["audit:1"]);
        assert_eq!(*second.lock().unwrap(), vec!["ws:1"]);
        assert_eq!(exec.delivered(), 2);
    }

    #[test]
    fn test_concurrent_triggers_keep_sequence_order() {
        let exec = executor(100);
        let log = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&log);
        exec.add_observer("seq", move |event| {
            seen.lock().unwrap().push(event.seq);
            Ok(())
        });

        let producers: Vec<_> = (0..4)
            .map(|_| {
                let exec = exec.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        exec.trigger(EventKind::Custom("load".into()), json!(i));
                    }
                })
            })
            .collect();
        while producers.iter().any(|p| !p.is_finished()) {
            exec.deliver_due();
        }
        for producer in producers {
            producer.join().unwrap();
        }
        exec.deliver_due();

        let seqs = log.lock().unwrap().clone();
        assert_eq!(seqs.len(), 800);
        assert!(seqs.windows(2).all(|w| w[0] < w[1]));
    }
}
