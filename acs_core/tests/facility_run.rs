//! End-to-end runs of an assembled facility under a paused clock.

use acs_core::{
    battery_scenario, AcsResult, Event, EventKind, Facility, FacilityConfig, MessageConsumer,
    SendTeamRequest, TeamState,
};
use acs_env::{AcsContext, EnvError, MessageSource, QueueMessage, TokioContext};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn facility(config: FacilityConfig) -> Facility {
    let ctx: Arc<dyn AcsContext> = TokioContext::shared(config.seed);
    Facility::new(config, ctx).unwrap()
}

fn recorder() -> (Arc<Mutex<Vec<Event>>>, impl Fn(&Event) -> AcsResult<()> + Send + Sync + 'static) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    (log, move |event: &Event| {
        sink.lock().unwrap().push(event.clone());
        Ok(())
    })
}

#[tokio::test(start_paused = true)]
async fn battery_scenario_is_won_with_a_repair_crew() {
    let mut facility = facility(FacilityConfig::default());
    facility.set_scenario(battery_scenario("cell-1"));
    let (log, notify) = recorder();
    facility.start(notify).unwrap();

    // Wait for the cooling fault of act two.
    let mut waited = Duration::ZERO;
    while facility.model().alarmed_cells().is_empty() {
        tokio::time::sleep(Duration::from_millis(100)).await;
        waited += Duration::from_millis(100);
        assert!(waited < Duration::from_secs(5), "no alarm raised");
    }
    assert_eq!(facility.model().alarmed_cells(), vec!["cell-1".to_string()]);

    let reply = facility
        .dispatcher()
        .handle_start(&SendTeamRequest {
            team_name: "T1".to_string(),
            location: "cell-1".to_string(),
        })
        .unwrap();
    assert!(reply.execution_status);

    tokio::time::sleep(Duration::from_secs(15)).await;

    assert!(facility.scenarist().is_end());
    assert!(facility.scenarist().is_win());
    assert_eq!(facility.dispatcher().team_info("T1").unwrap().state, TeamState::Idle);
    facility.stop();

    let kinds: Vec<EventKind> = log.lock().unwrap().iter().map(|e| e.kind.clone()).collect();
    let position = |kind: &EventKind| kinds.iter().position(|k| k == kind).unwrap();
    assert!(position(&EventKind::ScenarioStarted) < position(&EventKind::TeamDispatched));
    assert!(position(&EventKind::RepairApplied) < position(&EventKind::ScenarioEnded));
}

#[tokio::test(start_paused = true)]
async fn only_journey_edges_are_observed() {
    let mut facility = facility(FacilityConfig::default());
    let (log, notify) = recorder();
    facility.start(notify).unwrap();

    let dispatcher = facility.dispatcher().clone();
    dispatcher.send_team("T1", "cell-1").unwrap();
    dispatcher.send_team("T2", "cell-2").unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    dispatcher.recall_team("T2").unwrap();
    assert!(dispatcher.send_team("T2", "cell-3").is_err());

    tokio::time::sleep(Duration::from_secs(20)).await;
    facility.stop();

    let edges: Vec<(TeamState, TeamState)> = log
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.kind == EventKind::TeamStateChanged)
        .map(|e| {
            (
                serde_json::from_value(e.payload["from"].clone()).unwrap(),
                serde_json::from_value(e.payload["to"].clone()).unwrap(),
            )
        })
        .collect();

    assert!(!edges.is_empty());
    for (from, to) in &edges {
        assert!(from.can_transition_to(*to), "{} -> {}", from, to);
    }
    for team in dispatcher.team_list().values() {
        assert_eq!(team.state, TeamState::Idle);
        assert_eq!(team.assigned_location, None);
    }
}

#[tokio::test(start_paused = true)]
async fn events_reach_observers_in_enqueue_order() {
    let mut facility = facility(FacilityConfig::default());
    let (log, notify) = recorder();
    facility.start(notify).unwrap();

    let events = facility.events().clone();
    for i in 0..20 {
        events.trigger(EventKind::Custom(format!("e{}", i)), serde_json::json!({ "i": i }));
    }
    tokio::time::sleep(Duration::from_millis(250)).await;
    facility.stop();

    let seen: Vec<i64> = log
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| e.payload["i"].as_i64())
        .collect();
    assert_eq!(seen, (0..20).collect::<Vec<_>>());
}

/// Source that replays a fixed list of bodies, then stays empty.
struct ScriptedSource {
    bodies: Mutex<VecDeque<&'static str>>,
}

#[async_trait]
impl MessageSource for ScriptedSource {
    async fn poll(&self) -> Result<Option<QueueMessage>, EnvError> {
        Ok(self
            .bodies
            .lock()
            .unwrap()
            .pop_front()
            .map(|body| QueueMessage::new(body, 1)))
    }

    fn queue_name(&self) -> &str {
        "scripted"
    }
}

struct Counter(Arc<Mutex<usize>>);

impl MessageConsumer for Counter {
    fn name(&self) -> &str {
        "counter"
    }

    fn consume(&self, _message: &serde_json::Value) -> AcsResult<()> {
        *self.0.lock().unwrap() += 1;
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn malformed_queue_message_is_dropped() {
    let mut facility = facility(FacilityConfig::default());
    let count = Arc::new(Mutex::new(0));
    facility.add_consumer(Counter(Arc::clone(&count))).unwrap();

    let source = ScriptedSource {
        bodies: Mutex::new(VecDeque::from(vec![
            "not-json",
            r#"{"cell": "cell-3", "command": "start"}"#,
        ])),
    };
    facility.start_ingest(Arc::new(source)).unwrap();

    tokio::time::sleep(Duration::from_millis(3500)).await;
    facility.stop();

    assert_eq!(*count.lock().unwrap(), 1);
    assert_eq!(facility.ingestor().stats().malformed(), 1);
    assert!(facility.energy().cell_info("cell-3").unwrap().is_on());
}

#[tokio::test(start_paused = true)]
async fn status_hides_flags_unless_debug() {
    let quiet = facility(FacilityConfig::default());
    assert_eq!(quiet.status().is_end, None);

    let loud = facility(FacilityConfig {
        debug: true,
        ..FacilityConfig::default()
    });
    assert_eq!(loud.status().is_end, Some(false));
}
