//! Scripted scenarios.
//!
//! A [`Scenario`] is an ordered list of [`Action`]s with a cursor. Each
//! action goes `Pending -> Running -> Done`:
//!
//! - `Pending -> Running` when the action becomes current and its entry
//!   predicate holds; the side effect (`execute`) fires exactly here, once.
//! - `Running -> Done` when its completion predicate holds.
//!
//! On `Done` the cursor moves to the next action, or, after the last one,
//! the scenario ends and its win condition is evaluated. The cursor never
//! decreases and is frozen once the scenario has ended.

mod battery;
mod scenarist;

pub use battery::{battery_scenario, DebugBreakAction, FirstActAction, SecondActAction, ThirdActAction};
pub use scenarist::{Scenarist, ScenarioStatus};

use crate::error::AcsResult;
use crate::events::{EventExecutor, EventKind};
use crate::model::Model;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{error, info};

/// What an action can see while its predicates and side effect run.
pub struct ActionContext<'a> {
    pub model: &'a Model,
    pub events: &'a EventExecutor,

    /// Clock time of this driving step
    pub now: Duration,

    /// Time since the scenario's first step
    pub elapsed: Duration,
}

/// One step of a scenario.
pub trait Action: Send + Sync {
    fn name(&self) -> &str;

    /// Entry predicate, checked while the action is pending.
    fn can_start(&self, _cx: &ActionContext<'_>) -> bool {
        true
    }

    /// One-time side effect at `Pending -> Running`.
    fn execute(&self, _cx: &ActionContext<'_>) -> AcsResult<()> {
        Ok(())
    }

    /// Completion predicate, checked while the action is running.
    fn is_complete(&self, cx: &ActionContext<'_>) -> bool;
}

type Predicate = Box<dyn Fn(&ActionContext<'_>) -> bool + Send + Sync>;
type SideEffect = Box<dyn Fn(&ActionContext<'_>) -> AcsResult<()> + Send + Sync>;

/// Action assembled from closures.
pub struct FnAction {
    name: String,
    entry: Option<Predicate>,
    effect: Option<SideEffect>,
    complete: Predicate,
}

impl FnAction {
    /// A new action that completes as soon as it runs.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry: None,
            effect: None,
            complete: Box::new(|_| true),
        }
    }

    pub fn entry(mut self, pred: impl Fn(&ActionContext<'_>) -> bool + Send + Sync + 'static) -> Self {
        self.entry = Some(Box::new(pred));
        self
    }

    pub fn on_start(
        mut self,
        effect: impl Fn(&ActionContext<'_>) -> AcsResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.effect = Some(Box::new(effect));
        self
    }

    pub fn complete_when(
        mut self,
        pred: impl Fn(&ActionContext<'_>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.complete = Box::new(pred);
        self
    }
}

impl Action for FnAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_start(&self, cx: &ActionContext<'_>) -> bool {
        self.entry.as_ref().map(|pred| pred(cx)).unwrap_or(true)
    }

    fn execute(&self, cx: &ActionContext<'_>) -> AcsResult<()> {
        match &self.effect {
            Some(effect) => effect(cx),
            None => Ok(()),
        }
    }

    fn is_complete(&self, cx: &ActionContext<'_>) -> bool {
        (self.complete)(cx)
    }
}

/// Lifecycle of the current action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionPhase {
    Pending,
    Running,
    Done,
}

/// Result of one driving step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// Index of the current action after the step
    pub cursor: usize,
    pub phase: ActionPhase,

    /// The step completed an action
    pub advanced: bool,
    pub is_end: bool,
    pub is_win: bool,
}

type WinCondition = Box<dyn Fn(&Model) -> bool + Send + Sync>;

/// Ordered script of actions with a win condition.
pub struct Scenario {
    name: String,
    actions: Vec<Box<dyn Action>>,
    cursor: usize,
    phase: ActionPhase,
    started_at: Option<Duration>,
    is_win: bool,
    is_end: bool,
    win_condition: WinCondition,
}

impl Scenario {
    /// A scenario that is won whenever it reaches its end.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: Vec::new(),
            cursor: 0,
            phase: ActionPhase::Pending,
            started_at: None,
            is_win: false,
            is_end: false,
            win_condition: Box::new(|_| true),
        }
    }

    pub fn with_win_condition(mut self, win: impl Fn(&Model) -> bool + Send + Sync + 'static) -> Self {
        self.win_condition = Box::new(win);
        self
    }

    pub fn push_action(&mut self, action: impl Action + 'static) {
        self.actions.push(Box::new(action));
    }

    pub fn with_action(mut self, action: impl Action + 'static) -> Self {
        self.push_action(action);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn phase(&self) -> ActionPhase {
        self.phase
    }

    pub fn current_action(&self) -> Option<&str> {
        self.actions.get(self.cursor).map(|a| a.name())
    }

    pub fn is_win(&self) -> bool {
        self.is_win
    }

    pub fn is_end(&self) -> bool {
        self.is_end
    }

    fn outcome(&self, advanced: bool) -> StepOutcome {
        StepOutcome {
            cursor: self.cursor,
            phase: self.phase,
            advanced,
            is_end: self.is_end,
            is_win: self.is_win,
        }
    }

    /// Advances the scenario by at most one action.
    pub fn step(&mut self, model: &Model, events: &EventExecutor, now: Duration) -> StepOutcome {
        if self.is_end {
            return self.outcome(false);
        }

        let started_at = match self.started_at {
            Some(at) => at,
            None => {
                info!("Scenario '{}' started ({} actions)", self.name, self.actions.len());
                events.trigger(EventKind::ScenarioStarted, json!({ "scenario": self.name }));
                self.started_at = Some(now);
                now
            }
        };

        if self.actions.is_empty() {
            self.finish(model, events);
            return self.outcome(false);
        }

        let cx = ActionContext {
            model,
            events,
            now,
            elapsed: now.saturating_sub(started_at),
        };
        let action = &self.actions[self.cursor];

        if self.phase == ActionPhase::Pending {
            if !action.can_start(&cx) {
                return self.outcome(false);
            }
            info!("Action '{}' running", action.name());
            events.trigger(
                EventKind::ActionStarted,
                json!({ "scenario": self.name, "action": action.name(), "index": self.cursor }),
            );
            if let Err(err) = action.execute(&cx) {
                error!("Action '{}' side effect failed: {}", action.name(), err);
            }
            self.phase = ActionPhase::Running;
        }

        if !action.is_complete(&cx) {
            return self.outcome(false);
        }

        info!("Action '{}' done", action.name());
        self.phase = ActionPhase::Done;
        events.trigger(
            EventKind::ActionComplete,
            json!({ "scenario": self.name, "action": action.name(), "index": self.cursor }),
        );

        if self.cursor + 1 < self.actions.len() {
            self.cursor += 1;
            self.phase = ActionPhase::Pending;
        } else {
            self.finish(model, events);
        }
        self.outcome(true)
    }

    fn finish(&mut self, model: &Model, events: &EventExecutor) {
        self.is_end = true;
        self.is_win = (self.win_condition)(model);
        info!("Scenario '{}' ended (win: {})", self.name, self.is_win);
        events.trigger(
            EventKind::ScenarioEnded,
            json!({ "scenario": self.name, "is_win": self.is_win }),
        );
    }
}
