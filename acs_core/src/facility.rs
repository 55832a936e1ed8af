//! Top-level assembly.
//!
//! A [`Facility`] owns the one context and the one worker pool of a run and
//! hands clones of them to every engine. Nothing below it reaches for a
//! global.

use crate::config::FacilityConfig;
use crate::energy::EnergySystem;
use crate::error::{AcsError, AcsResult};
use crate::events::{Event, EventExecutor};
use crate::generator::{strategies_for_cell, PropertyGenerator};
use crate::ingest::{ControlMessageConsumer, MessageConsumer, QueueIngestor};
use crate::model::Model;
use crate::repair::RepairTeamDispatcher;
use crate::scenario::{Scenario, Scenarist};
use crate::status::StatusReport;
use acs_env::{AcsContext, MessageSource, WorkerPool};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Strategies per cell: one per subsystem kind plus the health strategy.
const STRATEGIES_PER_CELL: u64 = 6;

pub struct Facility {
    config: FacilityConfig,
    ctx: Arc<dyn AcsContext>,
    pool: WorkerPool,
    model: Model,
    events: EventExecutor,
    generator: PropertyGenerator,
    scenarist: Scenarist,
    dispatcher: RepairTeamDispatcher,
    energy: EnergySystem,
    ingestor: Arc<QueueIngestor>,
    ingest_started: bool,
}

impl Facility {
    /// Builds the model and every engine, and registers the stock strategies
    /// and the cell-control queue consumer. Nothing runs until [`start`].
    ///
    /// [`start`]: Facility::start
    pub fn new(config: FacilityConfig, ctx: Arc<dyn AcsContext>) -> AcsResult<Self> {
        if config.pool_size < config.minimum_pool_size() {
            warn!(
                "Worker pool of {} is below the {} long-running tasks of this facility; ticks will be dropped",
                config.pool_size,
                config.minimum_pool_size()
            );
        }

        let pool = WorkerPool::new(config.pool_size);
        let model = Model::new(config.cells.iter().cloned(), config.teams.iter().cloned());
        let events = EventExecutor::new(Arc::clone(&ctx), config.event_tick);

        let mut generator = PropertyGenerator::new();
        for (index, (name, cell)) in model.power_cells.iter().enumerate() {
            let strategies = strategies_for_cell(
                name,
                cell,
                |i| ctx.derive_seed(i),
                index as u64 * STRATEGIES_PER_CELL,
                config.alarm_threshold,
                config.wear_scale,
            );
            for strategy in strategies {
                generator.push_strategy(strategy)?;
            }
        }

        let scenarist = Scenarist::new(Arc::clone(&ctx), model.clone(), events.clone());
        let dispatcher = RepairTeamDispatcher::new(
            Arc::clone(&ctx),
            model.clone(),
            events.clone(),
            pool.clone(),
            config.journey,
        );
        let energy = EnergySystem::new(model.clone());

        let mut ingestor = QueueIngestor::new(config.queue.clone());
        ingestor.add_consumer(ControlMessageConsumer::new(energy.clone()))?;

        info!(
            "Facility assembled: {} cells, {} teams, {} strategies, pool {}",
            model.power_cells.len(),
            model.repair_teams.len(),
            generator.len(),
            pool.limit()
        );

        Ok(Self {
            config,
            ctx,
            pool,
            model,
            events,
            generator,
            scenarist,
            dispatcher,
            energy,
            ingestor: Arc::new(ingestor),
            ingest_started: false,
        })
    }

    /// Registers an extra queue consumer. Only valid before ingestion starts.
    pub fn add_consumer(&mut self, consumer: impl MessageConsumer + 'static) -> AcsResult<()> {
        match Arc::get_mut(&mut self.ingestor) {
            Some(ingestor) if !self.ingest_started => ingestor.add_consumer(consumer),
            _ => Err(AcsError::invalid_state("queue ingestion already started")),
        }
    }

    pub fn set_scenario(&self, scenario: Scenario) {
        self.scenarist.set_scenario(scenario);
    }

    /// Starts the event clock with `notify` as its push observer, then the
    /// property generator and the scenario driver.
    ///
    /// Fails without starting anything while any of them still runs. After
    /// `stop` the facility can be started again.
    pub fn start<F>(&mut self, notify: F) -> AcsResult<()>
    where
        F: Fn(&Event) -> AcsResult<()> + Send + Sync + 'static,
    {
        let running: Vec<&str> = [
            ("event executor", self.events.is_running()),
            ("property generator", self.generator.is_running()),
            ("scenarist", self.scenarist.is_running()),
        ]
        .into_iter()
        .filter_map(|(name, running)| running.then_some(name))
        .collect();
        if !running.is_empty() {
            return Err(AcsError::invalid_state(format!(
                "facility already running ({})",
                running.join(", ")
            )));
        }

        self.events.start(notify)?;
        self.generator.start(
            Arc::clone(&self.ctx),
            self.config.generator_interval,
            self.pool.clone(),
        )?;
        self.scenarist
            .start(self.config.scenario_interval, self.pool.clone())?;
        info!("Facility started");
        Ok(())
    }

    /// Spawns the queue ingestion loop on `source`.
    pub fn start_ingest(&mut self, source: Arc<dyn MessageSource>) -> AcsResult<()> {
        if self.ingest_started {
            return Err(AcsError::invalid_state("queue ingestion already started"));
        }
        self.ingest_started = true;

        let ingestor = Arc::clone(&self.ingestor);
        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move {
            if let Err(err) = ingestor.run(ctx, source).await {
                error!("Queue ingestion ended: {}", err);
            }
        });
        Ok(())
    }

    /// Stops every clock loop. Work already on the pool finishes on its own;
    /// undelivered events are discarded.
    pub fn stop(&self) {
        self.generator.stop();
        self.scenarist.stop();
        self.ingestor.stop();
        self.events.stop();
        info!("Facility stopped");
    }

    pub fn status(&self) -> StatusReport {
        StatusReport::collect(self.ctx.as_ref(), &self.scenarist, self.config.debug)
    }

    pub fn config(&self) -> &FacilityConfig {
        &self.config
    }

    pub fn context(&self) -> &Arc<dyn AcsContext> {
        &self.ctx
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn events(&self) -> &EventExecutor {
        &self.events
    }

    pub fn generator(&self) -> &PropertyGenerator {
        &self.generator
    }

    pub fn scenarist(&self) -> &Scenarist {
        &self.scenarist
    }

    pub fn dispatcher(&self) -> &RepairTeamDispatcher {
        &self.dispatcher
    }

    pub fn energy(&self) -> &EnergySystem {
        &self.energy
    }

    pub fn ingestor(&self) -> &QueueIngestor {
        &self.ingestor
    }
}
