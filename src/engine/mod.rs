use serde::Serialize;
use tracing::{debug, info, info_span};

use crate::{
    config::SimulationConfig,
    context::SimulationContext,
    error::SimResult,
    factors::FactorDefinition,
    geometry::{DistanceProvider, EuclideanDistance},
    systems::{
        apply_flows, total_absolute_change, FeedbackUpdater, FlowCalculator, StabilityCriterion,
        StabilityDetector,
    },
    world::{World, WorldSnapshot},
};

const FLOW_STREAM: &str = "flow";

pub struct EngineBuilder {
    config: SimulationConfig,
    geometry: Box<dyn DistanceProvider>,
    flow: FlowCalculator,
    criterion: Option<Box<dyn StabilityCriterion>>,
}

impl EngineBuilder {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            geometry: Box::new(EuclideanDistance),
            flow: FlowCalculator::new(),
            criterion: None,
        }
    }

    pub fn with_geometry(mut self, geometry: impl DistanceProvider + 'static) -> Self {
        self.geometry = Box::new(geometry);
        self
    }

    pub fn with_boxed_geometry(mut self, geometry: Box<dyn DistanceProvider>) -> Self {
        self.geometry = geometry;
        self
    }

    /// Restricts the flow model to these factors instead of every registered one.
    pub fn with_drivers(mut self, drivers: Vec<FactorDefinition>) -> Self {
        self.flow = FlowCalculator::with_drivers(drivers);
        self
    }

    /// Overrides the criterion selected by the configured strategy.
    pub fn with_criterion(mut self, criterion: impl StabilityCriterion + 'static) -> Self {
        self.criterion = Some(Box::new(criterion));
        self
    }

    pub fn build(self) -> Engine {
        let stability = match self.criterion {
            Some(criterion) => StabilityDetector::new(criterion),
            None => StabilityDetector::from_config(&self.config),
        };
        Engine {
            feedback: FeedbackUpdater::new(self.config.feedback_smoothing_factor()),
            stability,
            geometry: self.geometry,
            flow: self.flow,
            config: self.config,
        }
    }
}

pub struct Engine {
    config: SimulationConfig,
    geometry: Box<dyn DistanceProvider>,
    flow: FlowCalculator,
    feedback: FeedbackUpdater,
    stability: StabilityDetector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    Running,
    Converged { tick: u64 },
    MaxStepsReached { tick: u64 },
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::Converged { .. } | RunState::MaxStepsReached { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Converged,
    MaxStepsReached,
}

/// State handed to hooks at the end of every tick.
#[derive(Debug, Clone, Serialize)]
pub struct TickSnapshot {
    pub tick: u64,
    pub total_population: f64,
    /// Sum of absolute per-city population change during this tick.
    pub total_change: f64,
    pub clamped_cities: Vec<String>,
    pub world: WorldSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub reason: TerminationReason,
    pub ticks: u64,
    pub seed: u64,
    pub change_series: Vec<f64>,
    pub clamped_outflows: u64,
}

impl Engine {
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Validates the world against this engine and prepares a run.
    ///
    /// Undefined driver factors and distance providers that do not cover the
    /// world are reported here, before any tick executes.
    pub fn begin<'e, 'w>(&'e self, world: &'w mut World) -> SimResult<SimulationRun<'e, 'w>> {
        self.geometry.check_covers(world)?;
        self.flow.resolve(world)?;
        let seed = self.config.random_seed().unwrap_or_else(rand::random);
        info!(
            seed,
            cities = world.len(),
            factors = world.factors().len(),
            max_steps = self.config.max_steps(),
            criterion = self.stability.criterion_name(),
            "simulation prepared"
        );
        Ok(SimulationRun {
            engine: self,
            context: SimulationContext::new(world, seed),
            state: RunState::NotStarted,
            change_series: Vec::new(),
        })
    }

    pub fn run(&self, world: &mut World) -> SimResult<RunOutcome> {
        self.run_with_hook(world, |_| {})
    }

    pub fn run_with_hook<F>(&self, world: &mut World, mut hook: F) -> SimResult<RunOutcome>
    where
        F: FnMut(&TickSnapshot),
    {
        let span = info_span!("simulation");
        let _guard = span.enter();
        let mut run = self.begin(world)?;
        while let Some(snapshot) = run.step()? {
            hook(&snapshot);
        }
        run.finish()
    }
}

/// A run in progress. Hosts may stop calling [`SimulationRun::step`] at any
/// tick boundary.
pub struct SimulationRun<'e, 'w> {
    engine: &'e Engine,
    context: SimulationContext<'w>,
    state: RunState,
    change_series: Vec<f64>,
}

impl<'e, 'w> SimulationRun<'e, 'w> {
    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn context(&self) -> &SimulationContext<'w> {
        &self.context
    }

    pub fn current_tick(&self) -> u64 {
        self.context.current_tick()
    }

    pub fn change_series(&self) -> &[f64] {
        &self.change_series
    }

    /// Executes one tick, or returns `None` once the run has terminated.
    pub fn step(&mut self) -> SimResult<Option<TickSnapshot>> {
        if self.state.is_terminal() {
            return Ok(None);
        }
        self.state = RunState::Running;
        let engine = self.engine;
        let config = &engine.config;

        let flows = {
            let (world, mut rng) = self.context.split(FLOW_STREAM);
            engine
                .flow
                .compute(world, engine.geometry.as_ref(), config, &mut rng)?
        };

        let history = self.context.record_history();
        let applied = apply_flows(self.context.world_mut(), &flows);
        self.context.record_clamps(applied.clamped.len());

        engine
            .feedback
            .update(self.context.world_mut(), &history, &applied)?;
        let total_change =
            total_absolute_change(&history.populations, &self.context.world().populations());
        self.change_series.push(total_change);

        self.context.advance_tick();
        let tick = self.context.current_tick();
        debug!(
            tick,
            total_change,
            total_population = applied.population_after,
            clamped = applied.clamped.len(),
            "tick complete"
        );

        // Convergence on the final permitted tick still counts as exhausting the budget.
        if tick < config.max_steps()
            && engine.stability.should_check(tick, config)
            && engine.stability.is_stable(&self.context, config)
        {
            self.state = RunState::Converged { tick };
            info!(tick, "simulation converged");
        } else if tick >= config.max_steps() {
            self.state = RunState::MaxStepsReached { tick };
            info!(tick, "simulation reached max steps");
        }

        let world = self.context.world();
        let clamped_cities = applied
            .clamped
            .iter()
            .map(|id| world.city(*id).name().to_string())
            .collect();
        Ok(Some(TickSnapshot {
            tick,
            total_population: world.total_population(),
            total_change,
            clamped_cities,
            world: world.snapshot(),
        }))
    }

    /// Runs the remaining ticks without a hook.
    pub fn run_to_end(&mut self) -> SimResult<()> {
        while self.step()?.is_some() {}
        Ok(())
    }

    /// Summarizes the run. Unfinished runs are driven to termination first.
    pub fn finish(mut self) -> SimResult<RunOutcome> {
        self.run_to_end()?;
        let (reason, ticks) = match self.state {
            RunState::Converged { tick } => (TerminationReason::Converged, tick),
            RunState::MaxStepsReached { tick } => (TerminationReason::MaxStepsReached, tick),
            RunState::NotStarted | RunState::Running => {
                unreachable!("run_to_end leaves the run in a terminal state")
            }
        };
        Ok(RunOutcome {
            reason,
            ticks,
            seed: self.context.seed(),
            change_series: self.change_series,
            clamped_outflows: self.context.clamped_outflows(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::CitySeed;

    fn world() -> World {
        let mut world = World::new(vec![FactorDefinition::new("wage", 0.0, 20.0)]).unwrap();
        world
            .add_city(CitySeed::new("low", 1000.0).with_factor("wage", 5.0))
            .unwrap();
        world
            .add_city(CitySeed::new("high", 500.0).at(10.0, 0.0).with_factor("wage", 10.0))
            .unwrap();
        world
    }

    fn config(max_steps: u64) -> SimulationConfig {
        SimulationConfig::builder()
            .max_steps(max_steps)
            .random_seed(3)
            .build()
            .unwrap()
    }

    #[test]
    fn run_moves_through_states() {
        let engine = EngineBuilder::new(config(3)).build();
        let mut world = world();
        let mut run = engine.begin(&mut world).unwrap();
        assert_eq!(run.state(), RunState::NotStarted);
        run.step().unwrap().unwrap();
        assert_eq!(run.state(), RunState::Running);
        run.run_to_end().unwrap();
        assert_eq!(run.state(), RunState::MaxStepsReached { tick: 3 });
        assert!(run.step().unwrap().is_none());
    }

    #[test]
    fn static_world_converges_after_warmup() {
        let mut world = World::new(vec![FactorDefinition::new("wage", 0.0, 20.0)]).unwrap();
        world
            .add_city(CitySeed::new("a", 100.0).with_factor("wage", 5.0))
            .unwrap();
        world
            .add_city(CitySeed::new("b", 100.0).at(1.0, 0.0).with_factor("wage", 5.0))
            .unwrap();
        let outcome = EngineBuilder::new(config(50)).build().run(&mut world).unwrap();
        assert_eq!(outcome.reason, TerminationReason::Converged);
        assert_eq!(outcome.ticks, 2);
        assert_eq!(outcome.change_series, vec![0.0, 0.0]);
    }

    #[test]
    fn change_is_measured_against_start_of_tick_state() {
        let engine = EngineBuilder::new(config(3)).build();
        let mut world = world();
        let mut run = engine.begin(&mut world).expect("world is covered");
        let snapshot = run
            .step()
            .expect("tick runs")
            .expect("run is not terminal");
        // 0.01 * 1000 * 5 / 10 leaves one city and arrives at the other
        assert!((snapshot.total_change - 10.0).abs() < 1e-12);
        assert_eq!(run.change_series(), &[snapshot.total_change]);
        let previous = run.context().previous().expect("history recorded");
        assert_eq!(previous.tick, 0);
        assert_eq!(previous.populations, vec![1000.0, 500.0]);
    }

    #[test]
    fn hook_sees_every_tick() {
        let engine = EngineBuilder::new(config(6)).build();
        let mut world = world();
        let mut ticks = Vec::new();
        let outcome = engine
            .run_with_hook(&mut world, |snapshot| ticks.push(snapshot.tick))
            .unwrap();
        assert_eq!(ticks, (1..=outcome.ticks).collect::<Vec<_>>());
    }

    #[test]
    fn undefined_driver_fails_before_first_tick() {
        let engine = EngineBuilder::new(config(5))
            .with_drivers(vec![FactorDefinition::new("climate", 0.0, 1.0)])
            .build();
        let mut world = world();
        let before = world.populations();
        assert!(engine.run(&mut world).is_err());
        assert_eq!(world.populations(), before);
    }
}
