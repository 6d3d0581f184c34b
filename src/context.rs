use crate::rng::{PhaseRng, RngManager};
use crate::world::World;

/// Per-city state captured at the start of a tick, before flows are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct TickHistory {
    pub tick: u64,
    pub populations: Vec<f64>,
    pub factor_values: Vec<Vec<f64>>,
}

impl TickHistory {
    pub fn capture(tick: u64, world: &World) -> Self {
        Self {
            tick,
            populations: world.populations(),
            factor_values: world
                .cities()
                .iter()
                .map(|city| city.factor_values().to_vec())
                .collect(),
        }
    }
}

/// Mutable state owned by a single run.
pub struct SimulationContext<'w> {
    world: &'w mut World,
    tick: u64,
    rng: RngManager,
    previous: Option<TickHistory>,
    clamped_outflows: u64,
}

impl<'w> SimulationContext<'w> {
    pub fn new(world: &'w mut World, seed: u64) -> Self {
        Self {
            world,
            tick: 0,
            rng: RngManager::new(seed),
            previous: None,
            clamped_outflows: 0,
        }
    }

    pub fn world(&self) -> &World {
        &*self.world
    }

    pub(crate) fn world_mut(&mut self) -> &mut World {
        &mut *self.world
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn seed(&self) -> u64 {
        self.rng.seed()
    }

    /// Snapshot taken at the start of the most recent tick.
    pub fn previous(&self) -> Option<&TickHistory> {
        self.previous.as_ref()
    }

    pub fn clamped_outflows(&self) -> u64 {
        self.clamped_outflows
    }

    /// Captures the start-of-tick state, keeps it as `previous` and returns it.
    pub(crate) fn record_history(&mut self) -> TickHistory {
        let history = TickHistory::capture(self.tick, &*self.world);
        self.previous = Some(history.clone());
        history
    }

    pub(crate) fn record_clamps(&mut self, count: usize) {
        self.clamped_outflows += count as u64;
    }

    pub(crate) fn advance_tick(&mut self) {
        self.tick += 1;
    }

    /// Borrows the world together with a random stream, for phases that need both.
    pub(crate) fn split(&mut self, stream: &str) -> (&World, PhaseRng<'_>) {
        (&*self.world, self.rng.stream(stream))
    }
}
