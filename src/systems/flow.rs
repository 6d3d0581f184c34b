//! Gravity-style migration flows.
//!
//! For every ordered pair of distinct cities `(i, j)`:
//!
//! ```text
//! flow(i -> j) = k * P(i) * max(score(j, i), 0) / d(i, j)^p
//! score(j, i)  = sum over driver factors of weight * (value(j) - value(i))
//! ```
//!
//! Each pair flow is capped at `P(i)`. All flows of a tick are computed from
//! the same read-only view of the world and only then applied.

use rand::Rng;
use tracing::warn;

use crate::config::SimulationConfig;
use crate::error::SimResult;
use crate::factors::{ensure_defined, FactorDefinition, FactorId};
use crate::geometry::{DistanceProvider, MIN_DISTANCE};
use crate::world::{CityId, World};

/// Directed flows for one tick, row-major by origin city.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowMatrix {
    size: usize,
    values: Vec<f64>,
}

impl FlowMatrix {
    fn zeros(size: usize) -> Self {
        Self {
            size,
            values: vec![0.0; size * size],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, from: CityId, to: CityId) -> f64 {
        self.values[from.raw() * self.size + to.raw()]
    }

    pub fn outflow(&self, from: CityId) -> f64 {
        let start = from.raw() * self.size;
        self.values[start..start + self.size].iter().sum()
    }

    pub fn inflow(&self, to: CityId) -> f64 {
        (0..self.size)
            .map(|from| self.values[from * self.size + to.raw()])
            .sum()
    }

    /// Inflow minus outflow before any clamping.
    pub fn net_inflow(&self, city: CityId) -> f64 {
        self.inflow(city) - self.outflow(city)
    }

    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }
}

/// What applying a tick's flows did to the world.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowApplication {
    pub inflow: Vec<f64>,
    pub outflow: Vec<f64>,
    /// Origins whose computed outflow exceeded their population.
    pub clamped: Vec<CityId>,
    pub population_before: f64,
    pub population_after: f64,
}

impl FlowApplication {
    pub fn gross_movement(&self, city: CityId) -> f64 {
        self.inflow[city.raw()] + self.outflow[city.raw()]
    }
}

/// Computes flows from the factors that drive migration.
#[derive(Debug, Clone, Default)]
pub struct FlowCalculator {
    // None means every registered factor.
    drivers: Option<Vec<FactorDefinition>>,
}

impl FlowCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_drivers(drivers: Vec<FactorDefinition>) -> Self {
        Self {
            drivers: Some(drivers),
        }
    }

    pub fn drivers(&self) -> Option<&[FactorDefinition]> {
        self.drivers.as_deref()
    }

    /// Resolves driver factors to registry slots and their weights.
    pub fn resolve(&self, world: &World) -> SimResult<Vec<(FactorId, f64)>> {
        match &self.drivers {
            Some(drivers) => drivers
                .iter()
                .map(|factor| Ok((ensure_defined(world, factor)?, factor.weight)))
                .collect(),
            None => Ok(world
                .factors()
                .iter()
                .enumerate()
                .map(|(index, factor)| (FactorId(index), factor.weight))
                .collect()),
        }
    }

    pub fn compute<R: Rng>(
        &self,
        world: &World,
        geometry: &dyn DistanceProvider,
        config: &SimulationConfig,
        rng: &mut R,
    ) -> SimResult<FlowMatrix> {
        geometry.check_covers(world)?;
        let drivers = self.resolve(world)?;
        let size = world.len();
        let mut flows = FlowMatrix::zeros(size);
        let k = config.gravity_constant();
        let p = config.distance_exponent();
        let noise = config.flow_noise();

        for origin in world.cities() {
            for destination in world.cities() {
                if origin.id() == destination.id() {
                    continue;
                }
                let score: f64 = drivers
                    .iter()
                    .map(|(slot, weight)| {
                        weight * (destination.factor_value(*slot) - origin.factor_value(*slot))
                    })
                    .sum();
                let distance = geometry
                    .distance(world, origin.id(), destination.id())
                    .max(MIN_DISTANCE);
                let attractiveness = score.max(0.0) / distance.powf(p);
                let mut flow = k * origin.population() * attractiveness;
                // Drawn for every pair so the stream position never depends on state.
                if noise > 0.0 {
                    let jitter: f64 = rng.gen_range(-1.0..=1.0);
                    flow *= 1.0 + noise * jitter;
                }
                flows.values[origin.id().raw() * size + destination.id().raw()] =
                    bounded_flow(flow, origin.population());
            }
        }
        Ok(flows)
    }
}

/// A single pair never moves more people than the origin holds.
///
/// `distance^p` can underflow to zero for large exponents, making the raw
/// flow infinite or NaN (`0 * inf`); those collapse to the origin's
/// population and zero respectively.
fn bounded_flow(flow: f64, population: f64) -> f64 {
    if flow.is_nan() {
        0.0
    } else {
        flow.clamp(0.0, population)
    }
}

/// Moves population along `flows`.
///
/// An origin whose total outflow exceeds its population has all of its
/// outflows scaled down to exactly its population.
pub fn apply_flows(world: &mut World, flows: &FlowMatrix) -> FlowApplication {
    let size = world.len();
    let populations = world.populations();
    let population_before: f64 = populations.iter().sum();
    let mut inflow = vec![0.0; size];
    let mut outflow = vec![0.0; size];
    let mut clamped = Vec::new();

    for origin in 0..size {
        let origin_id = world.cities()[origin].id();
        let requested = flows.outflow(origin_id);
        let available = populations[origin];
        let scale = if requested > available {
            warn!(
                city = world.city(origin_id).name(),
                requested,
                available,
                "outflow exceeds population, clamping"
            );
            clamped.push(origin_id);
            available / requested
        } else {
            1.0
        };
        for destination in 0..size {
            let moved = flows.values[origin * size + destination] * scale;
            outflow[origin] += moved;
            inflow[destination] += moved;
        }
    }

    let ids: Vec<CityId> = world.city_ids().collect();
    for id in ids {
        let index = id.raw();
        world.set_population(id, populations[index] - outflow[index] + inflow[index]);
    }

    FlowApplication {
        inflow,
        outflow,
        clamped,
        population_before,
        population_after: world.total_population(),
    }
}
