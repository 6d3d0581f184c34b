use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::{
    config::SimulationConfig,
    engine::EngineBuilder,
    error::{SimError, SimResult},
    factors::FactorDefinition,
    geometry::{DistanceMatrix, DistanceProvider, EuclideanDistance},
    world::{CitySeed, Location, World},
};

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub description: Option<String>,
    pub simulation: SimulationConfig,
    pub factors: Vec<FactorDefinition>,
    pub cities: Vec<ScenarioCity>,
    /// Row-major distances in city order; coordinates are used when absent.
    #[serde(default)]
    pub distances: Option<Vec<Vec<f64>>>,
    /// Factor names that drive migration; every factor when absent.
    #[serde(default)]
    pub drivers: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioCity {
    pub name: String,
    pub population: f64,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    pub factors: BTreeMap<String, f64>,
}

pub struct ScenarioLoader {
    base_dir: PathBuf,
}

impl ScenarioLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<Scenario> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
        let scenario: Scenario = serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(scenario)
    }
}

impl Scenario {
    pub fn build_world(&self) -> SimResult<World> {
        let mut world = World::new(self.factors.clone())?;
        for city in &self.cities {
            world.add_city(CitySeed {
                name: city.name.clone(),
                population: city.population,
                location: Location::new(city.x, city.y),
                factor_values: city.factors.clone(),
            })?;
        }
        Ok(world)
    }

    pub fn geometry(&self) -> SimResult<Box<dyn DistanceProvider>> {
        match &self.distances {
            Some(rows) => Ok(Box::new(DistanceMatrix::new(rows.clone())?)),
            None => Ok(Box::new(EuclideanDistance)),
        }
    }

    /// Resolves driver names against the world's registry.
    pub fn drivers(&self, world: &World) -> SimResult<Option<Vec<FactorDefinition>>> {
        let Some(names) = &self.drivers else {
            return Ok(None);
        };
        names
            .iter()
            .map(|name| {
                world
                    .factor_by_name(name)
                    .cloned()
                    .ok_or_else(|| SimError::UndefinedFactor { name: name.clone() })
            })
            .collect::<SimResult<Vec<_>>>()
            .map(Some)
    }

    /// Wires geometry and drivers for `world` under `config`.
    pub fn engine_builder(&self, world: &World, config: SimulationConfig) -> SimResult<EngineBuilder> {
        let mut builder = EngineBuilder::new(config).with_boxed_geometry(self.geometry()?);
        if let Some(drivers) = self.drivers(world)? {
            builder = builder.with_drivers(drivers);
        }
        Ok(builder)
    }

    pub fn total_population(&self) -> f64 {
        self.cities.iter().map(|city| city.population).sum()
    }
}
