use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::factors::{ensure_defined, FactorDefinition, FactorId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CityId(usize);

impl CityId {
    pub fn raw(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
}

impl Location {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Location) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Initial state for a city, keyed by factor name.
#[derive(Debug, Clone)]
pub struct CitySeed {
    pub name: String,
    pub population: f64,
    pub location: Location,
    pub factor_values: BTreeMap<String, f64>,
}

impl CitySeed {
    pub fn new(name: impl Into<String>, population: f64) -> Self {
        Self {
            name: name.into(),
            population,
            location: Location::default(),
            factor_values: BTreeMap::new(),
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.location = Location::new(x, y);
        self
    }

    pub fn with_factor(mut self, name: impl Into<String>, value: f64) -> Self {
        self.factor_values.insert(name.into(), value);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct City {
    id: CityId,
    name: String,
    population: f64,
    location: Location,
    // One slot per registered factor, in registry order.
    factor_values: Vec<f64>,
}

impl City {
    pub fn id(&self) -> CityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn population(&self) -> f64 {
        self.population
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn factor_value(&self, factor: FactorId) -> f64 {
        self.factor_values[factor.index()]
    }

    pub fn factor_values(&self) -> &[f64] {
        &self.factor_values
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitySnapshot {
    pub id: usize,
    pub name: String,
    pub population: f64,
    pub factors: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub total_population: f64,
    pub cities: Vec<CitySnapshot>,
}

/// Cities and the factor registry they are measured against.
#[derive(Debug, Clone)]
pub struct World {
    cities: Vec<City>,
    factors: Vec<FactorDefinition>,
}

impl World {
    /// Creates an empty world over a fixed factor registry.
    pub fn new(factors: Vec<FactorDefinition>) -> SimResult<Self> {
        let mut names = HashSet::new();
        for factor in &factors {
            factor.validate()?;
            if !names.insert(factor.name.as_str()) {
                return Err(SimError::InvalidWorld(format!(
                    "factor '{}' defined more than once",
                    factor.name
                )));
            }
        }
        Ok(Self {
            cities: Vec::new(),
            factors,
        })
    }

    pub fn add_city(&mut self, seed: CitySeed) -> SimResult<CityId> {
        if self.cities.iter().any(|city| city.name == seed.name) {
            return Err(SimError::InvalidWorld(format!(
                "city '{}' defined more than once",
                seed.name
            )));
        }
        if !seed.population.is_finite() || seed.population < 0.0 {
            return Err(SimError::InvalidWorld(format!(
                "city '{}' has invalid population {}",
                seed.name, seed.population
            )));
        }
        if !seed.location.x.is_finite() || !seed.location.y.is_finite() {
            return Err(SimError::InvalidWorld(format!(
                "city '{}' has non-finite coordinates",
                seed.name
            )));
        }
        for name in seed.factor_values.keys() {
            if self.factor_by_name(name).is_none() {
                return Err(SimError::UndefinedFactor { name: name.clone() });
            }
        }

        let mut factor_values = Vec::with_capacity(self.factors.len());
        for factor in &self.factors {
            let value = seed.factor_values.get(&factor.name).copied().ok_or_else(|| {
                SimError::InvalidWorld(format!(
                    "city '{}' is missing a value for factor '{}'",
                    seed.name, factor.name
                ))
            })?;
            if !factor.contains(value) {
                return Err(SimError::InvalidWorld(format!(
                    "city '{}' has {} = {} outside [{}, {}]",
                    seed.name, factor.name, value, factor.min, factor.max
                )));
            }
            factor_values.push(value);
        }

        let id = CityId(self.cities.len());
        self.cities.push(City {
            id,
            name: seed.name,
            population: seed.population,
            location: seed.location,
            factor_values,
        });
        Ok(id)
    }

    pub fn factors(&self) -> &[FactorDefinition] {
        &self.factors
    }

    pub fn factor(&self, id: FactorId) -> &FactorDefinition {
        &self.factors[id.index()]
    }

    pub fn factor_by_name(&self, name: &str) -> Option<&FactorDefinition> {
        self.factors.iter().find(|factor| factor.name == name)
    }

    pub fn cities(&self) -> &[City] {
        &self.cities
    }

    pub fn city(&self, id: CityId) -> &City {
        &self.cities[id.0]
    }

    pub fn city_by_name(&self, name: &str) -> Option<&City> {
        self.cities.iter().find(|city| city.name == name)
    }

    pub fn city_ids(&self) -> impl Iterator<Item = CityId> + '_ {
        self.cities.iter().map(|city| city.id)
    }

    pub fn len(&self) -> usize {
        self.cities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }

    pub fn total_population(&self) -> f64 {
        self.cities.iter().map(|city| city.population).sum()
    }

    pub fn populations(&self) -> Vec<f64> {
        self.cities.iter().map(|city| city.population).collect()
    }

    pub fn factor_value(&self, city: CityId, factor: &FactorDefinition) -> SimResult<f64> {
        let slot = ensure_defined(self, factor)?;
        Ok(self.city(city).factor_value(slot))
    }

    /// Writes a factor value, clamping it into the factor's declared range.
    pub fn set_factor_value(
        &mut self,
        city: CityId,
        factor: &FactorDefinition,
        value: f64,
    ) -> SimResult<f64> {
        let slot = ensure_defined(self, factor)?;
        let clamped = factor.clamp(value);
        self.cities[city.0].factor_values[slot.index()] = clamped;
        Ok(clamped)
    }

    pub(crate) fn set_population(&mut self, city: CityId, population: f64) {
        self.cities[city.0].population = population.max(0.0);
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        let cities = self
            .cities
            .iter()
            .map(|city| CitySnapshot {
                id: city.id.raw(),
                name: city.name.clone(),
                population: city.population,
                factors: self
                    .factors
                    .iter()
                    .zip(&city.factor_values)
                    .map(|(factor, value)| (factor.name.clone(), *value))
                    .collect(),
            })
            .collect();
        WorldSnapshot {
            total_population: self.total_population(),
            cities,
        }
    }
}
