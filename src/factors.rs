//! Factor definitions and the registry guard.

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::world::World;

/// Index of a factor inside a world's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FactorId(pub(crate) usize);

impl FactorId {
    pub fn index(self) -> usize {
        self.0
    }
}

fn default_weight() -> f64 {
    1.0
}

/// Immutable descriptor of a migration driver.
///
/// Two definitions are the same factor only when every field matches, so a
/// definition that shares a name with a registered one but differs in range
/// or weights is still unknown to that world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorDefinition {
    pub name: String,
    pub min: f64,
    pub max: f64,
    /// Scales the differential between destination and origin.
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// How strongly relative population growth moves the observed value,
    /// in units of the factor's span. Zero by default, which keeps the
    /// factor fixed unless `turnover_response` is set.
    #[serde(default)]
    pub pressure_response: f64,
    /// How strongly gross movement through a city moves the observed value.
    #[serde(default)]
    pub turnover_response: f64,
}

impl FactorDefinition {
    pub fn new(name: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            name: name.into(),
            min,
            max,
            weight: default_weight(),
            pressure_response: 0.0,
            turnover_response: 0.0,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_pressure_response(mut self, response: f64) -> Self {
        self.pressure_response = response;
        self
    }

    pub fn with_turnover_response(mut self, response: f64) -> Self {
        self.turnover_response = response;
        self
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    pub(crate) fn validate(&self) -> SimResult<()> {
        if self.name.trim().is_empty() {
            return Err(SimError::InvalidWorld("factor name must not be empty".into()));
        }
        let numbers = [
            self.min,
            self.max,
            self.weight,
            self.pressure_response,
            self.turnover_response,
        ];
        if numbers.iter().any(|value| !value.is_finite()) {
            return Err(SimError::InvalidWorld(format!(
                "factor '{}' has non-finite parameters",
                self.name
            )));
        }
        if self.min > self.max {
            return Err(SimError::InvalidWorld(format!(
                "factor '{}' has min {} above max {}",
                self.name, self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Succeeds iff `factor` is a member of the world's registered definitions,
/// returning its registry slot.
pub fn ensure_defined(world: &World, factor: &FactorDefinition) -> SimResult<FactorId> {
    world
        .factors()
        .iter()
        .position(|registered| registered == factor)
        .map(FactorId)
        .ok_or_else(|| SimError::UndefinedFactor {
            name: factor.name.clone(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{CitySeed, World};

    fn wage() -> FactorDefinition {
        FactorDefinition::new("wage", 0.0, 100.0)
    }

    fn world() -> World {
        let mut world = World::new(vec![wage()]).unwrap();
        world
            .add_city(CitySeed::new("a", 10.0).with_factor("wage", 5.0))
            .unwrap();
        world
    }

    #[test]
    fn registered_factor_resolves_to_its_slot() {
        let world = world();
        assert_eq!(ensure_defined(&world, &wage()).unwrap().index(), 0);
    }

    #[test]
    fn unknown_factor_is_rejected() {
        let world = world();
        let err = ensure_defined(&world, &FactorDefinition::new("climate", 0.0, 1.0)).unwrap_err();
        assert_eq!(
            err,
            SimError::UndefinedFactor {
                name: "climate".into()
            }
        );
    }

    #[test]
    fn same_name_different_shape_is_rejected() {
        let world = world();
        let imposter = FactorDefinition::new("wage", 0.0, 50.0);
        assert!(matches!(
            ensure_defined(&world, &imposter),
            Err(SimError::UndefinedFactor { name }) if name == "wage"
        ));
        let reweighted = wage().with_weight(2.0);
        assert!(ensure_defined(&world, &reweighted).is_err());
    }

    #[test]
    fn inverted_range_fails_validation() {
        assert!(FactorDefinition::new("rent", 5.0, 1.0).validate().is_err());
    }
}
