use crate::error::{SimError, SimResult};
use crate::world::{CityId, World};

/// Distances below this are treated as this, so coincident cities stay finite.
pub const MIN_DISTANCE: f64 = 1e-6;

/// Read-only source of distances between city pairs.
pub trait DistanceProvider {
    fn distance(&self, world: &World, from: CityId, to: CityId) -> f64;

    /// Checks that every city pair of `world` has a distance.
    fn check_covers(&self, _world: &World) -> SimResult<()> {
        Ok(())
    }
}

/// Straight-line distance between city coordinates.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanDistance;

impl DistanceProvider for EuclideanDistance {
    fn distance(&self, world: &World, from: CityId, to: CityId) -> f64 {
        world
            .city(from)
            .location()
            .distance_to(&world.city(to).location())
    }
}

/// Precomputed distances, row-major by city index.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    size: usize,
    values: Vec<f64>,
}

impl DistanceMatrix {
    pub fn new(rows: Vec<Vec<f64>>) -> SimResult<Self> {
        let size = rows.len();
        let mut values = Vec::with_capacity(size * size);
        for (index, row) in rows.into_iter().enumerate() {
            if row.len() != size {
                return Err(SimError::InvalidWorld(format!(
                    "distance matrix row {index} has {} entries, expected {size}",
                    row.len()
                )));
            }
            if row.iter().any(|value| !value.is_finite() || *value < 0.0) {
                return Err(SimError::InvalidWorld(format!(
                    "distance matrix row {index} has negative or non-finite entries"
                )));
            }
            values.extend(row);
        }
        Ok(Self { size, values })
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

impl DistanceProvider for DistanceMatrix {
    fn distance(&self, _world: &World, from: CityId, to: CityId) -> f64 {
        self.values[from.raw() * self.size + to.raw()]
    }

    fn check_covers(&self, world: &World) -> SimResult<()> {
        if self.size != world.len() {
            return Err(SimError::InvalidWorld(format!(
                "distance matrix is {}x{} but the world has {} cities",
                self.size,
                self.size,
                world.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::FactorDefinition;
    use crate::world::CitySeed;

    fn world() -> World {
        let mut world = World::new(vec![FactorDefinition::new("wage", 0.0, 1.0)]).unwrap();
        world
            .add_city(CitySeed::new("a", 1.0).with_factor("wage", 0.5))
            .unwrap();
        world
            .add_city(CitySeed::new("b", 1.0).at(6.0, 8.0).with_factor("wage", 0.5))
            .unwrap();
        world
    }

    #[test]
    fn euclidean_uses_coordinates() {
        let world = world();
        let ids: Vec<_> = world.city_ids().collect();
        assert_eq!(EuclideanDistance.distance(&world, ids[0], ids[1]), 10.0);
    }

    #[test]
    fn matrix_is_indexed_by_city() {
        let world = world();
        let matrix = DistanceMatrix::new(vec![vec![0.0, 3.0], vec![4.0, 0.0]]).unwrap();
        matrix.check_covers(&world).unwrap();
        let ids: Vec<_> = world.city_ids().collect();
        assert_eq!(matrix.distance(&world, ids[0], ids[1]), 3.0);
        assert_eq!(matrix.distance(&world, ids[1], ids[0]), 4.0);
    }

    #[test]
    fn ragged_or_negative_matrix_is_rejected() {
        assert!(DistanceMatrix::new(vec![vec![0.0, 1.0], vec![1.0]]).is_err());
        assert!(DistanceMatrix::new(vec![vec![0.0, -1.0], vec![1.0, 0.0]]).is_err());
        let small = DistanceMatrix::new(vec![vec![0.0]]).unwrap();
        assert!(small.check_covers(&world()).is_err());
    }
}
