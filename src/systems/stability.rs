//! Convergence detection over the rolling one-tick population history.

use crate::config::{SimulationConfig, StabilityStrategy};
use crate::context::SimulationContext;

/// Minimum number of completed ticks before a run can be judged stable.
pub const MIN_HISTORY_TICKS: u64 = 2;

/// A convergence measure over the previous and current populations.
pub trait StabilityCriterion {
    fn name(&self) -> &'static str;
    /// Aggregate change between the two population vectors.
    fn change(&self, previous: &[f64], current: &[f64]) -> f64;
}

/// Sum of absolute per-city population change.
#[derive(Debug, Clone, Copy, Default)]
pub struct AbsoluteChange;

impl StabilityCriterion for AbsoluteChange {
    fn name(&self) -> &'static str {
        "absolute_change"
    }

    fn change(&self, previous: &[f64], current: &[f64]) -> f64 {
        total_absolute_change(previous, current)
    }
}

/// Absolute change as a fraction of the current total population.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelativeChange;

impl StabilityCriterion for RelativeChange {
    fn name(&self) -> &'static str {
        "relative_change"
    }

    fn change(&self, previous: &[f64], current: &[f64]) -> f64 {
        let absolute = total_absolute_change(previous, current);
        let total: f64 = current.iter().sum();
        if total > 0.0 {
            absolute / total
        } else {
            absolute
        }
    }
}

pub fn total_absolute_change(previous: &[f64], current: &[f64]) -> f64 {
    previous
        .iter()
        .zip(current)
        .map(|(before, after)| (after - before).abs())
        .sum()
}

pub fn criterion_for(strategy: StabilityStrategy) -> Box<dyn StabilityCriterion> {
    match strategy {
        StabilityStrategy::AbsoluteChange => Box::new(AbsoluteChange),
        StabilityStrategy::RelativeChange => Box::new(RelativeChange),
    }
}

pub struct StabilityDetector {
    criterion: Box<dyn StabilityCriterion>,
}

impl StabilityDetector {
    pub fn new(criterion: Box<dyn StabilityCriterion>) -> Self {
        Self { criterion }
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(criterion_for(config.stability_strategy()))
    }

    pub fn criterion_name(&self) -> &'static str {
        self.criterion.name()
    }

    /// Whether `tick` is one on which convergence is evaluated.
    pub fn should_check(&self, tick: u64, config: &SimulationConfig) -> bool {
        config.check_stabilization()
            && tick >= config.stability_warmup_ticks()
            && tick % config.stability_check_interval() == 0
    }

    /// True once the change since the previous tick is within the threshold.
    pub fn is_stable(&self, context: &SimulationContext<'_>, config: &SimulationConfig) -> bool {
        if context.current_tick() < MIN_HISTORY_TICKS {
            return false;
        }
        let Some(previous) = context.previous() else {
            return false;
        };
        let current = context.world().populations();
        self.criterion.change(&previous.populations, &current) <= config.stabilization_threshold()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::FactorDefinition;
    use crate::world::{CitySeed, World};

    fn world(populations: &[f64]) -> World {
        let mut world = World::new(vec![FactorDefinition::new("wage", 0.0, 1.0)]).unwrap();
        for (index, population) in populations.iter().enumerate() {
            world
                .add_city(CitySeed::new(format!("c{index}"), *population).with_factor("wage", 0.5))
                .unwrap();
        }
        world
    }

    fn config(threshold: f64) -> SimulationConfig {
        SimulationConfig::builder()
            .max_steps(100)
            .stabilization_threshold(threshold)
            .build()
            .unwrap()
    }

    fn run_ticks(context: &mut SimulationContext<'_>, ticks: u64) {
        for _ in 0..ticks {
            context.record_history();
            context.advance_tick();
        }
    }

    #[test]
    fn should_check_respects_toggle_warmup_and_interval() {
        let detector = StabilityDetector::new(Box::new(AbsoluteChange));
        let config = SimulationConfig::builder()
            .max_steps(100)
            .stability_warmup_ticks(4)
            .stability_check_interval(3)
            .build()
            .unwrap();
        assert!(!detector.should_check(3, &config));
        assert!(!detector.should_check(4, &config));
        assert!(detector.should_check(6, &config));
        assert!(!detector.should_check(7, &config));

        let disabled = config.to_builder().check_stabilization(false).build().unwrap();
        assert!(!detector.should_check(6, &disabled));
    }

    #[test]
    fn never_stable_before_two_ticks() {
        let mut world = world(&[10.0, 20.0]);
        let mut context = SimulationContext::new(&mut world, 1);
        let detector = StabilityDetector::new(Box::new(AbsoluteChange));
        assert!(!detector.is_stable(&context, &config(1.0)));
        run_ticks(&mut context, 1);
        assert!(!detector.is_stable(&context, &config(1.0)));
        run_ticks(&mut context, 1);
        assert!(detector.is_stable(&context, &config(1.0)));
    }

    #[test]
    fn zero_threshold_requires_identical_populations() {
        let mut world = world(&[10.0, 20.0]);
        let mut context = SimulationContext::new(&mut world, 1);
        run_ticks(&mut context, 2);
        let detector = StabilityDetector::new(Box::new(AbsoluteChange));
        assert!(detector.is_stable(&context, &config(0.0)));

        let id = context.world().city_ids().next().unwrap();
        let nudged = context.world().city(id).population() + 1e-9;
        context.world_mut().set_population(id, nudged);
        assert!(!detector.is_stable(&context, &config(0.0)));
    }

    #[test]
    fn relative_change_normalizes_by_total() {
        let criterion = RelativeChange;
        let change = criterion.change(&[100.0, 100.0], &[99.0, 101.0]);
        assert!((change - 0.01).abs() < 1e-12);
        assert_eq!(AbsoluteChange.change(&[100.0, 100.0], &[99.0, 101.0]), 2.0);
        assert_eq!(criterion.change(&[0.0], &[0.0]), 0.0);
    }

    #[test]
    fn detector_uses_configured_strategy() {
        let config = config(0.5)
            .to_builder()
            .stability_strategy(StabilityStrategy::RelativeChange)
            .build()
            .unwrap();
        assert_eq!(
            StabilityDetector::from_config(&config).criterion_name(),
            "relative_change"
        );
    }
}
