//! Validated, immutable run configuration.

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

fn default_threshold() -> f64 {
    0.01
}

fn default_true() -> bool {
    true
}

fn default_smoothing() -> f64 {
    0.3
}

fn default_warmup_ticks() -> u64 {
    2
}

fn default_check_interval() -> u64 {
    1
}

fn default_gravity_constant() -> f64 {
    0.01
}

fn default_distance_exponent() -> f64 {
    1.0
}

/// Which convergence measure the stability detector applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilityStrategy {
    /// Sum of absolute per-city population change.
    #[default]
    AbsoluteChange,
    /// Absolute change divided by total population.
    RelativeChange,
}

/// Raw, unvalidated form. Only reachable through [`SimulationConfig::builder`]
/// or deserialization, both of which validate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfigBuilder {
    #[serde(default)]
    max_steps: u64,
    #[serde(default = "default_threshold")]
    stabilization_threshold: f64,
    #[serde(default = "default_true")]
    check_stabilization: bool,
    #[serde(default = "default_smoothing")]
    feedback_smoothing_factor: f64,
    #[serde(default)]
    random_seed: Option<u64>,
    #[serde(default = "default_warmup_ticks")]
    stability_warmup_ticks: u64,
    #[serde(default = "default_check_interval")]
    stability_check_interval: u64,
    #[serde(default)]
    stability_strategy: StabilityStrategy,
    #[serde(default = "default_gravity_constant")]
    gravity_constant: f64,
    #[serde(default = "default_distance_exponent")]
    distance_exponent: f64,
    #[serde(default)]
    flow_noise: f64,
}

impl Default for SimulationConfigBuilder {
    fn default() -> Self {
        Self {
            max_steps: 0,
            stabilization_threshold: default_threshold(),
            check_stabilization: true,
            feedback_smoothing_factor: default_smoothing(),
            random_seed: None,
            stability_warmup_ticks: default_warmup_ticks(),
            stability_check_interval: default_check_interval(),
            stability_strategy: StabilityStrategy::default(),
            gravity_constant: default_gravity_constant(),
            distance_exponent: default_distance_exponent(),
            flow_noise: 0.0,
        }
    }
}

impl SimulationConfigBuilder {
    pub fn max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn stabilization_threshold(mut self, threshold: f64) -> Self {
        self.stabilization_threshold = threshold;
        self
    }

    pub fn check_stabilization(mut self, enabled: bool) -> Self {
        self.check_stabilization = enabled;
        self
    }

    pub fn feedback_smoothing_factor(mut self, alpha: f64) -> Self {
        self.feedback_smoothing_factor = alpha;
        self
    }

    pub fn random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    pub fn stability_warmup_ticks(mut self, ticks: u64) -> Self {
        self.stability_warmup_ticks = ticks;
        self
    }

    pub fn stability_check_interval(mut self, interval: u64) -> Self {
        self.stability_check_interval = interval;
        self
    }

    pub fn stability_strategy(mut self, strategy: StabilityStrategy) -> Self {
        self.stability_strategy = strategy;
        self
    }

    pub fn gravity_constant(mut self, k: f64) -> Self {
        self.gravity_constant = k;
        self
    }

    pub fn distance_exponent(mut self, p: f64) -> Self {
        self.distance_exponent = p;
        self
    }

    pub fn flow_noise(mut self, noise: f64) -> Self {
        self.flow_noise = noise;
        self
    }

    pub fn build(self) -> SimResult<SimulationConfig> {
        if self.max_steps == 0 {
            return Err(invalid("max_steps must be greater than zero"));
        }
        unit_interval("stabilization_threshold", self.stabilization_threshold)?;
        unit_interval("feedback_smoothing_factor", self.feedback_smoothing_factor)?;
        unit_interval("flow_noise", self.flow_noise)?;
        if self.stability_check_interval == 0 {
            return Err(invalid("stability_check_interval must be greater than zero"));
        }
        non_negative("gravity_constant", self.gravity_constant)?;
        non_negative("distance_exponent", self.distance_exponent)?;

        Ok(SimulationConfig {
            max_steps: self.max_steps,
            stabilization_threshold: self.stabilization_threshold,
            check_stabilization: self.check_stabilization,
            feedback_smoothing_factor: self.feedback_smoothing_factor,
            random_seed: self.random_seed,
            stability_warmup_ticks: self.stability_warmup_ticks,
            stability_check_interval: self.stability_check_interval,
            stability_strategy: self.stability_strategy,
            gravity_constant: self.gravity_constant,
            distance_exponent: self.distance_exponent,
            flow_noise: self.flow_noise,
        })
    }
}

fn invalid(message: impl Into<String>) -> SimError {
    SimError::InvalidConfiguration(message.into())
}

fn unit_interval(field: &str, value: f64) -> SimResult<()> {
    // NaN fails the range check too.
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(format!("{field} must be within [0, 1], got {value}")))
    }
}

fn non_negative(field: &str, value: f64) -> SimResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(format!(
            "{field} must be finite and non-negative, got {value}"
        )))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SimulationConfigBuilder", into = "SimulationConfigBuilder")]
pub struct SimulationConfig {
    max_steps: u64,
    stabilization_threshold: f64,
    check_stabilization: bool,
    feedback_smoothing_factor: f64,
    random_seed: Option<u64>,
    stability_warmup_ticks: u64,
    stability_check_interval: u64,
    stability_strategy: StabilityStrategy,
    gravity_constant: f64,
    distance_exponent: f64,
    flow_noise: f64,
}

impl TryFrom<SimulationConfigBuilder> for SimulationConfig {
    type Error = SimError;

    fn try_from(value: SimulationConfigBuilder) -> Result<Self, Self::Error> {
        value.build()
    }
}

impl From<SimulationConfig> for SimulationConfigBuilder {
    fn from(value: SimulationConfig) -> Self {
        value.to_builder()
    }
}

impl SimulationConfig {
    pub fn builder() -> SimulationConfigBuilder {
        SimulationConfigBuilder::default()
    }

    /// Starts a builder pre-filled with this configuration, for overrides.
    pub fn to_builder(&self) -> SimulationConfigBuilder {
        SimulationConfigBuilder {
            max_steps: self.max_steps,
            stabilization_threshold: self.stabilization_threshold,
            check_stabilization: self.check_stabilization,
            feedback_smoothing_factor: self.feedback_smoothing_factor,
            random_seed: self.random_seed,
            stability_warmup_ticks: self.stability_warmup_ticks,
            stability_check_interval: self.stability_check_interval,
            stability_strategy: self.stability_strategy,
            gravity_constant: self.gravity_constant,
            distance_exponent: self.distance_exponent,
            flow_noise: self.flow_noise,
        }
    }

    pub fn max_steps(&self) -> u64 {
        self.max_steps
    }

    pub fn stabilization_threshold(&self) -> f64 {
        self.stabilization_threshold
    }

    pub fn check_stabilization(&self) -> bool {
        self.check_stabilization
    }

    pub fn feedback_smoothing_factor(&self) -> f64 {
        self.feedback_smoothing_factor
    }

    pub fn random_seed(&self) -> Option<u64> {
        self.random_seed
    }

    pub fn stability_warmup_ticks(&self) -> u64 {
        self.stability_warmup_ticks
    }

    pub fn stability_check_interval(&self) -> u64 {
        self.stability_check_interval
    }

    pub fn stability_strategy(&self) -> StabilityStrategy {
        self.stability_strategy
    }

    pub fn gravity_constant(&self) -> f64 {
        self.gravity_constant
    }

    pub fn distance_exponent(&self) -> f64 {
        self.distance_exponent
    }

    pub fn flow_noise(&self) -> f64 {
        self.flow_noise
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = SimulationConfig::builder().max_steps(10).build().unwrap();
        assert_eq!(config.stabilization_threshold(), 0.01);
        assert!(config.check_stabilization());
        assert_eq!(config.feedback_smoothing_factor(), 0.3);
        assert_eq!(config.random_seed(), None);
        assert_eq!(config.stability_warmup_ticks(), 2);
        assert_eq!(config.stability_check_interval(), 1);
        assert_eq!(config.stability_strategy(), StabilityStrategy::AbsoluteChange);
    }

    #[test]
    fn zero_max_steps_is_rejected() {
        let err = SimulationConfig::builder().build().unwrap_err();
        assert!(matches!(err, SimError::InvalidConfiguration(_)));
    }

    #[test]
    fn out_of_range_values_are_rejected_not_clamped() {
        let base = || SimulationConfig::builder().max_steps(5);
        assert!(base().stabilization_threshold(1.5).build().is_err());
        assert!(base().stabilization_threshold(-0.1).build().is_err());
        assert!(base().feedback_smoothing_factor(1.01).build().is_err());
        assert!(base().feedback_smoothing_factor(f64::NAN).build().is_err());
        assert!(base().stability_check_interval(0).build().is_err());
        assert!(base().distance_exponent(-1.0).build().is_err());
        assert!(base().gravity_constant(f64::INFINITY).build().is_err());
        assert!(base().flow_noise(2.0).build().is_err());
    }

    #[test]
    fn boundary_values_are_accepted() {
        let config = SimulationConfig::builder()
            .max_steps(1)
            .stabilization_threshold(0.0)
            .feedback_smoothing_factor(1.0)
            .build()
            .unwrap();
        assert_eq!(config.stabilization_threshold(), 0.0);
        assert_eq!(config.feedback_smoothing_factor(), 1.0);
    }

    #[test]
    fn yaml_is_validated_on_load() {
        let ok: SimulationConfig = serde_yaml::from_str(
            "max_steps: 12\nrandom_seed: 7\nstability_strategy: relative_change\n",
        )
        .unwrap();
        assert_eq!(ok.max_steps(), 12);
        assert_eq!(ok.random_seed(), Some(7));
        assert_eq!(ok.stability_strategy(), StabilityStrategy::RelativeChange);

        let bad = serde_yaml::from_str::<SimulationConfig>(
            "max_steps: 12\nstabilization_threshold: 1.5\n",
        );
        assert!(bad.is_err());
    }

    #[test]
    fn to_builder_round_trips() {
        let config = SimulationConfig::builder()
            .max_steps(3)
            .random_seed(11)
            .build()
            .unwrap();
        let again = config.to_builder().max_steps(4).build().unwrap();
        assert_eq!(again.max_steps(), 4);
        assert_eq!(again.random_seed(), Some(11));
    }
}
