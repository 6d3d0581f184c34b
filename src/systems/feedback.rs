use crate::context::TickHistory;
use crate::error::SimResult;
use crate::factors::ensure_defined;
use crate::systems::flow::FlowApplication;
use crate::world::World;

/// Blends each factor toward the value implied by the tick's migration.
///
/// Feedback is opt-in per factor: a factor reacts only through its
/// `pressure_response` and `turnover_response`, and both default to zero.
/// Factors that set neither keep their values for the whole run regardless of
/// the smoothing factor.
#[derive(Debug, Clone, Copy)]
pub struct FeedbackUpdater {
    smoothing: f64,
}

impl FeedbackUpdater {
    pub fn new(smoothing: f64) -> Self {
        Self { smoothing }
    }

    pub fn smoothing(&self) -> f64 {
        self.smoothing
    }

    /// `pre_tick` must be the snapshot taken before `applied` moved anyone.
    pub fn update(
        &self,
        world: &mut World,
        pre_tick: &TickHistory,
        applied: &FlowApplication,
    ) -> SimResult<()> {
        let alpha = self.smoothing;
        let factors = world.factors().to_vec();
        let ids: Vec<_> = world.city_ids().collect();

        for id in ids {
            let before = pre_tick.populations[id.raw()];
            let after = world.city(id).population();
            let (relative_change, turnover) = if before > 0.0 {
                ((after - before) / before, applied.gross_movement(id) / before)
            } else {
                (0.0, 0.0)
            };

            for factor in &factors {
                let slot = ensure_defined(world, factor)?;
                let old = pre_tick.factor_values[id.raw()][slot.index()];
                let observed = old
                    + factor.span()
                        * (factor.pressure_response * relative_change
                            + factor.turnover_response * turnover);
                let blended = alpha * observed + (1.0 - alpha) * old;
                world.set_factor_value(id, factor, blended)?;
            }
        }
        Ok(())
    }
}
