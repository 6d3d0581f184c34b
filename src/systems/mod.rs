mod feedback;
mod flow;
mod stability;

pub use feedback::FeedbackUpdater;
pub use flow::{apply_flows, FlowApplication, FlowCalculator, FlowMatrix};
pub use stability::{
    criterion_for, total_absolute_change, AbsoluteChange, RelativeChange, StabilityCriterion,
    StabilityDetector, MIN_HISTORY_TICKS,
};
