//! Statistics engines and the per-service dispatch feeding them

mod accumulator;
mod carry_over;
pub mod continuous;
pub mod discrete;
mod dispatch;
mod output;

pub use accumulator::{Accumulator, ActivityAccumulator, MomentAccumulator, Moments};
pub use carry_over::{filter_carry_over, Timed};
pub use continuous::ContinuousStatistics;
pub use discrete::DiscreteStatistics;
pub use dispatch::{identify_service_type, ServiceType, Treatment, UnitTag};
pub use output::{AggregationContext, ObservationIdGenerator};

use crate::{AggregationError, AggregationWindow, Result};

/// Share of the window a unit was connected
pub fn time_weighting(unit: &str, connected_ms: i64, window: &AggregationWindow) -> Result<f64> {
    let window_ms = window.duration_millis();
    if connected_ms > window_ms {
        return Err(AggregationError::ConnectionTimeExceedsWindow {
            unit: unit.to_string(),
            connected_ms,
            window_ms,
        });
    }
    if window_ms == 0 {
        return Ok(0.0);
    }
    let weighting = connected_ms as f64 / window_ms as f64;
    if !(0.0..=1.0).contains(&weighting) {
        return Err(AggregationError::TimeWeightingOutOfRange(weighting));
    }
    Ok(weighting)
}
