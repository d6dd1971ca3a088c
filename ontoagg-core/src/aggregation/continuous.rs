//! Statistics of numeric state values

use super::accumulator::{Accumulator, MomentAccumulator, Moments};
use crate::model::ContinuousSummary;
use crate::{AggregationError, Literal, Result};

/// Aggregate of one continuous component over a window
#[derive(Debug, Clone, PartialEq)]
pub struct ContinuousStatistics {
    pub quantity: u32,
    pub mean: f64,
    pub variance: f64,
    pub standard_deviation: f64,
    pub time_weighting: f64,
}

impl ContinuousStatistics {
    fn from_moments(moments: Moments, time_weighting: f64) -> Result<Self> {
        if !moments.is_finite() {
            return Err(AggregationError::NonFiniteStatistics(format!(
                "mean {}, variance {} over {} values",
                moments.mean, moments.variance, moments.quantity
            )));
        }
        let quantity = u32::try_from(moments.quantity).map_err(|_| AggregationError::InvalidNumber {
            value: moments.quantity.to_string(),
            reason: "quantity exceeds 32 bits".to_string(),
        })?;
        Ok(Self {
            quantity,
            mean: moments.mean,
            variance: moments.variance,
            standard_deviation: moments.standard_deviation,
            time_weighting,
        })
    }
}

/// Mean, population variance and deviation of raw literal values
pub fn aggregate_values<'a>(
    values: impl IntoIterator<Item = &'a Literal>,
    time_weighting: f64,
) -> Result<ContinuousStatistics> {
    let mut acc = MomentAccumulator::default();
    for literal in values {
        acc.add(literal.as_f64()?);
    }
    let moments = acc.moments().ok_or(AggregationError::EmptyInput)?;
    ContinuousStatistics::from_moments(moments, time_weighting)
}

/// Pool child summaries into the statistics of their combined sample
pub fn aggregate_summaries<'a>(
    summaries: impl IntoIterator<Item = &'a ContinuousSummary>,
    time_weighting: f64,
) -> Result<ContinuousStatistics> {
    let mut acc = MomentAccumulator::default();
    let mut seen = false;
    for summary in summaries {
        seen = true;
        acc.merge(&MomentAccumulator::from_summary(
            summary.quantity as u64,
            summary.mean,
            summary.variance,
        ));
    }
    if !seen {
        return Err(AggregationError::EmptyInput);
    }
    let moments = acc.moments().ok_or(AggregationError::ZeroQuantity)?;
    ContinuousStatistics::from_moments(moments, time_weighting)
}
