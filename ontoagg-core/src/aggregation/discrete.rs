//! Statistics of categorical state values

use super::accumulator::{Accumulator, ActivityAccumulator};
use crate::model::{DiscreteChange, DiscreteSummary};
use crate::{AggregationError, AggregationWindow, ResourceId, Result};
use std::collections::BTreeMap;

/// Aggregate of one distinct value over a window
#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteStatistics {
    pub value: ResourceId,
    pub quantity: u32,
    pub activity_time: i64,
    pub time_weighting: f64,
}

/// Aggregate raw changes.
///
/// Each record's value is active from `max(timestamp, from)` until the next
/// record, the last one until the window end. `records` is expected to have
/// passed the carry-over filter.
pub fn aggregate_changes(
    records: &[DiscreteChange],
    window: &AggregationWindow,
    time_weighting: f64,
) -> Result<Vec<DiscreteStatistics>> {
    if records.is_empty() {
        return Err(AggregationError::EmptyInput);
    }

    let mut sorted: Vec<&DiscreteChange> = records.iter().collect();
    sorted.sort_by_key(|r| r.timestamp);

    let from = window.from_millis();
    let until = window.until_millis();
    let mut per_value: BTreeMap<&str, ActivityAccumulator> = BTreeMap::new();

    for (i, record) in sorted.iter().enumerate() {
        let start = record.timestamp.timestamp_millis().max(from);
        let end = sorted
            .get(i + 1)
            .map_or(until, |next| next.timestamp.timestamp_millis())
            .min(until);
        per_value
            .entry(record.value.as_str())
            .or_default()
            .add((end - start).max(0));
    }

    per_value
        .into_iter()
        .map(|(value, acc)| statistics(value, &acc, time_weighting))
        .collect()
}

/// Re-aggregate child summaries: quantities and activity times add up per value
pub fn aggregate_summaries(
    summaries: &[DiscreteSummary],
    time_weighting: f64,
) -> Result<Vec<DiscreteStatistics>> {
    if summaries.is_empty() {
        return Err(AggregationError::EmptyInput);
    }

    let mut per_value: BTreeMap<&str, ActivityAccumulator> = BTreeMap::new();
    for summary in summaries {
        per_value
            .entry(summary.value.as_str())
            .or_default()
            .merge(&ActivityAccumulator::from_summary(
                summary.quantity as u64,
                summary.activity_time,
            ));
    }

    per_value
        .into_iter()
        .map(|(value, acc)| statistics(value, &acc, time_weighting))
        .collect()
}

fn statistics(value: &str, acc: &ActivityAccumulator, time_weighting: f64) -> Result<DiscreteStatistics> {
    let quantity = u32::try_from(acc.count()).map_err(|_| AggregationError::InvalidNumber {
        value: acc.count().to_string(),
        reason: "quantity exceeds 32 bits".to_string(),
    })?;
    Ok(DiscreteStatistics {
        value: value.to_string(),
        quantity,
        activity_time: acc.activity_time(),
        time_weighting,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parse_timestamp, Period};

    const HOUR: i64 = 3_600_000;

    fn window() -> AggregationWindow {
        AggregationWindow::ending_at(
            Period::Day,
            parse_timestamp("2024-03-11T00:00:00+00:00").unwrap(),
        )
    }

    fn change(ts: &str, value: &str) -> DiscreteChange {
        DiscreteChange {
            timestamp: parse_timestamp(ts).unwrap(),
            value: value.to_string(),
        }
    }

    fn find<'a>(stats: &'a [DiscreteStatistics], value: &str) -> &'a DiscreteStatistics {
        stats.iter().find(|s| s.value == value).unwrap()
    }

    #[test]
    fn test_activity_covers_window_with_carried_value() {
        let records = vec![
            change("2024-03-09T22:00:00+00:00", "ON"),
            change("2024-03-10T06:00:00+00:00", "OFF"),
            change("2024-03-10T18:00:00+00:00", "ON"),
        ];
        let stats = aggregate_changes(&records, &window(), 1.0).unwrap();
        assert_eq!(stats.len(), 2);

        let on = find(&stats, "ON");
        assert_eq!(on.quantity, 2);
        assert_eq!(on.activity_time, 12 * HOUR);
        assert_eq!(find(&stats, "OFF").activity_time, 12 * HOUR);

        let total: i64 = stats.iter().map(|s| s.activity_time).sum();
        assert_eq!(total, window().duration_millis());
    }

    #[test]
    fn test_activity_without_carried_value_starts_at_first_change() {
        let records = vec![change("2024-03-10T12:00:00+00:00", "OPEN")];
        let stats = aggregate_changes(&records, &window(), 0.5).unwrap();
        assert_eq!(stats[0].activity_time, 12 * HOUR);
        assert_eq!(stats[0].time_weighting, 0.5);
    }

    #[test]
    fn test_summaries_add_up_per_value() {
        let summary = |value: &str, quantity: u32, activity_time: i64| DiscreteSummary {
            window_start: 0,
            time_weighting: 1.0,
            activity_time,
            quantity,
            value: value.to_string(),
        };
        let stats = aggregate_summaries(
            &[summary("ON", 2, 5 * HOUR), summary("OFF", 1, 19 * HOUR), summary("ON", 4, 8 * HOUR)],
            1.0,
        )
        .unwrap();
        let on = find(&stats, "ON");
        assert_eq!(on.quantity, 6);
        assert_eq!(on.activity_time, 13 * HOUR);
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(
            aggregate_changes(&[], &window(), 1.0),
            Err(AggregationError::EmptyInput)
        ));
    }
}
