//! Unit -> service -> records index and connection-time accumulator

use super::StateChange;
use crate::Timestamp;
use std::collections::{BTreeMap, HashMap};

/// Identity of one (unit, service) group
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    pub unit: String,
    pub service: String,
}

impl GroupKey {
    pub fn new(unit: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            service: service.into(),
        }
    }
}

/// Records of one unit, keyed by provider service identifier
#[derive(Debug, Clone, Default)]
pub struct ServiceRecords {
    services: BTreeMap<String, Vec<StateChange>>,
}

impl ServiceRecords {
    pub fn push(&mut self, service: &str, record: StateChange) {
        match self.services.get_mut(service) {
            Some(records) => records.push(record),
            None => {
                self.services.insert(service.to_string(), vec![record]);
            }
        }
    }

    #[cfg(test)]
    pub fn get(&self, service: &str) -> Option<&[StateChange]> {
        self.services.get(service).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<StateChange>)> {
        self.services.iter()
    }
}

/// Index of one aggregation pass
#[derive(Debug, Clone, Default)]
pub struct UnitIndex {
    units: BTreeMap<String, ServiceRecords>,
}

/// One (unit, service) pair with its records sorted ascending
#[derive(Debug, Clone)]
pub struct ServiceGroup {
    pub unit: String,
    pub service: String,
    pub records: Vec<StateChange>,
}

impl ServiceGroup {
    pub fn key(&self) -> GroupKey {
        GroupKey::new(&self.unit, &self.service)
    }
}

impl UnitIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record, keeping insertion order within its service
    pub fn push(&mut self, unit: &str, service: &str, record: StateChange) {
        self.units
            .entry(unit.to_string())
            .or_default()
            .push(service, record);
    }

    pub fn unit(&self, unit: &str) -> Option<&ServiceRecords> {
        self.units.get(unit)
    }

    /// Number of units
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Total number of (unit, service) pairs
    pub fn group_count(&self) -> usize {
        self.units.values().map(ServiceRecords::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ServiceRecords)> {
        self.units.iter()
    }

    /// Consume the index into independent groups, each sorted by timestamp
    pub fn into_groups(self) -> Vec<ServiceGroup> {
        let mut groups = Vec::new();
        for (unit, services) in self.units {
            for (service, mut records) in services.services {
                records.sort_by_key(StateChange::sort_key);
                groups.push(ServiceGroup {
                    unit: unit.clone(),
                    service,
                    records,
                });
            }
        }
        groups
    }
}

/// Store subjects read by a pass, per group
#[derive(Debug, Clone, Default)]
pub struct SourceLedger {
    groups: HashMap<GroupKey, Vec<(Timestamp, String)>>,
}

impl SourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember that `subject` fed the group
    pub fn record(&mut self, unit: &str, service: &str, timestamp: Timestamp, subject: impl Into<String>) {
        self.groups
            .entry(GroupKey::new(unit, service))
            .or_default()
            .push((timestamp, subject.into()));
    }

    /// Number of recorded subjects
    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Subjects of the settled groups that a finished pass made obsolete.
    ///
    /// With `keep_latest`, the subjects at each group's latest timestamp stay:
    /// they hold the value carried into the next window.
    pub fn superseded<'a>(
        &self,
        settled: impl IntoIterator<Item = &'a GroupKey>,
        keep_latest: bool,
    ) -> Vec<String> {
        let mut out = Vec::new();
        for key in settled {
            let Some(subjects) = self.groups.get(key) else {
                continue;
            };
            let latest = subjects.iter().map(|(ts, _)| *ts).max();
            out.extend(
                subjects
                    .iter()
                    .filter(|(ts, _)| !keep_latest || Some(*ts) != latest)
                    .map(|(_, subject)| subject.clone()),
            );
        }
        out.sort();
        out.dedup();
        out
    }
}

/// Cumulative connected milliseconds per unit inside the window
#[derive(Debug, Clone, Default)]
pub struct UnitConnectionTimes {
    times: HashMap<String, i64>,
}

impl UnitConnectionTimes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a contribution for a unit
    pub fn add(&mut self, unit: &str, millis: i64) {
        *self.times.entry(unit.to_string()).or_insert(0) += millis;
    }

    /// Connected time of a unit; units without any phase were never connected
    pub fn get(&self, unit: &str) -> i64 {
        self.times.get(unit).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &i64)> {
        self.times.iter()
    }

    /// Rebuild connection times from child summaries.
    ///
    /// Each distinct child window contributes `time_weighting * child_millis`
    /// once, however many services or values reported for it.
    pub fn from_summaries(index: &UnitIndex, child_millis: i64) -> Self {
        let mut result = Self::new();
        for (unit, services) in index.iter() {
            let mut windows: BTreeMap<i64, f64> = BTreeMap::new();
            for (_, records) in services.iter() {
                for record in records {
                    let (start, weighting) = match record {
                        StateChange::AggregatedDiscrete(s) => (s.window_start, s.time_weighting),
                        StateChange::AggregatedContinuous(s) => (s.window_start, s.time_weighting),
                        StateChange::Discrete(_) | StateChange::Continuous(_) => continue,
                    };
                    let slot = windows.entry(start).or_insert(0.0);
                    *slot = slot.max(weighting);
                }
            }
            let connected: f64 = windows.values().map(|w| w * child_millis as f64).sum();
            result.add(unit, connected.round() as i64);
        }
        result
    }
}
