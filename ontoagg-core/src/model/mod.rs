//! State-change records and the per-pass ingestion structures
//!
//! A record is exactly one of four kinds: a raw discrete change, a raw
//! continuous observation, or a summary of either produced by an earlier,
//! finer-grained aggregation.

mod index;

pub use index::{
    GroupKey, ServiceGroup, ServiceRecords, SourceLedger, UnitConnectionTimes, UnitIndex,
};

use crate::{DateTimeOffset, Literal, ResourceId, Timestamp};

/// Raw categorical state change
#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteChange {
    pub timestamp: DateTimeOffset,
    pub value: ResourceId,
}

/// Raw observation of one or more literal components at the same instant
#[derive(Debug, Clone, PartialEq)]
pub struct ContinuousChange {
    pub timestamp: DateTimeOffset,
    pub values: Vec<Literal>,
}

impl ContinuousChange {
    /// Component literal carrying the given datatype
    pub fn component(&self, datatype: &str) -> Option<&Literal> {
        self.values.iter().find(|l| l.datatype == datatype)
    }
}

/// Summary of one discrete value over a closed sub-window
#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteSummary {
    pub window_start: Timestamp,
    pub time_weighting: f64,
    pub activity_time: i64,
    pub quantity: u32,
    pub value: ResourceId,
}

/// Summary of one continuous component over a closed sub-window
#[derive(Debug, Clone, PartialEq)]
pub struct ContinuousSummary {
    pub window_start: Timestamp,
    pub mean: f64,
    pub variance: f64,
    pub standard_deviation: f64,
    pub time_weighting: f64,
    pub quantity: u32,
    /// Mean as a literal typed with the component's unit datatype
    pub value: Literal,
}

/// One observed or pre-aggregated state transition
#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    Discrete(DiscreteChange),
    Continuous(ContinuousChange),
    AggregatedDiscrete(DiscreteSummary),
    AggregatedContinuous(ContinuousSummary),
}

impl StateChange {
    /// Instant of a raw change, `None` for summaries
    pub fn timestamp(&self) -> Option<&DateTimeOffset> {
        match self {
            StateChange::Discrete(c) => Some(&c.timestamp),
            StateChange::Continuous(c) => Some(&c.timestamp),
            StateChange::AggregatedDiscrete(_) | StateChange::AggregatedContinuous(_) => None,
        }
    }

    /// Sort key: instant for raw changes, sub-window start for summaries
    pub fn sort_key(&self) -> Timestamp {
        match self {
            StateChange::Discrete(c) => c.timestamp.timestamp_millis(),
            StateChange::Continuous(c) => c.timestamp.timestamp_millis(),
            StateChange::AggregatedDiscrete(s) => s.window_start,
            StateChange::AggregatedContinuous(s) => s.window_start,
        }
    }

    pub fn is_aggregated(&self) -> bool {
        match self {
            StateChange::Discrete(_) | StateChange::Continuous(_) => false,
            StateChange::AggregatedDiscrete(_) | StateChange::AggregatedContinuous(_) => true,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StateChange::Discrete(_) => "discrete",
            StateChange::Continuous(_) => "continuous",
            StateChange::AggregatedDiscrete(_) => "aggregated discrete",
            StateChange::AggregatedContinuous(_) => "aggregated continuous",
        }
    }
}

/// Records of one service split by kind
#[derive(Debug, Default)]
pub struct PartitionedRecords {
    pub discrete: Vec<DiscreteChange>,
    pub continuous: Vec<ContinuousChange>,
    pub aggregated_discrete: Vec<DiscreteSummary>,
    pub aggregated_continuous: Vec<ContinuousSummary>,
}

impl PartitionedRecords {
    pub fn has_raw(&self) -> bool {
        !self.discrete.is_empty() || !self.continuous.is_empty()
    }

    pub fn has_aggregated(&self) -> bool {
        !self.aggregated_discrete.is_empty() || !self.aggregated_continuous.is_empty()
    }
}

impl FromIterator<StateChange> for PartitionedRecords {
    fn from_iter<I: IntoIterator<Item = StateChange>>(iter: I) -> Self {
        let mut parts = PartitionedRecords::default();
        for record in iter {
            match record {
                StateChange::Discrete(c) => parts.discrete.push(c),
                StateChange::Continuous(c) => parts.continuous.push(c),
                StateChange::AggregatedDiscrete(s) => parts.aggregated_discrete.push(s),
                StateChange::AggregatedContinuous(s) => parts.aggregated_continuous.push(s),
            }
        }
        parts
    }
}
