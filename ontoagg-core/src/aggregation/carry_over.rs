//! Boundary carry-over of the value active when a window opens

use crate::model::{ContinuousChange, DiscreteChange, StateChange};
use crate::Timestamp;

/// Record positioned on the time axis
pub trait Timed {
    fn at(&self) -> Timestamp;
}

impl Timed for DiscreteChange {
    fn at(&self) -> Timestamp {
        self.timestamp.timestamp_millis()
    }
}

impl Timed for ContinuousChange {
    fn at(&self) -> Timestamp {
        self.timestamp.timestamp_millis()
    }
}

impl Timed for StateChange {
    fn at(&self) -> Timestamp {
        self.sort_key()
    }
}

/// Drop all records at or before `from` except the latest one.
///
/// `records` must be sorted ascending. The surviving pre-window record is
/// the state the unit was in when the window opened; it is kept even when
/// nothing changed inside the window.
pub fn filter_carry_over<T: Timed>(records: Vec<T>, from: Timestamp) -> Vec<T> {
    let mut kept = Vec::with_capacity(records.len());
    let mut held: Option<T> = None;

    for record in records {
        if record.at() <= from {
            held = Some(record);
            continue;
        }
        if let Some(candidate) = held.take() {
            kept.push(candidate);
        }
        kept.push(record);
    }

    if let Some(candidate) = held {
        kept.push(candidate);
    }
    kept
}
