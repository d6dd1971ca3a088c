//! Data providing: the store reads, writes and cleanups of one aggregation pass
//!
//! Query rows are materialized into the record model here. A row that cannot
//! be read is dropped and its error collected; only transport failures abort
//! an operation. Every read remembers the subjects it consumed, so cleanup
//! removes exactly those and nothing written since.

pub mod queries;

use crate::model::{
    ContinuousChange, ContinuousSummary, DiscreteChange, DiscreteSummary, SourceLedger,
    StateChange, UnitConnectionTimes, UnitIndex,
};
use crate::ontology::{Ontology, Triple};
use crate::store::{required, SparqlBinding, SparqlValue, TripleStore};
use crate::{
    parse_finite, parse_timestamp, AggregationError, AggregationWindow, DateTimeOffset,
    ErrorCollection, Interval, Literal, Period, Result,
};
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Records read for a pass, the subjects they came from and the rejected rows
#[derive(Debug, Default)]
pub struct Selection {
    pub index: UnitIndex,
    pub sources: SourceLedger,
    pub errors: ErrorCollection,
}

/// Reads and writes issued against the triple store during a pass
pub struct DataProvider<'a, S: TripleStore> {
    store: &'a S,
    ontology: &'a Ontology,
    batch_size: usize,
}

impl<'a, S: TripleStore> DataProvider<'a, S> {
    pub fn new(store: &'a S, ontology: &'a Ontology, batch_size: usize) -> Self {
        Self {
            store,
            ontology,
            batch_size: batch_size.max(1),
        }
    }

    /// Connected time of every unit inside the window
    pub async fn select_connection_phases(
        &self,
        window: &AggregationWindow,
    ) -> Result<(UnitConnectionTimes, ErrorCollection)> {
        let results = self
            .store
            .query(&queries::connection_phases(self.ontology, window))
            .await?;

        let window_interval = window.interval();
        let mut phases: HashMap<String, Vec<Interval>> = HashMap::new();
        let mut errors = ErrorCollection::new();

        for row in results.rows() {
            let parsed = self.connection_phase_row(row);
            if let Some((unit, phase)) = errors.collect(parsed) {
                let clipped = phases.entry(unit).or_default();
                if let Some(overlap) = phase.overlap(&window_interval) {
                    clipped.push(overlap);
                }
            }
        }

        let mut times = UnitConnectionTimes::new();
        for (unit, mut intervals) in phases {
            times.add(&unit, Interval::union_duration(&mut intervals));
        }

        debug!(units = times.len(), rejected = errors.len(), "connection phases read");
        Ok((times, errors))
    }

    fn connection_phase_row(&self, row: &SparqlBinding) -> Result<(String, Interval)> {
        let unit = self.local(required(row, "unit", "connection phase")?);
        let context = format!("connection phase of unit {}", unit);
        let first = parse_timestamp(&required(row, "firstTimestamp", &context)?.value)?;
        let last = parse_timestamp(&required(row, "lastTimestamp", &context)?.value)?;
        let phase = Interval::between(&first, &last).ok_or_else(|| {
            AggregationError::InvalidTimestamp(format!(
                "{} ends before it starts ({} > {})",
                context, first, last
            ))
        })?;
        Ok((unit, phase))
    }

    /// Raw observations before the window end, merged per observation
    pub async fn select_observations(&self, window: &AggregationWindow) -> Result<Selection> {
        let results = self
            .store
            .query(&queries::observations_before(self.ontology, &window.until))
            .await?;

        let mut selection = Selection::default();
        let mut pending: Option<PendingObservation> = None;

        for row in results.rows() {
            let parsed = self.observation_row(row, window.period);
            let Some(parsed) = selection.errors.collect(parsed) else {
                continue;
            };
            match pending.as_mut() {
                Some(current) if current.id == parsed.id => current.add(parsed.value),
                _ => {
                    if let Some(done) = pending.take() {
                        done.flush_into(&mut selection);
                    }
                    pending = Some(PendingObservation::start(parsed));
                }
            }
        }
        if let Some(done) = pending {
            done.flush_into(&mut selection);
        }

        debug!(
            units = selection.index.len(),
            groups = selection.index.group_count(),
            sources = selection.sources.len(),
            rejected = selection.errors.len(),
            "observations read"
        );
        Ok(selection)
    }

    /// Rows failing after unit and service are known carry their group
    fn observation_row(&self, row: &SparqlBinding, period: Period) -> Result<ObservationRow> {
        let id = required(row, "observation", "observation")?.value.clone();
        let context = format!("observation {}", id);
        let unit = self.local(required(row, "unit", &context)?);
        let service = self.local(required(row, "providerService", &context)?);
        let fields = || -> Result<(DateTimeOffset, StateValue)> {
            let timestamp = parse_timestamp(&required(row, "timestamp", &context)?.value)?;
            let value = StateValue::from_binding(required(row, "stateValue", &context)?)?;
            Ok((timestamp, value))
        };
        let (timestamp, value) = fields().map_err(|e| e.in_group(&unit, &service, period))?;
        Ok(ObservationRow {
            id,
            unit,
            service,
            timestamp,
            value,
        })
    }

    /// Aggregates of `period` inside the window
    pub async fn select_aggregated_observations(
        &self,
        period: Period,
        window: &AggregationWindow,
    ) -> Result<Selection> {
        let results = self
            .store
            .query(&queries::aggregated_observations(self.ontology, period, window))
            .await?;

        let mut selection = Selection::default();
        for row in results.rows() {
            let parsed = self.aggregated_row(row, window.period);
            if let Some(aggregate) = selection.errors.collect(parsed) {
                let AggregatedRow {
                    subject,
                    unit,
                    service,
                    record,
                } = aggregate;
                selection.sources.record(&unit, &service, record.sort_key(), subject);
                selection.index.push(&unit, &service, record);
            }
        }

        debug!(
            %period,
            units = selection.index.len(),
            groups = selection.index.group_count(),
            sources = selection.sources.len(),
            rejected = selection.errors.len(),
            "aggregated observations read"
        );
        Ok(selection)
    }

    fn aggregated_row(&self, row: &SparqlBinding, period: Period) -> Result<AggregatedRow> {
        let subject = required(row, "aggregation", "aggregated observation")?.value.clone();
        let unit = self.local(required(row, "unit", "aggregated observation")?);
        let service = self.local(required(row, "providerService", "aggregated observation")?);
        let record = self
            .summary(row, &unit, &service)
            .map_err(|e| e.in_group(&unit, &service, period))?;
        Ok(AggregatedRow {
            subject,
            unit,
            service,
            record,
        })
    }

    fn summary(&self, row: &SparqlBinding, unit: &str, service: &str) -> Result<StateChange> {
        let context = format!("aggregated observation of unit {} service {}", unit, service);

        let state_value = required(row, "stateValue", &context)?;
        let quantity: u32 = number(required(row, "quantity", &context)?)?;
        let time_weighting = double(required(row, "timeWeighting", &context)?)?;
        let window_start = parse_timestamp(&required(row, "firstTimestamp", &context)?.value)?
            .timestamp_millis();

        let record = match StateValue::from_binding(state_value)? {
            StateValue::Resource(value) => StateChange::AggregatedDiscrete(DiscreteSummary {
                window_start,
                time_weighting,
                activity_time: number(required(row, "activityTime", &context)?)?,
                quantity,
                value,
            }),
            StateValue::Literal(value) => StateChange::AggregatedContinuous(ContinuousSummary {
                window_start,
                mean: double(required(row, "mean", &context)?)?,
                variance: double(required(row, "variance", &context)?)?,
                standard_deviation: double(required(row, "standardDeviation", &context)?)?,
                time_weighting,
                quantity,
                value,
            }),
        };
        Ok(record)
    }

    /// Insert triples in batches; returns the number of triples written.
    ///
    /// When a batch fails, the batches already written are removed again so a
    /// failed run leaves the store as it found it.
    pub async fn insert_triples(&self, triples: &[Triple]) -> Result<usize> {
        let mut written = 0;
        for chunk in triples.chunks(self.batch_size) {
            let update = queries::insert_data(self.ontology, chunk);
            if let Err(e) = self.store.update(&update).await {
                if written > 0 {
                    self.rollback(&triples[..written]).await;
                }
                return Err(e);
            }
            written += chunk.len();
        }
        if written > 0 {
            info!(triples = written, "aggregation triples inserted");
        }
        Ok(written)
    }

    async fn rollback(&self, triples: &[Triple]) {
        for chunk in triples.chunks(self.batch_size) {
            let update = queries::delete_data(self.ontology, chunk);
            if let Err(e) = self.store.update(&update).await {
                warn!(triples = chunk.len(), "rollback of inserted triples failed: {}", e);
            }
        }
    }

    /// True when aggregates of this exact window are already stored
    pub async fn window_aggregated(&self, window: &AggregationWindow) -> Result<bool> {
        let results = self
            .store
            .query(&queries::window_aggregates(self.ontology, window))
            .await?;
        Ok(!results.is_empty())
    }

    /// Remove superseded subjects in batches; returns how many were removed
    pub async fn delete_subjects(&self, subjects: &[String]) -> Result<usize> {
        for chunk in subjects.chunks(self.batch_size) {
            self.store
                .update(&queries::delete_subjects(self.ontology, chunk))
                .await?;
        }
        if !subjects.is_empty() {
            info!(subjects = subjects.len(), "superseded data removed");
        }
        Ok(subjects.len())
    }

    fn local(&self, value: &SparqlValue) -> String {
        self.ontology.local_name(&value.value).to_string()
    }
}

fn number<T>(value: &SparqlValue) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .value
        .trim()
        .parse::<T>()
        .map_err(|e| AggregationError::InvalidNumber {
            value: value.value.clone(),
            reason: e.to_string(),
        })
}

fn double(value: &SparqlValue) -> Result<f64> {
    parse_finite(&value.value)
}

/// State value of a row: an ontology resource or a typed literal
#[derive(Debug, Clone, PartialEq)]
enum StateValue {
    Resource(String),
    Literal(Literal),
}

impl StateValue {
    fn from_binding(value: &SparqlValue) -> Result<Self> {
        if value.is_iri() {
            return Ok(StateValue::Resource(value.value.clone()));
        }
        value
            .to_literal()
            .map(StateValue::Literal)
            .ok_or_else(|| AggregationError::UnexpectedValueKind {
                expected: "resource or literal",
                found: value.value_type.clone(),
            })
    }
}

struct AggregatedRow {
    subject: String,
    unit: String,
    service: String,
    record: StateChange,
}

struct ObservationRow {
    id: String,
    unit: String,
    service: String,
    timestamp: DateTimeOffset,
    value: StateValue,
}

/// Observation being assembled from consecutive rows with the same id
struct PendingObservation {
    id: String,
    unit: String,
    service: String,
    timestamp: DateTimeOffset,
    resources: Vec<String>,
    literals: Vec<Literal>,
}

impl PendingObservation {
    fn start(row: ObservationRow) -> Self {
        let mut pending = Self {
            id: row.id,
            unit: row.unit,
            service: row.service,
            timestamp: row.timestamp,
            resources: Vec::new(),
            literals: Vec::new(),
        };
        pending.add(row.value);
        pending
    }

    fn add(&mut self, value: StateValue) {
        match value {
            StateValue::Resource(r) => self.resources.push(r),
            StateValue::Literal(l) => self.literals.push(l),
        }
    }

    fn flush_into(self, selection: &mut Selection) {
        selection.sources.record(
            &self.unit,
            &self.service,
            self.timestamp.timestamp_millis(),
            self.id,
        );
        let index = &mut selection.index;
        for value in self.resources {
            index.push(
                &self.unit,
                &self.service,
                StateChange::Discrete(DiscreteChange {
                    timestamp: self.timestamp,
                    value,
                }),
            );
        }
        if !self.literals.is_empty() {
            index.push(
                &self.unit,
                &self.service,
                StateChange::Continuous(ContinuousChange {
                    timestamp: self.timestamp,
                    values: self.literals,
                }),
            );
        }
    }
}
