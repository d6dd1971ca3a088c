//! Aggregation runs and the daily schedule driving them

use crate::aggregation::{identify_service_type, AggregationContext, ObservationIdGenerator};
use crate::config::OntoAggConfig;
use crate::model::{GroupKey, ServiceGroup, UnitConnectionTimes, UnitIndex};
use crate::ontology::{Ontology, Triple};
use crate::provider::{DataProvider, Selection};
use crate::store::TripleStore;
use crate::{
    format_timestamp, AggregationError, AggregationWindow, DateTimeOffset, ErrorCollection,
    Period, Result,
};
use chrono::{DateTime, FixedOffset, NaiveTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

/// Day counter deciding which periods are due on a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodSchedule {
    day_counter: u64,
}

impl PeriodSchedule {
    pub fn new(day_counter: u64) -> Self {
        Self { day_counter }
    }

    pub fn day_counter(&self) -> u64 {
        self.day_counter
    }

    /// Whether `period` runs on schedule day `day`
    pub fn is_due(day: u64, period: Period) -> bool {
        day > 0 && day % period.days() as u64 == 0
    }

    /// Advance one day and return the periods due, finest first
    pub fn tick(&mut self) -> Vec<Period> {
        self.day_counter += 1;
        Period::ALL
            .into_iter()
            .filter(|p| Self::is_due(self.day_counter, *p))
            .collect()
    }
}

/// Outcome of one aggregation run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub period: Period,
    pub from: String,
    pub until: String,
    pub units: usize,
    pub groups: usize,
    pub triples_written: usize,
    pub errors: usize,
    /// Stored observations or child aggregates removed after the run
    pub superseded: usize,
    /// The window was aggregated by an earlier run and left untouched
    pub already_aggregated: bool,
}

impl RunReport {
    fn new(run_id: Uuid, window: &AggregationWindow) -> Self {
        Self {
            run_id,
            period: window.period,
            from: format_timestamp(&window.from),
            until: format_timestamp(&window.until),
            units: 0,
            groups: 0,
            triples_written: 0,
            errors: 0,
            superseded: 0,
            already_aggregated: false,
        }
    }
}

/// Groups computed on the blocking pool
struct ComputedRun {
    triples: Vec<Triple>,
    errors: ErrorCollection,
    /// Groups that finished without error, whether or not they produced output
    settled: Vec<GroupKey>,
    skipped: usize,
}

/// Runs aggregations against a triple store
pub struct Aggregator<S: TripleStore> {
    store: S,
    ontology: Ontology,
    batch_size: usize,
    offset: FixedOffset,
    schedule: PeriodSchedule,
    last_boundary: Option<DateTimeOffset>,
}

impl<S: TripleStore> Aggregator<S> {
    /// Create an aggregator from configuration
    pub fn new(store: S, config: &OntoAggConfig) -> Result<Self> {
        Ok(Self {
            store,
            ontology: Ontology::new(config.ontology.namespace.clone()),
            batch_size: config.store.insert_batch_size,
            offset: config.schedule.offset()?,
            schedule: PeriodSchedule::new(config.schedule.initial_day_counter),
            last_boundary: None,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn ontology(&self) -> &Ontology {
        &self.ontology
    }

    pub fn schedule(&self) -> PeriodSchedule {
        self.schedule
    }

    /// Local midnight of the day `now` falls on
    pub fn boundary(&self, now: DateTime<Utc>) -> Result<DateTimeOffset> {
        now.with_timezone(&self.offset)
            .date_naive()
            .and_time(NaiveTime::MIN)
            .and_local_timezone(self.offset)
            .single()
            .ok_or_else(|| AggregationError::Config(format!("no local midnight for {}", now)))
    }

    /// Schedule day of the tick closing the window at `boundary`
    pub fn schedule_day(&self, boundary: DateTimeOffset) -> u64 {
        let counter = self.schedule.day_counter();
        match self.last_boundary {
            Some(last) => {
                let days = (boundary - last).num_days();
                if days >= 0 {
                    counter.saturating_add(days.unsigned_abs())
                } else {
                    counter.saturating_sub(days.unsigned_abs())
                }
            }
            None => counter + 1,
        }
    }

    /// Advance the schedule by one day and run every due period.
    ///
    /// Stops at the first failed run; coarser periods depend on it.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Vec<Result<RunReport>> {
        let due = self.schedule.tick();
        info!(day = self.schedule.day_counter(), ?due, "aggregation tick");

        let boundary = match self.boundary(now) {
            Ok(boundary) => boundary,
            Err(e) => return vec![Err(e)],
        };
        self.last_boundary = Some(boundary);
        let mut reports = Vec::with_capacity(due.len());
        for period in due {
            let result = self.run(period, boundary).await;
            let failed = result.is_err();
            reports.push(result);
            if failed {
                break;
            }
        }
        reports
    }

    /// Run `period` for the latest window that closed before `now`.
    ///
    /// Only periods the schedule runs for that window are accepted, so a manual
    /// run never aggregates a partial window.
    pub async fn run_latest(&self, period: Period, now: DateTime<Utc>) -> Result<RunReport> {
        let boundary = self.boundary(now)?;
        let day = self.schedule_day(boundary);
        if !PeriodSchedule::is_due(day, period) {
            return Err(AggregationError::NotScheduled {
                period: period.to_string(),
                day,
            });
        }
        self.run(period, boundary).await
    }

    /// Aggregate the window of `period` closing at `boundary`
    pub async fn run(&self, period: Period, boundary: DateTimeOffset) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let window = AggregationWindow::ending_at(period, boundary);
        let span = info_span!("aggregation", %run_id, %period);
        self.run_window(run_id, window).instrument(span).await
    }

    async fn run_window(&self, run_id: Uuid, window: AggregationWindow) -> Result<RunReport> {
        let provider = DataProvider::new(&self.store, &self.ontology, self.batch_size);
        let mut report = RunReport::new(run_id, &window);

        if provider.window_aggregated(&window).await? {
            info!(window = %window, "window already aggregated, run skipped");
            report.already_aggregated = true;
            return Ok(report);
        }

        info!(window = %window, "aggregation started");
        let mut errors = ErrorCollection::new();
        let (selection, times) = match window.period.child() {
            None => {
                let (times, phase_errors) = provider.select_connection_phases(&window).await?;
                errors.absorb(phase_errors);
                (provider.select_observations(&window).await?, times)
            }
            Some(child) => {
                let selection = provider
                    .select_aggregated_observations(child, &window)
                    .await?;
                let times =
                    UnitConnectionTimes::from_summaries(&selection.index, child.duration_millis());
                (selection, times)
            }
        };
        let Selection {
            index,
            sources,
            errors: row_errors,
        } = selection;
        errors.absorb(row_errors);

        report.units = index.len();
        report.groups = index.group_count();
        let computed = self.compute(run_id, window.clone(), index, times).await?;
        errors.absorb(computed.errors);

        report.triples_written = provider.insert_triples(&computed.triples).await?;

        // Data of a group with any error stays for inspection and a later run
        let failed: HashSet<(&str, &str)> =
            errors.iter().filter_map(AggregationError::group).collect();
        let settled = computed
            .settled
            .iter()
            .filter(|key| !failed.contains(&(key.unit.as_str(), key.service.as_str())));
        let superseded = sources.superseded(settled, window.period.child().is_none());
        report.superseded = provider.delete_subjects(&superseded).await?;

        errors.report(&format!("{} run {}", window.period, run_id));
        report.errors = errors.len();
        info!(
            units = report.units,
            groups = report.groups,
            skipped = computed.skipped,
            triples = report.triples_written,
            errors = report.errors,
            superseded = report.superseded,
            "aggregation finished"
        );
        Ok(report)
    }

    /// Statistics of every (unit, service) group, in parallel off the runtime
    async fn compute(
        &self,
        run_id: Uuid,
        window: AggregationWindow,
        index: UnitIndex,
        times: UnitConnectionTimes,
    ) -> Result<ComputedRun> {
        let ontology = self.ontology.clone();
        let ids = ObservationIdGenerator::for_run(run_id);
        let groups = index.into_groups();

        tokio::task::spawn_blocking(move || compute_groups(&ontology, &window, &ids, &times, groups))
            .await
            .map_err(|e| AggregationError::Task(e.to_string()))
    }
}

fn compute_groups(
    ontology: &Ontology,
    window: &AggregationWindow,
    ids: &ObservationIdGenerator,
    times: &UnitConnectionTimes,
    groups: Vec<ServiceGroup>,
) -> ComputedRun {
    let ctx = AggregationContext::new(ontology, window, ids);
    let outputs: Vec<(GroupKey, Result<Vec<Triple>>)> = groups
        .into_par_iter()
        .map(|group| {
            let key = group.key();
            let connected = times.get(&group.unit);
            let output =
                identify_service_type(&ctx, &group.service, group.records, connected, &group.unit)
                    .map_err(|e| e.in_group(&group.unit, &group.service, window.period));
            (key, output)
        })
        .collect();

    let mut run = ComputedRun {
        triples: Vec::new(),
        errors: ErrorCollection::new(),
        settled: Vec::new(),
        skipped: 0,
    };
    for (key, output) in outputs {
        match output {
            Ok(triples) => {
                run.triples.extend(triples);
                run.settled.push(key);
            }
            Err(e) if matches!(e.root(), AggregationError::EmptyInput) => {
                debug!("group skipped: {}", e);
                run.skipped += 1;
                run.settled.push(key);
            }
            Err(e) => run.errors.push(e),
        }
    }
    run
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SparqlResults;
    use parking_lot::Mutex;

    #[test]
    fn test_schedule_cadence() {
        let mut schedule = PeriodSchedule::new(0);
        let mut runs = std::collections::HashMap::new();
        for _ in 0..364 {
            for period in schedule.tick() {
                *runs.entry(period).or_insert(0) += 1;
            }
        }
        assert_eq!(runs[&Period::Day], 364);
        assert_eq!(runs[&Period::Week], 52);
        assert_eq!(runs[&Period::Month], 13);
        assert_eq!(runs[&Period::Year], 1);
    }

    #[test]
    fn test_finer_periods_run_first() {
        let mut schedule = PeriodSchedule::new(363);
        assert_eq!(
            schedule.tick(),
            vec![Period::Day, Period::Week, Period::Month, Period::Year]
        );
        assert_eq!(schedule.tick(), vec![Period::Day]);
    }

    /// Store returning nothing and recording updates
    #[derive(Default)]
    struct EmptyStore {
        updates: Mutex<Vec<String>>,
        unreachable: bool,
        aggregated: bool,
    }

    impl TripleStore for EmptyStore {
        async fn query(&self, sparql: &str) -> Result<SparqlResults> {
            if self.unreachable {
                return Err(AggregationError::Transport("connection refused".into()));
            }
            let mut results = SparqlResults::default();
            if self.aggregated && sparql.contains("SELECT ?existing") {
                let value = crate::store::SparqlValue::iri("http://x#aggregation_1");
                let row = [("existing".to_string(), value)].into_iter().collect();
                results.results.bindings = vec![row];
            }
            Ok(results)
        }

        async fn update(&self, sparql: &str) -> Result<()> {
            self.updates.lock().push(sparql.to_string());
            Ok(())
        }
    }

    fn config(offset_minutes: i32) -> OntoAggConfig {
        let mut config = OntoAggConfig::default();
        config.schedule.utc_offset_minutes = offset_minutes;
        config
    }

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn test_boundary_is_local_midnight() {
        let aggregator = Aggregator::new(EmptyStore::default(), &config(60)).unwrap();
        let boundary = aggregator.boundary(utc("2024-03-10T23:30:00Z")).unwrap();
        assert_eq!(format_timestamp(&boundary), "2024-03-11T00:00:00.000+01:00");
    }

    #[tokio::test]
    async fn test_empty_week_run_removes_nothing() {
        let mut config = config(0);
        config.schedule.initial_day_counter = 6;
        let aggregator = Aggregator::new(EmptyStore::default(), &config).unwrap();
        let report = aggregator
            .run_latest(Period::Week, utc("2024-03-11T01:00:00Z"))
            .await
            .unwrap();

        assert_eq!(report.triples_written, 0);
        assert_eq!(report.errors, 0);
        assert_eq!(report.superseded, 0);
        assert!(!report.already_aggregated);
        assert_eq!(report.from, "2024-03-04T00:00:00.000+00:00");
        assert!(aggregator.store().updates.lock().is_empty());
    }

    #[tokio::test]
    async fn test_manual_run_outside_cadence_rejected() {
        let aggregator = Aggregator::new(EmptyStore::default(), &config(0)).unwrap();
        let now = utc("2024-03-11T12:00:00Z");
        let err = aggregator.run_latest(Period::Week, now).await.unwrap_err();
        assert!(matches!(err, AggregationError::NotScheduled { day: 1, .. }));
        assert!(aggregator.run_latest(Period::Day, now).await.is_ok());
    }

    #[tokio::test]
    async fn test_schedule_day_follows_ticks() {
        let mut aggregator = Aggregator::new(EmptyStore::default(), &config(0)).unwrap();
        let now = utc("2024-03-11T01:00:00Z");
        aggregator.tick(now).await;
        let boundary = aggregator.boundary(now).unwrap();
        assert_eq!(aggregator.schedule_day(boundary), 1);

        let later = utc("2024-03-17T09:00:00Z");
        assert_eq!(aggregator.schedule_day(aggregator.boundary(later).unwrap()), 7);
        let report = aggregator.run_latest(Period::Week, later).await.unwrap();
        assert_eq!(report.from, "2024-03-10T00:00:00.000+00:00");
    }

    #[tokio::test]
    async fn test_aggregated_window_is_skipped() {
        let store = EmptyStore {
            aggregated: true,
            ..Default::default()
        };
        let mut aggregator = Aggregator::new(store, &config(0)).unwrap();
        let results = aggregator.tick(utc("2024-03-11T01:00:00Z")).await;

        assert_eq!(results.len(), 1);
        let report = results[0].as_ref().unwrap();
        assert!(report.already_aggregated);
        assert_eq!(report.triples_written, 0);
        assert!(aggregator.store().updates.lock().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_aborts_without_cleanup() {
        let store = EmptyStore {
            unreachable: true,
            ..Default::default()
        };
        let mut aggregator = Aggregator::new(store, &config(0)).unwrap();
        let results = aggregator.tick(utc("2024-03-11T01:00:00Z")).await;

        assert_eq!(results.len(), 1);
        assert!(results[0].as_ref().unwrap_err().is_retryable());
        assert!(aggregator.store().updates.lock().is_empty());
    }
}
