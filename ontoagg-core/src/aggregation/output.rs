//! AggregationObservation triples

use super::continuous::ContinuousStatistics;
use super::discrete::DiscreteStatistics;
use crate::ontology::{double_lexical, iri_term, literal_term, vocab, xsd_term, Ontology, Triple};
use crate::{format_timestamp, AggregationWindow};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Source of aggregation instance names for one run.
///
/// Names carry the run id, so a window aggregated again in a later run or
/// after a restart never reuses an existing instance.
#[derive(Debug)]
pub struct ObservationIdGenerator {
    run: String,
    next: AtomicU64,
}

impl ObservationIdGenerator {
    pub fn new() -> Self {
        Self::for_run(Uuid::new_v4())
    }

    pub fn for_run(run_id: Uuid) -> Self {
        Self {
            run: run_id.simple().to_string(),
            next: AtomicU64::new(0),
        }
    }

    /// `aggregation_<unit>_<untilMillis>_<run>_<sequence>`
    pub fn next_local_name(&self, unit: &str, until_millis: i64) -> String {
        let sequence = self.next.fetch_add(1, Ordering::Relaxed);
        format!("aggregation_{}_{}_{}_{}", unit, until_millis, self.run, sequence)
    }
}

impl Default for ObservationIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the triple builder needs besides the statistics
pub struct AggregationContext<'a> {
    pub ontology: &'a Ontology,
    pub window: &'a AggregationWindow,
    pub ids: &'a ObservationIdGenerator,
}

impl<'a> AggregationContext<'a> {
    pub fn new(
        ontology: &'a Ontology,
        window: &'a AggregationWindow,
        ids: &'a ObservationIdGenerator,
    ) -> Self {
        Self {
            ontology,
            window,
            ids,
        }
    }

    /// Triples of one discrete value aggregate
    pub fn discrete_triples(&self, unit: &str, service: &str, stats: &DiscreteStatistics) -> Vec<Triple> {
        let mut out = self.header(unit, service, iri_term(&stats.value), stats.quantity);
        let subject = out[0].subject.clone();
        let ns = self.ontology;
        out.push(Triple::new(
            subject.clone(),
            ns.term(vocab::HAS_ACTIVITY_TIME),
            xsd_term(&stats.activity_time.to_string(), "long"),
        ));
        out.push(Triple::new(
            subject,
            ns.term(vocab::HAS_TIME_WEIGHTING),
            xsd_term(&double_lexical(stats.time_weighting), "double"),
        ));
        out
    }

    /// Triples of one continuous component aggregate; the state value is the
    /// mean typed with the component datatype
    pub fn continuous_triples(
        &self,
        unit: &str,
        service: &str,
        datatype: &str,
        stats: &ContinuousStatistics,
    ) -> Vec<Triple> {
        let state_value = literal_term(&double_lexical(stats.mean), datatype);
        let mut out = self.header(unit, service, state_value, stats.quantity);
        let subject = out[0].subject.clone();
        let ns = self.ontology;
        for (predicate, value) in [
            (vocab::HAS_MEAN, stats.mean),
            (vocab::HAS_VARIANCE, stats.variance),
            (vocab::HAS_STANDARD_DEVIATION, stats.standard_deviation),
            (vocab::HAS_TIME_WEIGHTING, stats.time_weighting),
        ] {
            out.push(Triple::new(
                subject.clone(),
                ns.term(predicate),
                xsd_term(&double_lexical(value), "double"),
            ));
        }
        out
    }

    fn header(&self, unit: &str, service: &str, state_value: String, quantity: u32) -> Vec<Triple> {
        let ns = self.ontology;
        let subject = ns.term(&self.ids.next_local_name(unit, self.window.until_millis()));
        let mut out = Vec::with_capacity(14);
        let mut push = |predicate: String, object: String| {
            out.push(Triple::new(subject.clone(), predicate, object));
        };
        push("a".to_string(), ns.term(vocab::AGGREGATION_OBSERVATION));
        push(ns.term(vocab::HAS_UNIT_ID), ns.term(unit));
        push(ns.term(vocab::HAS_PROVIDER_SERVICE), ns.term(service));
        push(ns.term(vocab::HAS_PERIOD), ns.term(self.window.period.ontology_name()));
        push(ns.term(vocab::HAS_STATE_VALUE), state_value);
        push(
            ns.term(vocab::HAS_FIRST_TIME_STAMP),
            xsd_term(&format_timestamp(&self.window.from), "dateTime"),
        );
        push(
            ns.term(vocab::HAS_LAST_TIME_STAMP),
            xsd_term(&format_timestamp(&self.window.until), "dateTime"),
        );
        push(ns.term(vocab::HAS_QUANTITY), xsd_term(&quantity.to_string(), "int"));
        out
    }
}
