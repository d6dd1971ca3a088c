//! SPARQL text of the reads, writes and cleanups issued by the aggregation

use crate::ontology::{iri_term, vocab, xsd_term, Ontology, Triple};
use crate::{format_timestamp, AggregationWindow, DateTimeOffset, Period};
use std::fmt::Write;

fn datetime(dt: &DateTimeOffset) -> String {
    xsd_term(&format_timestamp(dt), "dateTime")
}

/// Connection phases overlapping the window
pub fn connection_phases(ontology: &Ontology, window: &AggregationWindow) -> String {
    format!(
        "{prologue}SELECT ?unit ?firstTimestamp ?lastTimestamp WHERE {{
    ?unit NS:{has_phase} ?connectionPhase .
    ?connectionPhase a NS:{phase} .
    OPTIONAL {{ ?connectionPhase NS:{first} ?firstTimestamp . }}
    OPTIONAL {{ ?connectionPhase NS:{last} ?lastTimestamp . }}
    FILTER (!BOUND(?firstTimestamp) || ?firstTimestamp < {until})
    FILTER (!BOUND(?lastTimestamp) || ?lastTimestamp > {from})
}}",
        prologue = ontology.prologue(),
        has_phase = vocab::HAS_CONNECTION_PHASE,
        phase = vocab::CONNECTION_PHASE,
        first = vocab::HAS_FIRST_CONNECTION,
        last = vocab::HAS_LAST_CONNECTION,
        from = datetime(&window.from),
        until = datetime(&window.until),
    )
}

/// Raw observations before `until`, grouped by observation
pub fn observations_before(ontology: &Ontology, until: &DateTimeOffset) -> String {
    format!(
        "{prologue}SELECT ?observation ?unit ?stateValue ?providerService ?timestamp WHERE {{
    ?observation a NS:{observation} ;
        NS:{unit_id} ?unit ;
        NS:{state_value} ?stateValue ;
        NS:{provider_service} ?providerService ;
        NS:{time_stamp} ?timestamp .
    FILTER (?timestamp < {until})
}}
ORDER BY ?observation",
        prologue = ontology.prologue(),
        observation = vocab::OBSERVATION,
        unit_id = vocab::HAS_UNIT_ID,
        state_value = vocab::HAS_STATE_VALUE,
        provider_service = vocab::HAS_PROVIDER_SERVICE,
        time_stamp = vocab::HAS_TIME_STAMP,
        until = datetime(until),
    )
}

/// Aggregates of `period` lying inside the window
pub fn aggregated_observations(
    ontology: &Ontology,
    period: Period,
    window: &AggregationWindow,
) -> String {
    format!(
        "{prologue}SELECT ?aggregation ?unit ?timeWeighting ?providerService ?stateValue ?quantity ?firstTimestamp ?activityTime ?variance ?standardDeviation ?mean WHERE {{
    ?aggregation a NS:{aggregation} ;
        NS:{period_prop} NS:{period} ;
        NS:{unit_id} ?unit ;
        NS:{provider_service} ?providerService ;
        NS:{state_value} ?stateValue ;
        NS:{first} ?firstTimestamp ;
        NS:{last} ?lastTimestamp .
    OPTIONAL {{ ?aggregation NS:{time_weighting} ?timeWeighting . }}
    OPTIONAL {{ ?aggregation NS:{quantity_prop} ?quantity . }}
    OPTIONAL {{ ?aggregation NS:{activity_time} ?activityTime . }}
    OPTIONAL {{ ?aggregation NS:{variance} ?variance . }}
    OPTIONAL {{ ?aggregation NS:{standard_deviation} ?standardDeviation . }}
    OPTIONAL {{ ?aggregation NS:{mean} ?mean . }}
    FILTER (?firstTimestamp >= {from} && ?lastTimestamp <= {until})
}}",
        prologue = ontology.prologue(),
        aggregation = vocab::AGGREGATION_OBSERVATION,
        period_prop = vocab::HAS_PERIOD,
        period = period.ontology_name(),
        unit_id = vocab::HAS_UNIT_ID,
        provider_service = vocab::HAS_PROVIDER_SERVICE,
        state_value = vocab::HAS_STATE_VALUE,
        first = vocab::HAS_FIRST_TIME_STAMP,
        last = vocab::HAS_LAST_TIME_STAMP,
        time_weighting = vocab::HAS_TIME_WEIGHTING,
        quantity_prop = vocab::HAS_QUANTITY,
        activity_time = vocab::HAS_ACTIVITY_TIME,
        variance = vocab::HAS_VARIANCE,
        standard_deviation = vocab::HAS_STANDARD_DEVIATION,
        mean = vocab::HAS_MEAN,
        from = datetime(&window.from),
        until = datetime(&window.until),
    )
}

/// `INSERT DATA` of a batch of triples
pub fn insert_data(ontology: &Ontology, triples: &[Triple]) -> String {
    let mut update = ontology.prologue();
    update.push_str("INSERT DATA {\n");
    for triple in triples {
        let _ = writeln!(update, "    {}", triple);
    }
    update.push('}');
    update
}

/// `DELETE DATA` of a batch of triples
pub fn delete_data(ontology: &Ontology, triples: &[Triple]) -> String {
    let mut update = ontology.prologue();
    update.push_str("DELETE DATA {\n");
    for triple in triples {
        let _ = writeln!(update, "    {}", triple);
    }
    update.push('}');
    update
}

/// Any aggregate of the window's own period starting at the window start
pub fn window_aggregates(ontology: &Ontology, window: &AggregationWindow) -> String {
    format!(
        "{prologue}SELECT ?existing WHERE {{
    ?existing a NS:{aggregation} ;
        NS:{period_prop} NS:{period} ;
        NS:{first} ?firstTimestamp .
    FILTER (?firstTimestamp = {from})
}}
LIMIT 1",
        prologue = ontology.prologue(),
        aggregation = vocab::AGGREGATION_OBSERVATION,
        period_prop = vocab::HAS_PERIOD,
        period = window.period.ontology_name(),
        first = vocab::HAS_FIRST_TIME_STAMP,
        from = datetime(&window.from),
    )
}

/// Remove every triple of the given subjects
pub fn delete_subjects(ontology: &Ontology, subjects: &[String]) -> String {
    let mut update = ontology.prologue();
    update.push_str("DELETE { ?subject ?p ?o . } WHERE {\n    VALUES ?subject {\n");
    for subject in subjects {
        let _ = writeln!(update, "        {}", iri_term(subject));
    }
    update.push_str("    }\n    ?subject ?p ?o .\n}");
    update
}
