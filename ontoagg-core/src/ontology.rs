//! Ontology vocabulary and SPARQL term rendering

use crate::Literal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default ontology namespace
pub const DEFAULT_NAMESPACE: &str = "http://www.openbase.org/bco/ontology#";

/// XML Schema datatypes namespace
pub const XSD: &str = "http://www.w3.org/2001/XMLSchema#";

/// `rdf:type`
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

/// Local names of the classes and properties used by the aggregation
pub mod vocab {
    pub const OBSERVATION: &str = "Observation";
    pub const AGGREGATION_OBSERVATION: &str = "AggregationObservation";
    pub const CONNECTION_PHASE: &str = "ConnectionPhase";

    pub const HAS_CONNECTION_PHASE: &str = "hasConnectionPhase";
    pub const HAS_FIRST_CONNECTION: &str = "hasFirstConnection";
    pub const HAS_LAST_CONNECTION: &str = "hasLastConnection";

    pub const HAS_UNIT_ID: &str = "hasUnitId";
    pub const HAS_PROVIDER_SERVICE: &str = "hasProviderService";
    pub const HAS_STATE_VALUE: &str = "hasStateValue";
    pub const HAS_TIME_STAMP: &str = "hasTimeStamp";

    pub const HAS_PERIOD: &str = "hasPeriod";
    pub const HAS_FIRST_TIME_STAMP: &str = "hasFirstTimeStamp";
    pub const HAS_LAST_TIME_STAMP: &str = "hasLastTimeStamp";
    pub const HAS_QUANTITY: &str = "hasQuantity";
    pub const HAS_ACTIVITY_TIME: &str = "hasActivityTime";
    pub const HAS_MEAN: &str = "hasMean";
    pub const HAS_VARIANCE: &str = "hasVariance";
    pub const HAS_STANDARD_DEVIATION: &str = "hasStandardDeviation";
    pub const HAS_TIME_WEIGHTING: &str = "hasTimeWeighting";
}

/// Handle on the ontology namespace used by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ontology {
    namespace: String,
}

impl Default for Ontology {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl Ontology {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Full IRI of a local name
    pub fn iri(&self, local: &str) -> String {
        format!("{}{}", self.namespace, local)
    }

    /// `<iri>` term of a local name
    pub fn term(&self, local: &str) -> String {
        iri_term(&self.iri(local))
    }

    /// Strip the namespace (or anything up to the last `#` or `/`) from an IRI
    pub fn local_name<'a>(&self, iri: &'a str) -> &'a str {
        if let Some(local) = iri.strip_prefix(self.namespace.as_str()) {
            return local;
        }
        match iri.rfind(|c: char| c == '#' || c == '/') {
            Some(idx) => &iri[idx + 1..],
            None => iri,
        }
    }

    /// Standard prefix header for queries and updates
    pub fn prologue(&self) -> String {
        format!("PREFIX NS: <{}>\nPREFIX xsd: <{}>\n", self.namespace, XSD)
    }
}

/// `<iri>`
pub fn iri_term(iri: &str) -> String {
    format!("<{}>", iri)
}

/// `"lexical"^^<datatype>` with the lexical form escaped
pub fn literal_term(lexical: &str, datatype: &str) -> String {
    let mut escaped = String::with_capacity(lexical.len());
    for c in lexical.chars() {
        match c {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            other => escaped.push(other),
        }
    }
    format!("\"{}\"^^<{}>", escaped, datatype)
}

/// Typed XSD literal term
pub fn xsd_term(lexical: &str, xsd_type: &str) -> String {
    literal_term(lexical, &format!("{}{}", XSD, xsd_type))
}

/// Lexical form of an `xsd:double`
pub fn double_lexical(value: f64) -> String {
    format!("{:?}", value)
}

/// Term of a typed literal
pub fn typed_term(literal: &Literal) -> String {
    literal_term(&literal.lexical, &literal.datatype)
}

/// One RDF statement with terms already in SPARQL syntax
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

impl Triple {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
    }
}
