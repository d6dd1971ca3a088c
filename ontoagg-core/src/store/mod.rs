//! Triple store access
//!
//! The aggregation engine only needs two operations from the store: a
//! SPARQL SELECT returning JSON result bindings, and a SPARQL UPDATE.
//! Retry and backoff live in the transport implementation.

mod http;

pub use http::HttpStore;

use crate::{AggregationError, Literal, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;

/// SPARQL endpoint the aggregation reads from and writes to
pub trait TripleStore: Send + Sync {
    /// Run a SELECT query
    fn query(&self, sparql: &str) -> impl Future<Output = Result<SparqlResults>> + Send;

    /// Run an update (INSERT DATA, DELETE ... WHERE)
    fn update(&self, sparql: &str) -> impl Future<Output = Result<()>> + Send;
}

/// SPARQL query results (`application/sparql-results+json`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SparqlResults {
    pub head: SparqlHead,
    pub results: SparqlResultsData,
}

/// SPARQL results head
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SparqlHead {
    pub vars: Vec<String>,
}

/// SPARQL results data
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SparqlResultsData {
    pub bindings: Vec<SparqlBinding>,
}

impl SparqlResults {
    /// True when the query matched nothing
    pub fn is_empty(&self) -> bool {
        self.results.bindings.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = &SparqlBinding> {
        self.results.bindings.iter()
    }
}

/// A single result row (variable -> value)
pub type SparqlBinding = HashMap<String, SparqlValue>;

/// A bound RDF term
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparqlValue {
    #[serde(rename = "type")]
    pub value_type: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
    #[serde(rename = "xml:lang", skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

impl SparqlValue {
    pub fn iri(value: impl Into<String>) -> Self {
        Self {
            value_type: "uri".to_string(),
            value: value.into(),
            datatype: None,
            lang: None,
        }
    }

    pub fn literal(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self {
            value_type: "literal".to_string(),
            value: value.into(),
            datatype: Some(datatype.into()),
            lang: None,
        }
    }

    pub fn is_iri(&self) -> bool {
        self.value_type == "uri"
    }

    pub fn is_literal(&self) -> bool {
        self.value_type == "literal" || self.value_type == "typed-literal"
    }

    /// The bound literal; untyped literals are `xsd:string`
    pub fn to_literal(&self) -> Option<Literal> {
        if !self.is_literal() {
            return None;
        }
        let datatype = self
            .datatype
            .clone()
            .unwrap_or_else(|| format!("{}string", crate::ontology::XSD));
        Some(Literal::new(self.value.clone(), datatype))
    }
}

/// Required variable of a row
pub fn required<'a>(row: &'a SparqlBinding, var: &'static str, context: &str) -> Result<&'a SparqlValue> {
    row.get(var).ok_or_else(|| AggregationError::MissingField {
        field: var,
        context: context.to_string(),
    })
}
