//! Values exchanged with replica set members

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::topology::{Endpoint, Role};

/// A stored document
pub type Document = Map<String, Value>;

/// `database.collection` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// A read request: top-level field equality plus an optional limit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default)]
    pub filter: Document,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl Query {
    /// Match every document.
    pub fn all() -> Self {
        Self::default()
    }

    /// Add an equality condition.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter.insert(field.into(), value.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Reject filters that cannot be evaluated.
    ///
    /// Operators (`$`-prefixed keys) are not supported.
    pub fn validate(&self) -> Result<(), String> {
        for key in self.filter.keys() {
            if key.is_empty() {
                return Err("filter contains an empty field name".to_string());
            }
            if key.starts_with('$') {
                return Err(format!("unsupported query operator '{}'", key));
            }
        }
        if self.limit == Some(0) {
            return Err("limit must be positive".to_string());
        }
        Ok(())
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.filter
            .iter()
            .all(|(field, expected)| document.get(field) == Some(expected))
    }
}

/// Reply to a monitoring probe
#[derive(Debug, Clone, PartialEq)]
pub struct HelloReply {
    /// Role the member reports for itself
    pub role: Role,
    /// Value of the member's `region` tag
    pub region: Option<String>,
    /// How far the member trails the primary
    pub lag: Option<Duration>,
    /// Every member this one knows about, itself included
    pub hosts: Vec<Endpoint>,
}
