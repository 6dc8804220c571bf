use std::{
    collections::BTreeMap,
    sync::Arc,
};

/// Tag set of a row, sorted by key.
pub type Tags = BTreeMap<String, String>;

/// Field set written for every row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fields {
    pub value: f64,
    pub max: f64,
}

/// One row destined for the store.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedPoint {
    /// Metric key plus its derivation suffix, e.g. `cpu|m`.
    pub series: String,
    /// Seconds since the epoch.
    pub timestamp: i64,
    pub fields: Fields,
    /// Shared between all rows derived from the same sample.
    pub tags: Arc<Tags>,
}

impl DerivedPoint {
    pub fn new(series: impl Into<String>, timestamp: i64, fields: Fields, tags: Arc<Tags>) -> Self {
        Self {
            series: series.into(),
            timestamp,
            fields,
            tags,
        }
    }
}

/// Rows written together in one request, in append order.
pub type Batch = Vec<DerivedPoint>;
