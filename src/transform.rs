use statistics_dumper_queue::{
    QueueOrigin,
    RawSample,
};
use statistics_dumper_store::{
    DerivedPoint,
    Fields,
};
use std::sync::Arc;

/// Tag carrying the host that dumped the row.
pub const NODE_TAG: &str = "node";

/// Node tag value when the hostname cannot be resolved.
pub const UNKNOWN_NODE: &str = "N/A";

/// Series suffixes. These names are what readers of the store query for.
pub const MINUTE_AVERAGE: &str = "|m";
pub const MINUTE_TOTAL: &str = "|t";
pub const HOURLY_AVERAGE: &str = "|h";

/// Derives store rows from queue samples.
#[derive(Debug, Clone)]
pub struct PointTransformer {
    node: String,
    key_delimiter: Option<String>,
}

impl PointTransformer {
    pub fn new(node: impl Into<String>, key_delimiter: Option<String>) -> Self {
        Self {
            node: node.into(),
            key_delimiter: key_delimiter.filter(|delimiter| !delimiter.is_empty()),
        }
    }

    /// Tag rows with this machine's hostname.
    pub fn from_hostname(key_delimiter: Option<String>) -> Self {
        let node = match hostname::get().map(|name| name.into_string()) {
            Ok(Ok(name)) if !name.is_empty() => name,
            Ok(_) => {
                warn!("hostname is empty or not valid unicode, tagging rows with {UNKNOWN_NODE}");
                UNKNOWN_NODE.to_string()
            }
            Err(err) => {
                warn!(error = %err, "failed to resolve hostname, tagging rows with {UNKNOWN_NODE}");
                UNKNOWN_NODE.to_string()
            }
        };
        info!(%node, "resolved node tag");
        Self::new(node, key_delimiter)
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    /// The metric key up to the first delimiter, e.g. `cpu.percent@pid.42` -> `cpu.percent`.
    pub fn series_key<'a>(&self, key: &'a str) -> &'a str {
        match &self.key_delimiter {
            Some(delimiter) => key.split_once(delimiter.as_str()).map_or(key, |(head, _)| head),
            None => key,
        }
    }

    /// Two rows (`|m`, `|t`) for short-interval samples, one (`|h`) for long-interval ones.
    pub fn transform(&self, origin: QueueOrigin, sample: RawSample) -> Vec<DerivedPoint> {
        let key = self.series_key(&sample.key);
        let mut tags = sample.tags;
        tags.insert(NODE_TAG.to_string(), self.node.clone());
        let tags = Arc::new(tags);

        let point = |suffix: &str, value: f64| {
            DerivedPoint::new(
                format!("{key}{suffix}"),
                sample.start,
                Fields { value, max: sample.max },
                tags.clone(),
            )
        };

        match origin {
            QueueOrigin::Short => vec![point(MINUTE_AVERAGE, sample.avg), point(MINUTE_TOTAL, sample.total)],
            QueueOrigin::Long => vec![point(HOURLY_AVERAGE, sample.avg)],
        }
    }
}
