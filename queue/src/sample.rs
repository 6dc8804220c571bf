use serde::Deserialize;
use std::collections::BTreeMap;

/// Canonical tag set of a sample. Sorted so that derived rows are stable.
pub type Tags = BTreeMap<String, String>;

/// Which of the two statistics queues a payload was popped from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueOrigin {
    /// Short-interval (per-minute) aggregates.
    Short,
    /// Long-interval (hourly) aggregates.
    Long,
}

impl QueueOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueOrigin::Short => "short",
            QueueOrigin::Long => "long",
        }
    }
}

/// The two queue names read by one consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueNames {
    pub short: String,
    pub long: String,
}

impl QueueNames {
    pub fn new(short: impl Into<String>, long: impl Into<String>) -> Self {
        Self {
            short: short.into(),
            long: long.into(),
        }
    }

    /// Map a queue name returned by the pop back to its origin.
    pub fn origin_of(&self, queue: &str) -> Option<QueueOrigin> {
        if queue == self.short {
            Some(QueueOrigin::Short)
        } else if queue == self.long {
            Some(QueueOrigin::Long)
        } else {
            None
        }
    }

    pub fn as_slice(&self) -> [&str; 2] {
        [self.short.as_str(), self.long.as_str()]
    }
}

impl Default for QueueNames {
    fn default() -> Self {
        Self::new("statistics:300", "statistics:3600")
    }
}

/// One aggregated measurement, decoded from a queue payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    pub avg: f64,
    pub total: f64,
    pub max: f64,
    pub count: i64,
    /// Window start, seconds on the source clock.
    pub start: i64,
    pub key: String,
    pub tags: Tags,
}

/// Errors raised while decoding a single payload. The sample is dropped, the
/// connection stays usable.
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("malformed sample payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("tag segment {segment:?} is not a key=value pair with a non-empty key")]
    TagSegment { segment: String },
    #[error("payload popped from unknown queue {0:?}")]
    UnknownQueue(String),
}

/// Tags arrive either as a JSON object or as one space-delimited `key=value` string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireTags {
    Map(Tags),
    Text(String),
}

impl WireTags {
    fn into_tags(self) -> Result<Tags, DecodeError> {
        match self {
            WireTags::Map(tags) => Ok(tags),
            WireTags::Text(text) => parse_tag_string(&text),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireSample {
    avg: f64,
    total: f64,
    max: f64,
    #[serde(default)]
    count: i64,
    start: i64,
    key: String,
    #[serde(default)]
    tags: Option<WireTags>,
}

impl RawSample {
    /// Decode a queue payload, normalizing the tag set into one mapping.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let wire: WireSample = serde_json::from_slice(payload)?;
        let tags = match wire.tags {
            Some(tags) => tags.into_tags()?,
            None => Tags::new(),
        };
        Ok(Self {
            avg: wire.avg,
            total: wire.total,
            max: wire.max,
            count: wire.count,
            start: wire.start,
            key: wire.key,
            tags,
        })
    }
}

/// Parse `"a=1 b=2"` into `{a: "1", b: "2"}`. Repeated spaces are tolerated,
/// a segment without `=` is not.
pub fn parse_tag_string(text: &str) -> Result<Tags, DecodeError> {
    text.split(' ')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            segment
                .split_once('=')
                .filter(|(key, _)| !key.is_empty())
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .ok_or_else(|| DecodeError::TagSegment {
                    segment: segment.to_string(),
                })
        })
        .collect()
}
