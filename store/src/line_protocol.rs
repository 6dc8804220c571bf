//! InfluxDB line protocol.
//!
//! ```text
//! series,tag1=val1,tag2=val2 value=2.5,max=5 1000
//! ```
//!
//! Timestamps are written in seconds; writes must be sent with `precision=s`.

use crate::point::DerivedPoint;
use std::fmt::Write as _;

/// Encode a single row. Empty tag values are left out since the store refuses them.
pub fn encode_point(point: &DerivedPoint, out: &mut String) {
    out.push_str(&escape_measurement(&point.series));
    for (key, value) in point.tags.iter().filter(|(_, value)| !value.is_empty()) {
        out.push(',');
        out.push_str(&escape_tag(key));
        out.push('=');
        out.push_str(&escape_tag(value));
    }
    // Writing into a String cannot fail.
    let _ = write!(
        out,
        " value={},max={} {}",
        point.fields.value, point.fields.max, point.timestamp
    );
}

/// Encode a batch as a newline separated request body.
pub fn encode_batch(points: &[DerivedPoint]) -> String {
    let mut body = String::with_capacity(points.len() * 96);
    for (i, point) in points.iter().enumerate() {
        if i > 0 {
            body.push('\n');
        }
        encode_point(point, &mut body);
    }
    body
}

/// Commas and spaces must be escaped.
fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

/// Tag keys and values: commas, equals signs and spaces must be escaped.
fn escape_tag(s: &str) -> String {
    s.replace(',', "\\,").replace('=', "\\=").replace(' ', "\\ ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::{
        Fields,
        Tags,
    };
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn point(series: &str, tags: &[(&str, &str)]) -> DerivedPoint {
        let tags: Tags = tags.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        DerivedPoint::new(series, 1000, Fields { value: 2.5, max: 5.0 }, Arc::new(tags))
    }

    fn encoded(point: &DerivedPoint) -> String {
        let mut out = String::new();
        encode_point(point, &mut out);
        out
    }

    #[test]
    fn encodes_sorted_tags_and_fields() {
        let p = point("cpu|m", &[("node", "box"), ("host", "x")]);
        assert_eq!(encoded(&p), "cpu|m,host=x,node=box value=2.5,max=5 1000");
    }

    #[test]
    fn escapes_series_and_tags() {
        let p = point("disk usage,total", &[("mount point", "/a=b,c")]);
        assert_eq!(
            encoded(&p),
            "disk\\ usage\\,total,mount\\ point=/a\\=b\\,c value=2.5,max=5 1000"
        );
    }

    #[test]
    fn skips_empty_tag_values() {
        let p = point("mem|h", &[("dc", ""), ("node", "box")]);
        assert_eq!(encoded(&p), "mem|h,node=box value=2.5,max=5 1000");
    }

    #[test]
    fn batch_is_newline_separated() {
        let body = encode_batch(&[point("a|m", &[]), point("a|t", &[])]);
        assert_eq!(body, "a|m value=2.5,max=5 1000\na|t value=2.5,max=5 1000");
        assert_eq!(encode_batch(&[]), "");
    }
}
