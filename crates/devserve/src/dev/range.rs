//! Single byte-range support for asset responses.
//!
//! Only one `bytes=` range is honored. A header naming several ranges, or one
//! that cannot be parsed, gets the full content with `200`. A header whose
//! ranges are all unsatisfiable gets `416` with `Content-Range: bytes */len`.

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use bytes::Bytes;

/// Outcome of parsing a `Range` header against a content length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeParse {
    /// No `=`, or a unit other than `bytes`
    Malformed,
    /// No range overlaps the content
    Unsatisfiable,
    /// Satisfiable ranges as inclusive `(start, end)` offsets
    Ranges(Vec<(u64, u64)>),
}

/// Status, headers and body of an asset response after range handling.
#[derive(Debug, Clone)]
pub struct RangedContent {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Parse a `Range` header value for content of `len` bytes.
///
/// Each comma-separated spec is `start-end`, `start-` or `-suffix`. Ends past
/// the content are clamped to `len - 1`; specs with `start > end` or a suffix
/// longer than the content are dropped.
pub fn parse_range(value: &str, len: u64) -> RangeParse {
    let Some((unit, specs)) = value.split_once('=') else {
        return RangeParse::Malformed;
    };
    if unit.trim() != "bytes" {
        return RangeParse::Malformed;
    }

    let len = i128::from(len);
    let mut ranges = Vec::new();

    for spec in specs.split(',') {
        let mut bounds = spec.split('-');
        let first = bounds.next().and_then(parse_leading_int);
        let second = bounds.next().and_then(parse_leading_int);

        let (start, mut end) = match (first, second) {
            (Some(start), Some(end)) => (start, end),
            (Some(start), None) => (start, len - 1),
            (None, Some(suffix)) => (len - suffix, len - 1),
            (None, None) => continue,
        };

        if end > len - 1 {
            end = len - 1;
        }
        if start < 0 || start > end {
            continue;
        }

        ranges.push((start as u64, end as u64));
    }

    if ranges.is_empty() {
        RangeParse::Unsatisfiable
    } else {
        RangeParse::Ranges(ranges)
    }
}

/// Leading decimal digits after optional whitespace; `None` when there are none.
fn parse_leading_int(s: &str) -> Option<i128> {
    let s = s.trim_start();
    let digits = s.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    // Saturate absurdly long numbers instead of failing the whole header
    Some(s[..digits].parse::<i128>().unwrap_or(i128::from(u64::MAX)))
}

/// Apply an optional `Range` header to `content`.
pub fn apply_range(content: Bytes, range: Option<&str>) -> RangedContent {
    let len = content.len() as u64;
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    let parsed = range.map(|value| parse_range(value, len));

    match parsed {
        Some(RangeParse::Unsatisfiable) => {
            headers.insert(header::CONTENT_RANGE, header_value(format!("bytes */{}", len)));
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(0u64));
            RangedContent {
                status: StatusCode::RANGE_NOT_SATISFIABLE,
                headers,
                body: Bytes::new(),
            }
        }
        Some(RangeParse::Ranges(ranges)) if ranges.len() == 1 => {
            let (start, end) = ranges[0];
            let body = content.slice(start as usize..=end as usize);
            headers.insert(
                header::CONTENT_RANGE,
                header_value(format!("bytes {}-{}/{}", start, end, len)),
            );
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len() as u64));
            RangedContent {
                status: StatusCode::PARTIAL_CONTENT,
                headers,
                body,
            }
        }
        other => {
            match other {
                Some(RangeParse::Malformed) => {
                    tracing::debug!("malformed Range header, sending full content")
                }
                Some(RangeParse::Ranges(_)) => {
                    tracing::debug!("multiple ranges requested, sending full content")
                }
                _ => {}
            }
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
            RangedContent {
                status: StatusCode::OK,
                headers,
                body: content,
            }
        }
    }
}

fn header_value(value: String) -> HeaderValue {
    // Built from digits and ASCII punctuation only
    HeaderValue::try_from(value).unwrap_or_else(|_| HeaderValue::from_static("bytes */0"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(n: usize) -> Bytes {
        Bytes::from((0..n).map(|i| (i % 251) as u8).collect::<Vec<_>>())
    }

    fn header<'a>(ranged: &'a RangedContent, name: header::HeaderName) -> Option<&'a str> {
        ranged.headers.get(name).and_then(|v| v.to_str().ok())
    }

    #[test]
    fn test_parse_range_forms() {
        assert_eq!(parse_range("bytes=0-9", 100), RangeParse::Ranges(vec![(0, 9)]));
        assert_eq!(parse_range("bytes=90-", 100), RangeParse::Ranges(vec![(90, 99)]));
        assert_eq!(parse_range("bytes=-10", 100), RangeParse::Ranges(vec![(90, 99)]));
        assert_eq!(parse_range("bytes=50-500", 100), RangeParse::Ranges(vec![(50, 99)]));
        assert_eq!(
            parse_range("bytes=0-1, 5-6", 100),
            RangeParse::Ranges(vec![(0, 1), (5, 6)])
        );
    }

    #[test]
    fn test_parse_range_malformed() {
        assert_eq!(parse_range("0-9", 100), RangeParse::Malformed);
        assert_eq!(parse_range("items=0-9", 100), RangeParse::Malformed);
    }

    #[test]
    fn test_parse_range_unsatisfiable() {
        assert_eq!(parse_range("bytes=100-", 100), RangeParse::Unsatisfiable);
        assert_eq!(parse_range("bytes=9-3", 100), RangeParse::Unsatisfiable);
        assert_eq!(parse_range("bytes=-0", 100), RangeParse::Unsatisfiable);
        assert_eq!(parse_range("bytes=-", 100), RangeParse::Unsatisfiable);
        assert_eq!(parse_range("bytes=0-0", 0), RangeParse::Unsatisfiable);
    }

    #[test]
    fn test_full_range_is_partial_content() {
        let n = 64;
        let ranged = apply_range(content(n), Some("bytes=0-63"));

        assert_eq!(ranged.status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(ranged.body, content(n));
        assert_eq!(header(&ranged, header::CONTENT_RANGE), Some("bytes 0-63/64"));
        assert_eq!(header(&ranged, header::CONTENT_LENGTH), Some("64"));
        assert_eq!(header(&ranged, header::ACCEPT_RANGES), Some("bytes"));
    }

    #[test]
    fn test_slice() {
        let ranged = apply_range(Bytes::from_static(b"hello world"), Some("bytes=6-"));
        assert_eq!(ranged.status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(&ranged.body[..], b"world");
        assert_eq!(header(&ranged, header::CONTENT_RANGE), Some("bytes 6-10/11"));
    }

    #[test]
    fn test_start_at_length_is_416() {
        let ranged = apply_range(content(64), Some("bytes=64-"));

        assert_eq!(ranged.status, StatusCode::RANGE_NOT_SATISFIABLE);
        assert!(ranged.body.is_empty());
        assert_eq!(header(&ranged, header::CONTENT_RANGE), Some("bytes */64"));
    }

    #[test]
    fn test_multiple_ranges_send_full_content() {
        let ranged = apply_range(content(64), Some("bytes=0-1,10-11"));

        assert_eq!(ranged.status, StatusCode::OK);
        assert_eq!(ranged.body.len(), 64);
        assert!(ranged.headers.get(header::CONTENT_RANGE).is_none());
    }

    #[test]
    fn test_malformed_or_absent_sends_full_content() {
        for range in [None, Some("garbage")] {
            let ranged = apply_range(content(8), range);
            assert_eq!(ranged.status, StatusCode::OK);
            assert_eq!(ranged.body.len(), 8);
            assert_eq!(header(&ranged, header::CONTENT_LENGTH), Some("8"));
            assert_eq!(header(&ranged, header::ACCEPT_RANGES), Some("bytes"));
        }
    }
}
