//! `Accept` header parsing (RFC 9110 §12.5.1).

use std::cmp::Ordering;
use std::fmt;

/// One media range from an `Accept` header, e.g. `text/*;q=0.5`.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaRange {
    pub kind: String,
    pub subtype: String,
    pub quality: f32,
}

/// Why an `Accept` header could not be used.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum AcceptError {
    #[error("malformed media range `{0}`")]
    MalformedRange(String),
    #[error("malformed quality value `{0}`")]
    MalformedQuality(String),
}

impl MediaRange {
    /// Parses a single range. Parameters other than `q` are ignored.
    pub fn parse(s: &str) -> Result<Self, AcceptError> {
        let mut parts = s.split(';');
        let essence = parts.next().unwrap_or_default().trim();
        let (kind, subtype) = essence
            .split_once('/')
            .filter(|(k, s)| is_token(k) && is_token(s))
            .ok_or_else(|| AcceptError::MalformedRange(s.trim().to_owned()))?;

        // `*/html` is not a valid range
        if kind == "*" && subtype != "*" {
            return Err(AcceptError::MalformedRange(s.trim().to_owned()));
        }

        let mut quality = 1.0;
        for param in parts {
            let Some((name, value)) = param.split_once('=') else { continue };
            if name.trim().eq_ignore_ascii_case("q") {
                let value = value.trim();
                quality = value
                    .parse::<f32>()
                    .ok()
                    .filter(|q| (0.0..=1.0).contains(q))
                    .ok_or_else(|| AcceptError::MalformedQuality(value.to_owned()))?;
            }
        }

        Ok(Self {
            kind: kind.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
            quality,
        })
    }

    pub fn is_wildcard(&self) -> bool {
        self.kind == "*"
    }

    /// Whether this range accepts the concrete `type/subtype` in `mime`.
    pub fn accepts(&self, mime: &str) -> bool {
        let Some((kind, subtype)) = essence(mime).split_once('/') else { return false };
        (self.kind == "*" || self.kind.eq_ignore_ascii_case(kind))
            && (self.subtype == "*" || self.subtype.eq_ignore_ascii_case(subtype))
    }

    fn specificity(&self) -> u8 {
        match (self.kind.as_str(), self.subtype.as_str()) {
            ("*", _) => 0,
            (_, "*") => 1,
            _ => 2,
        }
    }
}

impl fmt::Display for MediaRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.subtype)?;
        if self.quality < 1.0 {
            write!(f, ";q={}", self.quality)?;
        }
        Ok(())
    }
}

/// Parses a full `Accept` header, best range first.
///
/// Ranges are ordered by quality, then specificity, then header order.
/// Ranges with `q=0` are kept: they exclude a type rather than accept it.
pub fn parse(header: &str) -> Result<Vec<MediaRange>, AcceptError> {
    let mut ranges = header
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(MediaRange::parse)
        .collect::<Result<Vec<_>, _>>()?;

    // `sort_by` is stable, so equal ranges keep header order.
    ranges.sort_by(|a, b| {
        b.quality
            .partial_cmp(&a.quality)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.specificity().cmp(&a.specificity()))
    });
    Ok(ranges)
}

/// Picks the best entry of `available` for the parsed `ranges`.
///
/// Returns `None` when nothing matches. A range that only matched through
/// `*/*` yields [`Selection::Wildcard`] so the caller can apply its default,
/// unless `default` itself was refused with `q=0`.
pub fn select<'a>(
    ranges: &[MediaRange],
    available: &'a [String],
    default: &str,
) -> Option<Selection<'a>> {
    for range in ranges.iter().filter(|r| r.quality > 0.0) {
        let found = available
            .iter()
            .find(|mime| range.accepts(mime) && !excluded(ranges, mime));
        if let Some(mime) = found {
            return Some(if range.is_wildcard() && !excluded(ranges, default) {
                Selection::Wildcard
            } else {
                Selection::Exact(mime.as_str())
            });
        }
    }
    None
}

/// Result of [`select`].
#[derive(Debug, PartialEq, Eq)]
pub enum Selection<'a> {
    Exact(&'a str),
    Wildcard,
}

fn excluded(ranges: &[MediaRange], mime: &str) -> bool {
    ranges
        .iter()
        .filter(|r| r.quality == 0.0 && r.specificity() == 2)
        .any(|r| r.accepts(mime))
}

fn essence(mime: &str) -> &str {
    mime.split(';').next().unwrap_or_default().trim()
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}
