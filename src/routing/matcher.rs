//! Path pattern matching.
//!
//! # Responsibilities
//! - Compile route patterns into segment lists once, at table construction
//! - Match request paths segment by segment
//! - Capture named segments for logging
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - Paths containing `.` or `..` segments match nothing
//! - Query strings never take part in matching
//! - Trailing slash on the request path is ignored
//! - No regex to guarantee O(n) matching

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// Errors produced while compiling a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("pattern must start with '/': {0}")]
    MissingLeadingSlash(String),

    #[error("empty segment in pattern: {0}")]
    EmptySegment(String),

    #[error("'**' is only allowed as the last segment: {0}")]
    MisplacedTail(String),

    #[error("empty parameter name in pattern: {0}")]
    EmptyParam(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `*`: exactly one segment.
    Any,
    /// `{name}` or `<name>`: exactly one segment, captured.
    Param(String),
    /// `**`: zero or more trailing segments.
    Tail,
}

/// A compiled path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    source: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Compile a pattern such as `/api/v1/orders/{id}` or `/static/**`.
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        if !pattern.starts_with('/') {
            return Err(PatternError::MissingLeadingSlash(pattern.to_string()));
        }

        let trimmed = pattern.trim_end_matches('/');
        let mut segments = Vec::new();
        let raw: Vec<&str> = if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed[1..].split('/').collect()
        };

        for (i, part) in raw.iter().enumerate() {
            let segment = match *part {
                "" => return Err(PatternError::EmptySegment(pattern.to_string())),
                "*" => Segment::Any,
                "**" => {
                    if i + 1 != raw.len() {
                        return Err(PatternError::MisplacedTail(pattern.to_string()));
                    }
                    Segment::Tail
                }
                p if is_param(p) => {
                    let name = &p[1..p.len() - 1];
                    if name.is_empty() {
                        return Err(PatternError::EmptyParam(pattern.to_string()));
                    }
                    Segment::Param(name.to_string())
                }
                p => Segment::Literal(p.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            source: pattern.to_string(),
            segments,
        })
    }

    /// The pattern as written in configuration.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Returns true if the path matches this pattern.
    pub fn matches(&self, path: &str) -> bool {
        self.captures(path).is_some()
    }

    /// Match the path and return captured parameters, or `None` on mismatch.
    pub fn captures(&self, path: &str) -> Option<HashMap<String, String>> {
        let path = path.split('?').next().unwrap_or_default();
        let trimmed = path.trim_end_matches('/');
        let parts: Vec<&str> = if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed.trim_start_matches('/').split('/').collect()
        };
        // Dot segments could walk the backend out of the routed prefix.
        if parts.iter().any(|p| is_dot_segment(p)) {
            return None;
        }

        let mut params = HashMap::new();
        let mut idx = 0;
        for segment in &self.segments {
            match segment {
                Segment::Tail => return Some(params),
                Segment::Literal(lit) => {
                    if parts.get(idx) != Some(&lit.as_str()) {
                        return None;
                    }
                }
                Segment::Any => {
                    if parts.get(idx).map_or(true, |p| p.is_empty()) {
                        return None;
                    }
                }
                Segment::Param(name) => match parts.get(idx) {
                    Some(p) if !p.is_empty() => {
                        params.insert(name.clone(), (*p).to_string());
                    }
                    _ => return None,
                },
            }
            idx += 1;
        }

        (idx == parts.len()).then_some(params)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// `.` or `..`, including percent-encoded forms.
fn is_dot_segment(segment: &str) -> bool {
    let decoded = segment.replace("%2e", ".").replace("%2E", ".");
    decoded == "." || decoded == ".."
}

fn is_param(segment: &str) -> bool {
    segment.len() >= 2
        && ((segment.starts_with('{') && segment.ends_with('}'))
            || (segment.starts_with('<') && segment.ends_with('>')))
}
