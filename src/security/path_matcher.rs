//! Glob-to-regex path matcher (C4)
//!
//! Two wildcard forms: `*` matches exactly one path segment, and a trailing
//! `/**` matches zero or more further segments. `**` anywhere else, or more
//! than once, is rejected at compile time.

use regex::Regex;

use crate::error::{Error, Result};

const MAX_PATH_LEN: usize = 4096;

/// A single compiled public-path pattern.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    source: String,
    regex: Regex,
}

impl CompiledPattern {
    /// Compile `pattern` into a regex, rejecting malformed `**` usage.
    pub fn compile(pattern: &str) -> Result<Self> {
        let star_star_count = pattern.matches("**").count();
        if star_star_count > 1 {
            return Err(Error::InvalidPattern(format!(
                "pattern `{pattern}` uses `**` more than once"
            )));
        }
        if star_star_count == 1 && !pattern.ends_with("/**") {
            return Err(Error::InvalidPattern(format!(
                "pattern `{pattern}` uses `**` outside of a trailing `/**`"
            )));
        }

        let body = pattern.strip_suffix("/**");
        let literal_part = body.unwrap_or(pattern);

        let mut regex_str = String::from("^");
        let mut chars = literal_part.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '*' {
                regex_str.push_str("[^/]+");
            } else {
                regex_str.push_str(&regex::escape(&c.to_string()));
            }
        }
        if body.is_some() {
            regex_str.push_str("(/.*)?");
        }
        regex_str.push('$');

        let regex = Regex::new(&regex_str).map_err(|e| Error::InvalidPattern(e.to_string()))?;
        Ok(Self { source: pattern.to_string(), regex })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

/// A compiled set of public-path patterns, checked against every inbound
/// request path by the security pipeline (C5, step 1).
#[derive(Debug, Clone, Default)]
pub struct PathMatcher {
    patterns: Vec<CompiledPattern>,
}

impl PathMatcher {
    /// Compile every pattern; the first invalid pattern aborts construction.
    pub fn compile(patterns: &[String]) -> Result<Self> {
        let compiled = patterns
            .iter()
            .map(|p| CompiledPattern::compile(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns: compiled })
    }

    /// Whether `path` matches any compiled pattern. Paths longer than 4096
    /// characters are refused outright (logged as a warning) to avoid
    /// pathological regex scans.
    pub fn is_match(&self, path: &str) -> bool {
        if path.len() > MAX_PATH_LEN {
            tracing::warn!(path_len = path.len(), "refusing to match oversized path");
            return false;
        }
        self.patterns.iter().any(|p| p.matches(path))
    }
}
