//! # Glob Filtering - Actor and Message Selection
//!
//! ## Purpose
//! Decides which actors and message types are instrumented. Patterns are
//! compiled once when the configuration is built and evaluated lock-free on
//! every event afterwards.
//!
//! ## Pattern Language
//!
//! Patterns operate on `/`-delimited path segments:
//!
//! | Token | Meaning |
//! |-------|---------|
//! | `*`   | any run of characters inside one segment |
//! | `**`  | zero or more whole segments (start, middle or end) |
//! | `?`   | exactly one character inside a segment |
//!
//! Every other character, including `. ( ) [ ] + $ ^ |`, is literal.
//!
//! ```text
//! "**/user/**"      matches  "sys://node/user/orders/order-1"
//! "**/worker-?"     matches  "sys://node/user/worker-7"
//! "**/x"            matches  "x", "a/x", "a/b/c/d/e/x"
//! "sys://node/*"    matches  "sys://node/logger", not "sys://node/a/b"
//! ```
//!
//! ## Decision Rule
//!
//! 1. Any exclude pattern matches → excluded
//! 2. Include list empty → included
//! 3. Otherwise included iff some include pattern matches
//!
//! ## Performance Characteristics
//!
//! - **Compilation**: once per distinct pattern string per process (cached)
//! - **Matching**: one anchored regex scan per pattern, no allocation

use crate::{ActorContext, MetricsError, Result};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Process-wide cache of compiled patterns keyed by their source string
static PATTERN_CACHE: Lazy<DashMap<String, Arc<GlobPattern>>> = Lazy::new(DashMap::new);

const DOUBLE_STAR: &str = "**";

/// A compiled glob pattern
pub struct GlobPattern {
    raw: String,
    regex: Regex,
}

impl GlobPattern {
    /// Compile a pattern, reusing a cached matcher for the same source
    pub fn compile(raw: &str) -> Result<Arc<GlobPattern>> {
        if let Some(cached) = PATTERN_CACHE.get(raw) {
            return Ok(Arc::clone(cached.value()));
        }

        let regex_source = translate(raw)?;
        let regex = Regex::new(&regex_source)
            .map_err(|e| MetricsError::invalid_pattern(raw, e.to_string()))?;
        let compiled = Arc::new(GlobPattern {
            raw: raw.to_string(),
            regex,
        });

        Ok(Arc::clone(
            PATTERN_CACHE
                .entry(raw.to_string())
                .or_insert(compiled)
                .value(),
        ))
    }

    #[inline]
    pub fn is_match(&self, subject: &str) -> bool {
        self.regex.is_match(subject)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The anchored regular expression this pattern compiled to
    pub fn regex_source(&self) -> &str {
        self.regex.as_str()
    }
}

impl fmt::Debug for GlobPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobPattern")
            .field("raw", &self.raw)
            .field("regex", &self.regex.as_str())
            .finish()
    }
}

/// Translate a glob into an anchored regular expression
fn translate(raw: &str) -> Result<String> {
    if raw.is_empty() {
        return Err(MetricsError::invalid_pattern(raw, "pattern is empty"));
    }

    // Consecutive `**` segments are equivalent to one
    let mut segments: Vec<&str> = Vec::new();
    for segment in raw.split('/') {
        if segment == DOUBLE_STAR && segments.last() == Some(&DOUBLE_STAR) {
            continue;
        }
        segments.push(segment);
    }

    let last = segments.len() - 1;
    let mut out = String::with_capacity(raw.len() * 2 + 2);
    out.push('^');

    for (i, segment) in segments.iter().enumerate() {
        if *segment == DOUBLE_STAR {
            if segments.len() == 1 {
                out.push_str(".*");
            } else if i == 0 {
                out.push_str("(?:.*/)?");
            } else if i == last {
                out.push_str("(?:/.*)?");
            } else {
                out.push_str("/(?:.*/)?");
            }
            continue;
        }

        if i > 0 && segments[i - 1] != DOUBLE_STAR {
            out.push('/');
        }
        translate_segment(raw, segment, &mut out)?;
    }

    out.push('$');
    Ok(out)
}

fn translate_segment(raw: &str, segment: &str, out: &mut String) -> Result<()> {
    if segment.contains(DOUBLE_STAR) {
        return Err(MetricsError::invalid_pattern(
            raw,
            format!("'**' must occupy a whole path segment (found '{}')", segment),
        ));
    }

    let mut buf = [0u8; 4];
    for c in segment.chars() {
        match c {
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            c => out.push_str(&regex::escape(c.encode_utf8(&mut buf))),
        }
    }
    Ok(())
}

/// Raw include/exclude pattern lists
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub include_actors: Vec<String>,
    pub exclude_actors: Vec<String>,
    pub include_messages: Vec<String>,
    pub exclude_messages: Vec<String>,
}

impl FilterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include_actor(mut self, pattern: impl Into<String>) -> Self {
        self.include_actors.push(pattern.into());
        self
    }

    pub fn exclude_actor(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_actors.push(pattern.into());
        self
    }

    pub fn include_message(mut self, pattern: impl Into<String>) -> Self {
        self.include_messages.push(pattern.into());
        self
    }

    pub fn exclude_message(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_messages.push(pattern.into());
        self
    }
}

/// One include/exclude pair of compiled pattern lists
#[derive(Debug, Clone, Default)]
struct PatternSet {
    include: Vec<Arc<GlobPattern>>,
    exclude: Vec<Arc<GlobPattern>>,
}

impl PatternSet {
    fn compile(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: include
                .iter()
                .map(|p| GlobPattern::compile(p))
                .collect::<Result<_>>()?,
            exclude: exclude
                .iter()
                .map(|p| GlobPattern::compile(p))
                .collect::<Result<_>>()?,
        })
    }

    #[inline]
    fn decide(&self, subject: &str) -> bool {
        if self.exclude.iter().any(|p| p.is_match(subject)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|p| p.is_match(subject))
    }
}

/// Compiled actor and message filters
#[derive(Debug, Clone, Default)]
pub struct FilterEngine {
    actors: PatternSet,
    messages: PatternSet,
}

impl FilterEngine {
    /// Compile every pattern in `config`; fails on the first malformed one
    pub fn compile(config: &FilterConfig) -> Result<Self> {
        Ok(Self {
            actors: PatternSet::compile(&config.include_actors, &config.exclude_actors)?,
            messages: PatternSet::compile(&config.include_messages, &config.exclude_messages)?,
        })
    }

    /// Engine that includes everything
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Whether the actor behind `context` is instrumented
    #[inline]
    pub fn matches(&self, context: &ActorContext) -> bool {
        self.matches_path(context.path())
    }

    #[inline]
    pub fn matches_path(&self, path: &str) -> bool {
        self.actors.decide(path)
    }

    /// Whether messages of `type_name` are instrumented
    #[inline]
    pub fn matches_message(&self, type_name: &str) -> bool {
        self.messages.decide(type_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glob(p: &str) -> Arc<GlobPattern> {
        GlobPattern::compile(p).unwrap()
    }

    #[test]
    fn test_literal_pattern_is_exact() {
        let p = glob("sys://node/user/a.b(c)[d]+e");
        assert!(p.is_match("sys://node/user/a.b(c)[d]+e"));
        assert!(!p.is_match("sys://node/user/aXb(c)[d]+e"));
        assert!(!p.is_match("sys://node/user/a.b(c)[d]+e/child"));
        assert!(!p.is_match("prefix/sys://node/user/a.b(c)[d]+e"));
    }

    #[test]
    fn test_single_star_is_one_segment() {
        let p = glob("sys/*/logger");
        assert!(p.is_match("sys/node/logger"));
        assert!(!p.is_match("sys/a/b/logger"));

        let p = glob("sys/order-*");
        assert!(p.is_match("sys/order-1"));
        assert!(p.is_match("sys/order-"));
        assert!(!p.is_match("sys/order-1/child"));
    }

    #[test]
    fn test_question_mark_is_one_char() {
        let p = glob("sys/worker-?");
        assert!(p.is_match("sys/worker-7"));
        assert!(!p.is_match("sys/worker-42"));
        assert!(!p.is_match("sys/worker-"));
        assert!(!glob("a?b").is_match("a/b"));
    }

    #[test]
    fn test_double_star_positions() {
        let leading = glob("**/x");
        assert!(leading.is_match("x"));
        assert!(leading.is_match("a/x"));
        assert!(!leading.is_match("ax"));

        let trailing = glob("a/**");
        assert!(trailing.is_match("a"));
        assert!(trailing.is_match("a/b/c"));
        assert!(!trailing.is_match("ab"));

        let middle = glob("a/**/b");
        assert!(middle.is_match("a/b"));
        assert!(middle.is_match("a/x/y/b"));
        assert!(!middle.is_match("a/xb"));

        let all = glob("**");
        assert!(all.is_match(""));
        assert!(all.is_match("anything/at/all"));
    }

    #[test]
    fn test_consecutive_double_stars_collapse() {
        let p = glob("**/**/x");
        assert_eq!(p.regex_source(), glob("**/x").regex_source());
        assert!(p.is_match("x"));
    }

    #[test]
    fn test_malformed_patterns_rejected() {
        assert!(matches!(
            GlobPattern::compile(""),
            Err(MetricsError::InvalidPattern { .. })
        ));
        assert!(matches!(
            GlobPattern::compile("a**"),
            Err(MetricsError::InvalidPattern { .. })
        ));
        assert!(matches!(
            GlobPattern::compile("sys/***/x"),
            Err(MetricsError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_cache_returns_same_matcher() {
        let a = glob("cache/**/probe");
        let b = glob("cache/**/probe");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_empty_include_matches_all() {
        let engine = FilterEngine::compile(&FilterConfig::new()).unwrap();
        assert!(engine.matches_path("anything"));
        assert!(engine.matches_message("Any.Message"));
    }

    #[test]
    fn test_exclude_dominates_include() {
        let config = FilterConfig::new()
            .include_actor("**")
            .exclude_actor("**/system/**");
        let engine = FilterEngine::compile(&config).unwrap();
        assert!(engine.matches_path("sys://n/user/a"));
        assert!(!engine.matches_path("sys://n/system/logger"));
    }

    #[test]
    fn test_message_filters_independent_of_actor_filters() {
        let config = FilterConfig::new()
            .include_actor("**/user/**")
            .exclude_message("Heartbeat*");
        let engine = FilterEngine::compile(&config).unwrap();
        assert!(engine.matches_message("OrderPlaced"));
        assert!(!engine.matches_message("HeartbeatTick"));
        assert!(!engine.matches_path("sys://n/system/x"));
    }

    #[test]
    fn test_compile_fails_on_first_bad_pattern() {
        let config = FilterConfig::new().include_actor("ok/**").exclude_message("bad**");
        let err = FilterEngine::compile(&config).unwrap_err();
        assert!(err.is_configuration_error());
    }
}
