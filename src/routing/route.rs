//! Route variants.
//!
//! # Design Decisions
//! - Closed set of variants: a route collection can only hold well-formed
//!   routes, so selection never has to check element types
//! - Patterns are compiled when the route is built; a bad pattern never
//!   becomes a route
//! - Exact matches are case-sensitive (paths are)

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::pipeline::stage::RequestStage;

/// Error raised while building a route.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("invalid route pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Maps a match key (usually a path) to a stage.
#[derive(Clone)]
pub enum Route {
    /// Key equals the string exactly.
    Exact(String, Arc<dyn RequestStage>),
    /// Key matches the regular expression anywhere (anchor it to be strict).
    Pattern(Regex, Arc<dyn RequestStage>),
    /// Matches every key. Useful as a fall-through.
    Any(Arc<dyn RequestStage>),
}

impl Route {
    pub fn exact(key: impl Into<String>, stage: Arc<dyn RequestStage>) -> Self {
        Route::Exact(key.into(), stage)
    }

    /// Compile `pattern` into a pattern route.
    pub fn pattern(pattern: &str, stage: Arc<dyn RequestStage>) -> Result<Self, RouteError> {
        let regex = Regex::new(pattern).map_err(|source| RouteError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Route::Pattern(regex, stage))
    }

    pub fn any(stage: Arc<dyn RequestStage>) -> Self {
        Route::Any(stage)
    }

    /// The route's stage if `key` matches.
    pub fn match_key(&self, key: &str) -> Option<&Arc<dyn RequestStage>> {
        match self {
            Route::Exact(expected, stage) => (expected == key).then_some(stage),
            Route::Pattern(regex, stage) => regex.is_match(key).then_some(stage),
            Route::Any(stage) => Some(stage),
        }
    }

    pub fn stage(&self) -> &Arc<dyn RequestStage> {
        match self {
            Route::Exact(_, stage) | Route::Pattern(_, stage) | Route::Any(stage) => stage,
        }
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Exact(key, stage) => write!(f, "Exact({:?} -> {})", key, stage.name()),
            Route::Pattern(regex, stage) => write!(f, "Pattern({:?} -> {})", regex.as_str(), stage.name()),
            Route::Any(stage) => write!(f, "Any(-> {})", stage.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stage::request_stage_fn;

    fn stage() -> Arc<dyn RequestStage> {
        Arc::new(request_stage_fn(|_ctx| None))
    }

    #[test]
    fn test_exact_route() {
        let route = Route::exact("/api", stage());
        assert!(route.match_key("/api").is_some());
        assert!(route.match_key("/api/v1").is_none());
        assert!(route.match_key("/API").is_none());
    }

    #[test]
    fn test_pattern_route() {
        let route = Route::pattern(r"^/images/.*\.png$", stage()).unwrap();
        assert!(route.match_key("/images/cat.png").is_some());
        assert!(route.match_key("/images/cat.jpg").is_none());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let err = Route::pattern("/(unclosed", stage()).unwrap_err();
        assert!(matches!(err, RouteError::InvalidPattern { ref pattern, .. } if pattern == "/(unclosed"));
    }

    #[test]
    fn test_any_matches_everything() {
        let s = stage();
        let route = Route::any(s.clone());
        assert!(Arc::ptr_eq(route.match_key("").unwrap(), &s));
        assert!(route.match_key("/whatever").is_some());
    }
}
