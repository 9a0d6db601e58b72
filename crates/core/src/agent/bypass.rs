//! Requests that must always go straight to the network.

use std::fmt;
use std::sync::Arc;

use url::Url;

/// Predicate selecting live-data requests that are never cached.
#[derive(Clone)]
pub enum BypassRule {
    /// Match when the URL contains any of these fragments.
    Patterns(Vec<String>),
    /// Arbitrary predicate supplied by the embedder.
    Custom(Arc<dyn Fn(&Url) -> bool + Send + Sync>),
}

impl BypassRule {
    pub fn none() -> Self {
        Self::Patterns(Vec::new())
    }

    pub fn custom(predicate: impl Fn(&Url) -> bool + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(predicate))
    }

    pub fn matches(&self, url: &Url) -> bool {
        match self {
            Self::Patterns(patterns) => {
                let url = url.as_str();
                patterns.iter().any(|p| url.contains(p.as_str()))
            }
            Self::Custom(predicate) => predicate(url),
        }
    }
}

impl fmt::Debug for BypassRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Patterns(patterns) => f.debug_tuple("Patterns").field(patterns).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
