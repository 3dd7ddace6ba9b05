//! Result of a stage that may fall back instead of failing.

use serde::Serialize;

/// Where a stage result came from.
///
/// Translation, cleaning and labeling never fail the pipeline. Callers
/// that need to know whether the remote call actually succeeded inspect
/// the variant instead of a log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Outcome<T> {
    /// Produced by the remote service on this run.
    Remote(T),
    /// Served from a cache without touching the remote service.
    Cached(T),
    /// Deterministic substitute; `reason` says why the remote path was not used.
    Fallback { value: T, reason: String },
}

impl<T> Outcome<T> {
    pub fn fallback(value: T, reason: impl Into<String>) -> Self {
        Self::Fallback {
            value,
            reason: reason.into(),
        }
    }

    pub fn value(&self) -> &T {
        match self {
            Self::Remote(v) | Self::Cached(v) => v,
            Self::Fallback { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Self::Remote(v) | Self::Cached(v) => v,
            Self::Fallback { value, .. } => value,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, Self::Cached(_))
    }

    pub fn fallback_reason(&self) -> Option<&str> {
        match self {
            Self::Fallback { reason, .. } => Some(reason),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Remote(v) => Outcome::Remote(f(v)),
            Self::Cached(v) => Outcome::Cached(f(v)),
            Self::Fallback { value, reason } => Outcome::Fallback {
                value: f(value),
                reason,
            },
        }
    }
}
