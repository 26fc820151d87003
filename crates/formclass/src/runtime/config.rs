//! Runtime configuration.
//!
//! Only dispatch policy is configurable. Both knobs can also be read from the
//! environment with [`RuntimeConfig::from_env`]:
//!
//! - `FORMCLASS_TIE_BREAK`: `lexicographic` or `registration`
//! - `FORMCLASS_AMBIGUITY`: `warn` or `error`

use std::env;
use std::str::FromStr;

use tracing::warn;

/// Environment variable read for [`TieBreak`].
pub const TIE_BREAK_ENV: &str = "FORMCLASS_TIE_BREAK";

/// Environment variable read for [`AmbiguityPolicy`].
pub const AMBIGUITY_ENV: &str = "FORMCLASS_AMBIGUITY";

/// How to order candidates at the same total distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreak {
    /// Compare matcher names position by position.
    #[default]
    Lexicographic,
    /// Earlier registration wins.
    Registration,
}

impl FromStr for TieBreak {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lexicographic" | "lexical" => Ok(TieBreak::Lexicographic),
            "registration" | "registered" => Ok(TieBreak::Registration),
            other => Err(format!("unknown tie-break policy '{other}'")),
        }
    }
}

/// What an ambiguous resolution does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AmbiguityPolicy {
    /// Pick the first candidate and record a warning.
    #[default]
    Warn,
    /// Fail the call with [`DispatchError::AmbiguousDispatch`].
    ///
    /// [`DispatchError::AmbiguousDispatch`]: crate::error::DispatchError::AmbiguousDispatch
    Error,
}

impl FromStr for AmbiguityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "warn" | "warning" => Ok(AmbiguityPolicy::Warn),
            "error" | "deny" => Ok(AmbiguityPolicy::Error),
            other => Err(format!("unknown ambiguity policy '{other}'")),
        }
    }
}

/// Dispatch policy of a [`Runtime`](crate::runtime::Runtime).
///
/// # Example
///
/// ```rust
/// use formclass::{AmbiguityPolicy, Runtime, RuntimeConfig, TieBreak};
///
/// let config = RuntimeConfig::default()
///     .tie_break(TieBreak::Registration)
///     .ambiguity(AmbiguityPolicy::Error);
/// let runtime = Runtime::with_config(config);
/// assert_eq!(runtime.config().ambiguity, AmbiguityPolicy::Error);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuntimeConfig {
    /// Ordering among equally distant candidates.
    pub tie_break: TieBreak,
    /// Reaction to a tie at the minimum distance.
    pub ambiguity: AmbiguityPolicy,
}

impl RuntimeConfig {
    /// Sets the tie-break policy.
    #[must_use]
    pub fn tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    /// Sets the ambiguity policy.
    #[must_use]
    pub fn ambiguity(mut self, ambiguity: AmbiguityPolicy) -> Self {
        self.ambiguity = ambiguity;
        self
    }

    /// Defaults overridden by the `FORMCLASS_*` environment variables.
    ///
    /// Unparseable values are logged and ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(tie_break) = read_env(TIE_BREAK_ENV) {
            config.tie_break = tie_break;
        }
        if let Some(ambiguity) = read_env(AMBIGUITY_ENV) {
            config.ambiguity = ambiguity;
        }
        config
    }
}

fn read_env<T: FromStr<Err = String>>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(reason) => {
            warn!(key, %reason, "ignoring invalid configuration value");
            None
        }
    }
}
