//! Session configuration.
//!
//! [`EmulationConfig`] controls naming conventions shared with the embedder's hook layer,
//! guest string limits and how intercepted calls are reported.
//!
//! # Presets
//!
//! - [`EmulationConfig::default()`] - strings captured, calls reported at `info`
//! - [`EmulationConfig::debugging()`] - calls reported at `debug` with their addresses
//! - [`EmulationConfig::quiet()`] - no reporting, no string capture
//!
//! # Example
//!
//! ```rust
//! use drvscope::emulation::{EmulationConfig, Verbosity};
//!
//! let config = EmulationConfig::debugging()
//!     .with_hook_prefix("api_")
//!     .with_max_string_length(4096);
//!
//! assert_eq!(config.verbosity, Verbosity::Debug);
//! assert_eq!(config.hook_prefix, "api_");
//! ```

use strum::{Display, EnumIter, EnumString};

/// Default prefix of hook function names, stripped before a call is recorded.
pub const DEFAULT_HOOK_PREFIX: &str = "hook_";

/// Default prefix of synthetic parameter names given to variadic arguments.
pub const DEFAULT_VARIADIC_PREFIX: &str = "__va_";

/// Default upper bound on the length of a guest string, in bytes.
pub const DEFAULT_MAX_STRING_LENGTH: usize = 0x10000;

/// How intercepted calls are reported.
///
/// Variants are ordered from least to most verbose, and parse from and print as their
/// lowercase names.
///
/// ```rust
/// use drvscope::emulation::Verbosity;
///
/// let verbosity: Verbosity = "debug".parse().unwrap();
/// assert!(verbosity > Verbosity::Default);
/// ```
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum Verbosity {
    /// Calls are not reported.
    Disabled,
    /// Calls are reported at `info` level.
    #[default]
    Default,
    /// Calls are reported at `debug` level, prefixed with their address.
    Debug,
}

/// Configuration of an [`EmulationSession`](crate::emulation::EmulationSession).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmulationConfig {
    /// Prefix stripped from hook names when calls are recorded or reported.
    pub hook_prefix: String,

    /// Prefix of the synthetic names given to variadic arguments.
    ///
    /// Parameters carrying this prefix are reported by value only.
    pub variadic_prefix: String,

    /// Maximum length of a terminated guest string, in bytes.
    ///
    /// Reading a string that has no terminator within this many bytes fails with
    /// [`EmulationError::UnterminatedString`](crate::emulation::EmulationError::UnterminatedString).
    pub max_string_length: usize,

    /// Whether decoded guest strings are indexed in the call ledger.
    pub capture_strings: bool,

    /// How intercepted calls are reported.
    pub verbosity: Verbosity,
}

impl Default for EmulationConfig {
    fn default() -> Self {
        EmulationConfig {
            hook_prefix: DEFAULT_HOOK_PREFIX.to_string(),
            variadic_prefix: DEFAULT_VARIADIC_PREFIX.to_string(),
            max_string_length: DEFAULT_MAX_STRING_LENGTH,
            capture_strings: true,
            verbosity: Verbosity::Default,
        }
    }
}

impl EmulationConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports every call at `debug` level with its address.
    #[must_use]
    pub fn debugging() -> Self {
        EmulationConfig {
            verbosity: Verbosity::Debug,
            ..Self::default()
        }
    }

    /// Records calls without reporting them or indexing strings.
    #[must_use]
    pub fn quiet() -> Self {
        EmulationConfig {
            capture_strings: false,
            verbosity: Verbosity::Disabled,
            ..Self::default()
        }
    }

    /// Sets the hook name prefix.
    #[must_use]
    pub fn with_hook_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.hook_prefix = prefix.into();
        self
    }

    /// Sets the variadic parameter prefix.
    #[must_use]
    pub fn with_variadic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.variadic_prefix = prefix.into();
        self
    }

    /// Sets the maximum guest string length.
    #[must_use]
    pub fn with_max_string_length(mut self, length: usize) -> Self {
        self.max_string_length = length;
        self
    }

    /// Enables or disables string capture.
    #[must_use]
    pub fn with_capture_strings(mut self, enabled: bool) -> Self {
        self.capture_strings = enabled;
        self
    }

    /// Sets the report verbosity.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn presets() {
        let default = EmulationConfig::default();
        assert_eq!(default.hook_prefix, "hook_");
        assert_eq!(default.variadic_prefix, "__va_");
        assert!(default.capture_strings);

        let quiet = EmulationConfig::quiet();
        assert_eq!(quiet.verbosity, Verbosity::Disabled);
        assert!(!quiet.capture_strings);
        assert_eq!(quiet.max_string_length, default.max_string_length);
    }

    #[test]
    fn verbosity_round_trips_through_names() {
        for verbosity in Verbosity::iter() {
            assert_eq!(verbosity.to_string().parse::<Verbosity>().unwrap(), verbosity);
        }
        assert!("loud".parse::<Verbosity>().is_err());
    }
}
