//! Registry configuration.

/// Settings a [`Registry`](crate::Registry) is created with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RingConfig {
  /// Emit `debug` lines for registration, resolution and removal.
  pub debug: bool,
  /// Treat every registration as if `.replace()` had been requested.
  pub allow_replace: bool,
}

impl RingConfig {
  /// Environment variable read by [`RingConfig::from_env`].
  pub const DEBUG_ENV: &'static str = "CIRCUS_RING_DEBUG";

  pub fn new() -> Self {
    Self::default()
  }

  /// Defaults, with `debug` taken from `CIRCUS_RING_DEBUG`.
  pub fn from_env() -> Self {
    let debug = std::env::var(Self::DEBUG_ENV)
      .map(|value| parse_flag(&value))
      .unwrap_or(false);
    Self {
      debug,
      ..Self::default()
    }
  }

  pub fn debug(mut self, enabled: bool) -> Self {
    self.debug = enabled;
    self
  }

  pub fn allow_replace(mut self, enabled: bool) -> Self {
    self.allow_replace = enabled;
    self
  }
}

fn parse_flag(value: &str) -> bool {
  matches!(
    value.trim().to_ascii_lowercase().as_str(),
    "1" | "true" | "yes" | "on"
  )
}
