//! The process-wide registry instance and its accessor.

use once_cell::sync::Lazy;

use crate::config::RingConfig;
use crate::registry::Registry;

// Created on first access, configured from the environment.
static GLOBAL_REGISTRY: Lazy<Registry> = Lazy::new(|| Registry::with_config(RingConfig::from_env()));

/// Provides a reference to the global registry.
///
/// Applications conventionally share this one instance; tests should build
/// their own [`Registry`] instead of relying on global state.
///
/// # Examples
///
/// ```
/// use circus_ring::global;
///
/// fn register_services() {
///   global()
///     .register_instance(String::from("Hello from global!"))
///     .tag("greeting")
///     .commit()
///     .unwrap();
/// }
/// # register_services();
/// ```
pub fn global() -> &'static Registry {
  &GLOBAL_REGISTRY
}
