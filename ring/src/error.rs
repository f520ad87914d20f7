use thiserror::Error;

use crate::core::Key;
use crate::dispose::DisposeError;

/// Errors reported by [`Registry`](crate::Registry) operations.
#[derive(Debug, Error)]
pub enum RegistryError {
  /// No record exists under the requested key.
  #[error("no registration found for {key}")]
  NotRegistered { key: Key },

  /// The key (or the requested alias key) is already occupied and the
  /// registration did not ask to replace it.
  #[error("{key} is already registered")]
  DuplicateRegistration { key: Key },

  /// Removal was blocked because other records still depend on this one.
  #[error("{key} cannot be removed while {} depend on it", list(.dependents))]
  DependencyExists { key: Key, dependents: Vec<Key> },

  /// A synchronous lookup hit an async-only record.
  #[error("{key} is constructed asynchronously; use `resolve_async`")]
  AsyncRecord { key: Key },

  /// A factory asked for itself, or a dependency edge would close a cycle.
  #[error("circular dependency detected at {key}")]
  CircularDependency { key: Key },

  /// More than one distinct registration carries the tag.
  #[error("tag '{tag}' matches several registrations: {}", list(.candidates))]
  AmbiguousTag { tag: String, candidates: Vec<Key> },

  /// A synchronous removal hit a constructed record with an async disposer.
  #[error("{key} has an async disposer; use `remove_async`")]
  AsyncDisposalRequired { key: Key },

  /// Another removal of the same record has not finished yet.
  #[error("{key} is already being removed")]
  RemovalInProgress { key: Key },

  /// The service's disposer reported a failure.
  #[error("disposing {key} failed: {source}")]
  Dispose {
    key: Key,
    #[source]
    source: DisposeError,
  },
}

impl RegistryError {
  /// The key the error is about, if it concerns a single key.
  pub fn key(&self) -> Option<&Key> {
    match self {
      RegistryError::NotRegistered { key }
      | RegistryError::DuplicateRegistration { key }
      | RegistryError::DependencyExists { key, .. }
      | RegistryError::AsyncRecord { key }
      | RegistryError::CircularDependency { key }
      | RegistryError::AsyncDisposalRequired { key }
      | RegistryError::RemovalInProgress { key }
      | RegistryError::Dispose { key, .. } => Some(key),
      RegistryError::AmbiguousTag { .. } => None,
    }
  }

  pub fn is_not_registered(&self) -> bool {
    matches!(self, RegistryError::NotRegistered { .. })
  }
}

/// The collected failures of a `remove_all` / `remove_all_async` sweep.
///
/// The sweep itself always completes: every record is gone from the registry
/// by the time this error is returned.
#[derive(Debug, Error)]
#[error("{} registration(s) failed to dispose during sweep", .failures.len())]
pub struct SweepError {
  failures: Vec<RegistryError>,
}

impl SweepError {
  pub(crate) fn check(failures: Vec<RegistryError>) -> Result<(), SweepError> {
    if failures.is_empty() {
      Ok(())
    } else {
      Err(SweepError { failures })
    }
  }

  pub fn failures(&self) -> &[RegistryError] {
    &self.failures
  }

  pub fn into_failures(self) -> Vec<RegistryError> {
    self.failures
  }
}

fn list(keys: &[Key]) -> String {
  keys.iter().map(Key::to_string).collect::<Vec<_>>().join(", ")
}
