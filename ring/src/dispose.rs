//! Disposal capabilities a registered service may expose.
//!
//! The registry never inspects an instance at removal time to find out how to
//! tear it down. The capability is chosen when the service is registered (see
//! [`Register::disposable`](crate::Register::disposable) and
//! [`Register::async_disposable`](crate::Register::async_disposable)) and stored
//! alongside the record.

use std::any::Any;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::core::{unerase, Instance};

/// The error type a disposer reports.
pub type DisposeError = Box<dyn std::error::Error + Send + Sync>;

/// A service that releases resources synchronously when removed from the registry.
pub trait Disposable: Send + Sync {
  fn dispose(&self) -> Result<(), DisposeError>;
}

/// A service whose teardown must be awaited.
///
/// Records with an async disposer can only be removed through
/// [`Registry::remove_async`](crate::Registry::remove_async) and friends.
#[async_trait]
pub trait AsyncDisposable: Send + Sync {
  async fn dispose(&self) -> Result<(), DisposeError>;
}

type SyncDisposer = Box<dyn Fn(&Instance) -> Result<(), DisposeError> + Send + Sync>;
type AsyncDisposer = Box<dyn Fn(Instance) -> BoxFuture<'static, Result<(), DisposeError>> + Send + Sync>;

/// How a record is torn down, fixed at registration.
pub(crate) enum Disposal {
  None,
  Sync(SyncDisposer),
  Async(AsyncDisposer),
}

impl Disposal {
  pub(crate) fn sync<T: ?Sized + Disposable + Any>() -> Self {
    Disposal::Sync(Box::new(|instance: &Instance| match unerase::<T>(instance) {
      Some(service) => Disposable::dispose(&*service),
      None => Ok(()),
    }))
  }

  pub(crate) fn asynchronous<T: ?Sized + AsyncDisposable + Any>() -> Self {
    Disposal::Async(Box::new(|instance: Instance| -> BoxFuture<'static, Result<(), DisposeError>> {
      Box::pin(async move {
        match unerase::<T>(&instance) {
          Some(service) => AsyncDisposable::dispose(&*service).await,
          None => Ok(()),
        }
      })
    }))
  }

  pub(crate) fn label(&self) -> &'static str {
    match self {
      Disposal::None => "none",
      Disposal::Sync(_) => "sync",
      Disposal::Async(_) => "async",
    }
  }

  /// Runs a disposer that does not need to be awaited. Async disposers are
  /// left to the caller, which decides whether that is an error.
  pub(crate) fn run_sync(&self, instance: &Instance) -> Option<Result<(), DisposeError>> {
    match self {
      Disposal::None => Some(Ok(())),
      Disposal::Sync(dispose) => Some(dispose(instance)),
      Disposal::Async(_) => None,
    }
  }

  pub(crate) async fn run(&self, instance: Instance) -> Result<(), DisposeError> {
    match self {
      Disposal::None => Ok(()),
      Disposal::Sync(dispose) => dispose(&instance),
      Disposal::Async(dispose) => dispose(instance).await,
    }
  }
}
