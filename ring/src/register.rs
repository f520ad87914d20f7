//! The typed registration builder returned by the `Registry::register_*` methods.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::core::{erase, unerase, AsyncFactory, Instance, Key, Projection, Provider, SyncFactory};
use crate::dispose::{AsyncDisposable, Disposable, Disposal};
use crate::error::RegistryError;
use crate::registry::Registry;

/// Strategy marker: an already constructed singleton.
pub struct Eager<T: ?Sized>(Arc<T>);

/// Strategy marker: a singleton constructed on first resolution.
pub struct Lazy {
  factory: SyncFactory,
  fenix: bool,
}

/// Strategy marker: a singleton constructed by an async factory on first
/// `resolve_async`.
pub struct LazyAsync {
  factory: AsyncFactory,
}

/// Strategy marker: a fresh instance on every resolution.
pub struct Transient {
  factory: SyncFactory,
}

mod sealed {
  /// Strategies whose record holds the instance it hands out. Only those can
  /// be aliased or disposed; a factory's products belong to their callers.
  pub trait Owning {}
}

impl<T: ?Sized> sealed::Owning for Eager<T> {}
impl sealed::Owning for Lazy {}
impl sealed::Owning for LazyAsync {}

pub(crate) struct AliasTarget {
  pub(crate) key_of: fn(Option<&str>) -> Key,
  pub(crate) projection: Projection,
}

pub(crate) struct Options {
  pub(crate) tag: Option<String>,
  pub(crate) alias: Option<AliasTarget>,
  pub(crate) replace: bool,
  pub(crate) disposal: Disposal,
}

/// A pending registration of `T`.
///
/// Nothing is stored until `commit` is called. Options that
/// make no sense for a strategy are not available on it: factories take no
/// alias or disposer, and only lazy singletons can be made fenix.
#[must_use = "a registration has no effect until `commit` is called"]
pub struct Register<'r, T: ?Sized + 'static, S> {
  registry: &'r Registry,
  strategy: S,
  options: Options,
  _service: PhantomData<fn() -> Arc<T>>,
}

impl<'r, T: ?Sized + Any + Send + Sync, S> Register<'r, T, S> {
  pub(crate) fn new(registry: &'r Registry, strategy: S) -> Self {
    Self {
      registry,
      strategy,
      options: Options {
        tag: None,
        alias: None,
        replace: false,
        disposal: Disposal::None,
      },
      _service: PhantomData,
    }
  }

  /// Registers under `(T, tag)` instead of the untagged key.
  pub fn tag(mut self, tag: impl Into<String>) -> Self {
    self.options.tag = Some(tag.into());
    self
  }

  /// Overwrites an existing registration under the same key instead of failing.
  pub fn replace(mut self) -> Self {
    self.options.replace = true;
    self
  }

  /// The key this registration will occupy.
  pub fn key(&self) -> Key {
    Key::new::<T>(self.options.tag.as_deref())
  }
}

impl<'r, T: ?Sized + Any + Send + Sync, S: sealed::Owning> Register<'r, T, S> {
  /// Calls [`Disposable::dispose`] on the instance when it is removed.
  ///
  /// Not available on factories, which keep no instance to dispose:
  ///
  /// ```compile_fail
  /// use circus_ring::{Disposable, DisposeError, Registry};
  ///
  /// struct Request;
  /// impl Disposable for Request {
  ///   fn dispose(&self) -> Result<(), DisposeError> {
  ///     Ok(())
  ///   }
  /// }
  ///
  /// let ring = Registry::new();
  /// ring.register_factory(|| Request).disposable().commit().unwrap();
  /// ```
  pub fn disposable(mut self) -> Self
  where
    T: Disposable,
  {
    self.options.disposal = Disposal::sync::<T>();
    self
  }

  /// Awaits [`AsyncDisposable::dispose`] on the instance when it is removed.
  pub fn async_disposable(mut self) -> Self
  where
    T: AsyncDisposable,
  {
    self.options.disposal = Disposal::asynchronous::<T>();
    self
  }

  /// Also makes the same instance reachable as `A` under the same tag.
  ///
  /// `cast` is usually an unsizing coercion, e.g. `|s| s as Arc<dyn Greeter>`.
  /// Removing through either key removes both.
  pub fn alias<A, F>(mut self, cast: F) -> Self
  where
    A: ?Sized + Any + Send + Sync,
    F: Fn(Arc<T>) -> Arc<A> + Send + Sync + 'static,
  {
    let projection: Projection = Arc::new(move |instance: Instance| match unerase::<T>(&instance) {
      Some(service) => erase(cast(service)),
      None => instance,
    });
    self.options.alias = Some(AliasTarget {
      key_of: Key::new::<A>,
      projection,
    });
    self
  }
}

impl<'r, T: ?Sized + Any + Send + Sync> Register<'r, T, Eager<T>> {
  pub(crate) fn eager(registry: &'r Registry, instance: Arc<T>) -> Self {
    Self::new(registry, Eager(instance))
  }

  /// Stores the instance and hands it back.
  pub fn commit(self) -> Result<Arc<T>, RegistryError> {
    let Register {
      registry,
      strategy: Eager(instance),
      options,
      ..
    } = self;
    let provider = Provider::Eager {
      instance: erase(instance.clone()),
    };
    registry.insert::<T>(provider, options)?;
    Ok(instance)
  }
}

impl<'r, T: ?Sized + Any + Send + Sync> Register<'r, T, Lazy> {
  pub(crate) fn lazy(registry: &'r Registry, factory: SyncFactory) -> Self {
    Self::new(registry, Lazy { factory, fenix: false })
  }

  /// Keeps the registration after removal; the next resolution rebuilds it.
  pub fn fenix(mut self) -> Self {
    self.strategy.fenix = true;
    self
  }

  /// Stores the factory without running it. Returns the occupied key.
  pub fn commit(self) -> Result<Key, RegistryError> {
    let Register {
      registry,
      strategy: Lazy { factory, fenix },
      options,
      ..
    } = self;
    registry.insert::<T>(Provider::lazy(factory, fenix), options)
  }
}

impl<'r, T: ?Sized + Any + Send + Sync> Register<'r, T, LazyAsync> {
  pub(crate) fn lazy_async(registry: &'r Registry, factory: AsyncFactory) -> Self {
    Self::new(registry, LazyAsync { factory })
  }

  /// Stores the async factory without running it. Returns the occupied key.
  pub fn commit(self) -> Result<Key, RegistryError> {
    let Register {
      registry,
      strategy: LazyAsync { factory },
      options,
      ..
    } = self;
    registry.insert::<T>(Provider::lazy_async(factory), options)
  }
}

impl<'r, T: ?Sized + Any + Send + Sync> Register<'r, T, Transient> {
  pub(crate) fn transient(registry: &'r Registry, factory: SyncFactory) -> Self {
    Self::new(registry, Transient { factory })
  }

  /// Stores the factory. Returns the occupied key.
  pub fn commit(self) -> Result<Key, RegistryError> {
    let Register {
      registry,
      strategy: Transient { factory },
      options,
      ..
    } = self;
    registry.insert::<T>(Provider::Factory { factory }, options)
  }
}
