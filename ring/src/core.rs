//! Core, non-public data structures for the registry.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use crate::dispose::Disposal;
use crate::error::RegistryError;

thread_local! {
  // The set of records currently being constructed on this thread. A key that is
  // already present means a factory is (transitively) asking for itself.
  static RESOLVING_STACK: RefCell<HashSet<Key>> = RefCell::new(HashSet::new());
}

/// An RAII guard that detects circular resolution on the current thread.
///
/// Entering adds the key to the thread-local resolution stack and fails if it
/// is already there. Dropping the guard removes the key again.
pub(crate) struct ResolutionGuard {
  key: Key,
}

impl ResolutionGuard {
  pub(crate) fn enter(key: &Key) -> Result<Self, RegistryError> {
    let fresh = RESOLVING_STACK.with(|stack| stack.borrow_mut().insert(key.clone()));
    if !fresh {
      return Err(RegistryError::CircularDependency { key: key.clone() });
    }
    Ok(Self { key: key.clone() })
  }
}

impl Drop for ResolutionGuard {
  fn drop(&mut self) {
    RESOLVING_STACK.with(|stack| {
      stack.borrow_mut().remove(&self.key);
    });
  }
}

/// Identifies one registration slot: a declared type plus an optional tag.
///
/// Two keys are equal when both the type and the tag match. Untagged keys use
/// `None` as their tag, so `Key::of::<T>()` and `Key::tagged::<T>("x")` never
/// collide.
#[derive(Clone)]
pub struct Key {
  type_id: TypeId,
  type_name: &'static str,
  tag: Option<String>,
}

impl Key {
  /// The untagged key for `T`.
  pub fn of<T: ?Sized + Any>() -> Self {
    Self::new::<T>(None)
  }

  /// The key for `T` under `tag`.
  pub fn tagged<T: ?Sized + Any>(tag: &str) -> Self {
    Self::new::<T>(Some(tag))
  }

  pub fn new<T: ?Sized + Any>(tag: Option<&str>) -> Self {
    Self {
      type_id: TypeId::of::<T>(),
      type_name: std::any::type_name::<T>(),
      tag: tag.map(str::to_owned),
    }
  }

  pub fn type_id(&self) -> TypeId {
    self.type_id
  }

  pub fn type_name(&self) -> &'static str {
    self.type_name
  }

  pub fn tag(&self) -> Option<&str> {
    self.tag.as_deref()
  }

  /// Returns `true` if this key was declared for `T`, regardless of tag.
  pub fn is_type<T: ?Sized + Any>(&self) -> bool {
    self.type_id == TypeId::of::<T>()
  }
}

impl PartialEq for Key {
  fn eq(&self, other: &Self) -> bool {
    self.type_id == other.type_id && self.tag == other.tag
  }
}

impl Eq for Key {}

impl Hash for Key {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.type_id.hash(state);
    self.tag.hash(state);
  }
}

impl fmt::Debug for Key {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.tag {
      Some(tag) => write!(f, "Key({}, Tag({}))", self.type_name, tag),
      None => write!(f, "Key({})", self.type_name),
    }
  }
}

impl fmt::Display for Key {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.tag {
      Some(tag) => write!(f, "`{}` [{}]", self.type_name, tag),
      None => write!(f, "`{}`", self.type_name),
    }
  }
}

/// A type-erased service. The payload is always an `Arc<T>` for the `T` of the
/// key it was stored under, which lets unsized services round-trip.
pub(crate) type Instance = Arc<dyn Any + Send + Sync>;
pub(crate) type SyncFactory = Box<dyn Fn() -> Instance + Send + Sync>;
pub(crate) type AsyncFactory = Box<dyn Fn() -> BoxFuture<'static, Instance> + Send + Sync>;
pub(crate) type PendingInstance = Shared<BoxFuture<'static, Instance>>;
/// Converts a primary instance into the instance seen through an alias key.
pub(crate) type Projection = Arc<dyn Fn(Instance) -> Instance + Send + Sync>;

pub(crate) fn erase<T: ?Sized + Any + Send + Sync>(service: Arc<T>) -> Instance {
  Arc::new(service)
}

pub(crate) fn unerase<T: ?Sized + Any + Send + Sync>(instance: &Instance) -> Option<Arc<T>> {
  instance.downcast_ref::<Arc<T>>().cloned()
}

/// Lifecycle of a lazily constructed singleton.
///
/// `Disposed` is only ever observed by fenix records: anything else is dropped
/// from the registry on removal. On the next access a disposed record behaves
/// exactly like an unconstructed one.
pub(crate) enum LazyState {
  Unconstructed,
  Alive(Instance),
  Disposed,
}

pub(crate) enum AsyncState {
  Unconstructed,
  Pending(PendingInstance),
  Alive(Instance),
}

pub(crate) enum Provider {
  Eager {
    instance: Instance,
  },
  Lazy {
    factory: SyncFactory,
    fenix: bool,
    state: Mutex<LazyState>,
  },
  LazyAsync {
    factory: AsyncFactory,
    state: Mutex<AsyncState>,
  },
  Factory {
    factory: SyncFactory,
  },
}

impl Provider {
  pub(crate) fn lazy(factory: SyncFactory, fenix: bool) -> Self {
    Provider::Lazy {
      factory,
      fenix,
      state: Mutex::new(LazyState::Unconstructed),
    }
  }

  pub(crate) fn lazy_async(factory: AsyncFactory) -> Self {
    Provider::LazyAsync {
      factory,
      state: Mutex::new(AsyncState::Unconstructed),
    }
  }

  pub(crate) fn strategy(&self) -> &'static str {
    match self {
      Provider::Eager { .. } => "instance",
      Provider::Lazy { fenix: true, .. } => "fenix",
      Provider::Lazy { .. } => "lazy",
      Provider::LazyAsync { .. } => "lazy_async",
      Provider::Factory { .. } => "factory",
    }
  }

  /// Synchronous resolution. Lazy records construct under their state lock,
  /// so concurrent callers observe a single factory run.
  pub(crate) fn get_sync(&self, requested: &Key, debug: bool) -> Result<Instance, RegistryError> {
    match self {
      Provider::Eager { instance } => Ok(instance.clone()),
      Provider::Lazy { factory, fenix, state } => {
        let mut state = state.lock();
        if let LazyState::Alive(instance) = &*state {
          return Ok(instance.clone());
        }
        let revived = matches!(*state, LazyState::Disposed);
        let instance = factory();
        *state = LazyState::Alive(instance.clone());
        if debug {
          tracing::debug!(key = %requested, fenix = *fenix, revived, "constructed lazy singleton");
        }
        Ok(instance)
      }
      Provider::LazyAsync { .. } => Err(RegistryError::AsyncRecord {
        key: requested.clone(),
      }),
      Provider::Factory { factory } => Ok(factory()),
    }
  }

  /// Asynchronous resolution. Async records memoize the in-flight construction,
  /// every other strategy resolves immediately through [`Provider::get_sync`].
  pub(crate) async fn get_async(&self, requested: &Key, debug: bool) -> Result<Instance, RegistryError> {
    let (factory, state) = match self {
      Provider::LazyAsync { factory, state } => (factory, state),
      _ => return self.get_sync(requested, debug),
    };

    let pending = {
      let mut guard = state.lock();
      match &*guard {
        AsyncState::Alive(instance) => return Ok(instance.clone()),
        AsyncState::Pending(pending) => {
          if debug {
            tracing::debug!(key = %requested, "joining in-flight construction");
          }
          pending.clone()
        }
        AsyncState::Unconstructed => {
          let pending = factory().shared();
          *guard = AsyncState::Pending(pending.clone());
          pending
        }
      }
    };

    let instance = pending.clone().await;

    let mut guard = state.lock();
    if let AsyncState::Pending(current) = &*guard {
      if current.ptr_eq(&pending) {
        *guard = AsyncState::Alive(instance.clone());
        if debug {
          tracing::debug!(key = %requested, "constructed async singleton");
        }
      }
    }
    Ok(instance)
  }

  /// The instance this record currently owns, without triggering construction.
  /// Factories never own what they produce.
  pub(crate) fn alive(&self) -> Option<Instance> {
    match self {
      Provider::Eager { instance } => Some(instance.clone()),
      Provider::Lazy { state, .. } => match &*state.lock() {
        LazyState::Alive(instance) => Some(instance.clone()),
        _ => None,
      },
      Provider::LazyAsync { state, .. } => match &*state.lock() {
        AsyncState::Alive(instance) => Some(instance.clone()),
        _ => None,
      },
      Provider::Factory { .. } => None,
    }
  }

  /// Drops any cached instance. Fenix records become revivable.
  pub(crate) fn retire(&self) {
    match self {
      Provider::Lazy { state, .. } => {
        let mut state = state.lock();
        if !matches!(*state, LazyState::Unconstructed) {
          *state = LazyState::Disposed;
        }
      }
      Provider::LazyAsync { state, .. } => *state.lock() = AsyncState::Unconstructed,
      Provider::Eager { .. } | Provider::Factory { .. } => {}
    }
  }

  pub(crate) fn is_fenix(&self) -> bool {
    matches!(self, Provider::Lazy { fenix: true, .. })
  }

  pub(crate) fn is_constructed(&self) -> bool {
    self.alive().is_some()
  }
}

/// One registration: the provider plus everything the registry needs to know
/// about it when removing it.
pub(crate) struct Record {
  pub(crate) key: Key,
  pub(crate) alias: Option<Key>,
  pub(crate) provider: Provider,
  pub(crate) disposal: Disposal,
  retiring: AtomicBool,
}

impl Record {
  pub(crate) fn new(key: Key, alias: Option<Key>, provider: Provider, disposal: Disposal) -> Self {
    Self {
      key,
      alias,
      provider,
      disposal,
      retiring: AtomicBool::new(false),
    }
  }

  pub(crate) fn is_retiring(&self) -> bool {
    self.retiring.load(Ordering::Acquire)
  }

  /// Marks the record as mid-removal. Returns `false` if it already was.
  pub(crate) fn begin_retire(&self) -> bool {
    !self.retiring.swap(true, Ordering::AcqRel)
  }

  pub(crate) fn abort_retire(&self) {
    self.retiring.store(false, Ordering::Release);
  }
}

/// What the registry map stores under a key. Alias slots share their primary's
/// record and carry the projection into the alias type.
#[derive(Clone)]
pub(crate) struct Slot {
  pub(crate) record: Arc<Record>,
  pub(crate) projection: Option<Projection>,
}

impl Slot {
  pub(crate) fn primary(record: Arc<Record>) -> Self {
    Self {
      record,
      projection: None,
    }
  }

  pub(crate) fn alias(record: Arc<Record>, projection: Projection) -> Self {
    Self {
      record,
      projection: Some(projection),
    }
  }

  pub(crate) fn is_alias(&self) -> bool {
    self.projection.is_some()
  }

  /// Fails while the record's disposer runs, so a removed instance is never
  /// handed out again.
  fn ensure_live(&self) -> Result<(), RegistryError> {
    if self.record.is_retiring() {
      return Err(RegistryError::RemovalInProgress {
        key: self.record.key.clone(),
      });
    }
    Ok(())
  }

  pub(crate) fn resolve_sync(&self, requested: &Key, debug: bool) -> Result<Instance, RegistryError> {
    self.ensure_live()?;
    let _guard = ResolutionGuard::enter(&self.record.key)?;
    let instance = self.record.provider.get_sync(requested, debug)?;
    Ok(self.project(instance))
  }

  pub(crate) async fn resolve_async(&self, requested: &Key, debug: bool) -> Result<Instance, RegistryError> {
    self.ensure_live()?;
    let instance = match &self.record.provider {
      Provider::LazyAsync { .. } => self.record.provider.get_async(requested, debug).await?,
      provider => {
        let _guard = ResolutionGuard::enter(&self.record.key)?;
        provider.get_sync(requested, debug)?
      }
    };
    Ok(self.project(instance))
  }

  fn project(&self, instance: Instance) -> Instance {
    match &self.projection {
      Some(projection) => projection(instance),
      None => instance,
    }
  }
}
