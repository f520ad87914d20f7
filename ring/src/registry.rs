//! The main `Registry` struct: registration, resolution and dependency binding.
//!
//! Removal lives in `removal.rs`.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;

use crate::config::RingConfig;
use crate::core::{erase, unerase, Instance, Key, Provider, Record, Slot};
use crate::error::RegistryError;
use crate::graph::DependencyGraph;
use crate::register::{Eager, Lazy, LazyAsync, Options, Register, Transient};

/// A tagged service registry.
///
/// Records are looked up through a concurrent map. Every structural change
/// (registration, dependency binding, removal) is serialized through the lock
/// guarding the dependency graph, so the map and the edges never disagree.
/// Factories run without that lock held and may resolve other services.
pub struct Registry {
  pub(crate) slots: DashMap<Key, Slot>,
  pub(crate) graph: Mutex<DependencyGraph>,
  pub(crate) config: RingConfig,
}

impl Default for Registry {
  fn default() -> Self {
    Self::with_config(RingConfig::default())
  }
}

impl fmt::Debug for Registry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Registry")
      .field("registrations", &self.len())
      .field("config", &self.config)
      .finish()
  }
}

impl Registry {
  /// Creates a new, empty `Registry`.
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_config(config: RingConfig) -> Self {
    Self {
      slots: DashMap::new(),
      graph: Mutex::new(DependencyGraph::default()),
      config,
    }
  }

  pub fn config(&self) -> &RingConfig {
    &self.config
  }

  /// Number of registrations. Alias keys are not counted separately.
  pub fn len(&self) -> usize {
    self.slots.iter().filter(|entry| !entry.value().is_alias()).count()
  }

  pub fn is_empty(&self) -> bool {
    self.slots.is_empty()
  }

  /// Primary keys of every registration, sorted by type name and tag.
  pub fn keys(&self) -> Vec<Key> {
    let mut keys: Vec<Key> = self
      .slots
      .iter()
      .filter(|entry| !entry.value().is_alias())
      .map(|entry| entry.key().clone())
      .collect();
    keys.sort_by(|a, b| (a.type_name(), a.tag()).cmp(&(b.type_name(), b.tag())));
    keys
  }

  // --- Registration ---

  /// Registers an already constructed singleton.
  pub fn register_instance<T: Any + Send + Sync>(&self, instance: T) -> Register<'_, T, Eager<T>> {
    Register::eager(self, Arc::new(instance))
  }

  /// Registers an already shared singleton, including trait objects.
  pub fn register_instance_arc<T: ?Sized + Any + Send + Sync>(
    &self,
    instance: Arc<T>,
  ) -> Register<'_, T, Eager<T>> {
    Register::eager(self, instance)
  }

  /// Registers a singleton built by `factory` on first resolution.
  pub fn register_lazy<T, F>(&self, factory: F) -> Register<'_, T, Lazy>
  where
    T: Any + Send + Sync,
    F: Fn() -> T + Send + Sync + 'static,
  {
    Register::lazy(self, Box::new(move || erase(Arc::new(factory()))))
  }

  /// Like [`Registry::register_lazy`], for factories that produce an `Arc`
  /// (typically a trait object).
  pub fn register_lazy_arc<T, F>(&self, factory: F) -> Register<'_, T, Lazy>
  where
    T: ?Sized + Any + Send + Sync,
    F: Fn() -> Arc<T> + Send + Sync + 'static,
  {
    Register::lazy(self, Box::new(move || erase(factory())))
  }

  /// Registers a singleton built by an async factory on first `resolve_async`.
  pub fn register_lazy_async<T, F, Fut>(&self, factory: F) -> Register<'_, T, LazyAsync>
  where
    T: Any + Send + Sync,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
  {
    Register::lazy_async(
      self,
      Box::new(move || -> BoxFuture<'static, Instance> {
        let construction = factory();
        Box::pin(async move { erase(Arc::new(construction.await)) })
      }),
    )
  }

  /// Registers a factory invoked on every resolution.
  pub fn register_factory<T, F>(&self, factory: F) -> Register<'_, T, Transient>
  where
    T: Any + Send + Sync,
    F: Fn() -> T + Send + Sync + 'static,
  {
    Register::transient(self, Box::new(move || erase(Arc::new(factory()))))
  }

  pub(crate) fn insert<T: ?Sized + Any>(&self, provider: Provider, options: Options) -> Result<Key, RegistryError> {
    let Options {
      tag,
      alias,
      replace,
      disposal,
    } = options;
    let key = Key::new::<T>(tag.as_deref());
    let alias = alias.map(|target| ((target.key_of)(tag.as_deref()), target.projection));
    let replace = replace || self.config.allow_replace;
    let strategy = provider.strategy();

    let graph = self.graph.lock();

    if let Some((alias_key, _)) = &alias {
      if *alias_key == key {
        return Err(RegistryError::DuplicateRegistration { key });
      }
    }

    let previous = self.slots.get(&key).map(|slot| slot.value().clone());
    if let Some(previous) = &previous {
      if !replace || previous.is_alias() {
        return Err(RegistryError::DuplicateRegistration { key });
      }
      if previous.record.is_retiring() {
        return Err(RegistryError::RemovalInProgress { key });
      }
    }

    if let Some((alias_key, _)) = &alias {
      let owner = self.slots.get(alias_key).map(|slot| slot.record.key.clone());
      if owner.is_some_and(|owner| owner != key) {
        return Err(RegistryError::DuplicateRegistration {
          key: alias_key.clone(),
        });
      }
    }

    if let Some(previous) = previous {
      if let Some(old_alias) = &previous.record.alias {
        self.slots.remove(old_alias);
      }
      if self.config.debug {
        tracing::debug!(key = %key, previous = previous.record.provider.strategy(), "replacing registration");
      }
    }

    let alias_key = alias.as_ref().map(|(alias_key, _)| alias_key.clone());
    let disposal_label = disposal.label();
    let record = Arc::new(Record::new(key.clone(), alias_key, provider, disposal));
    if let Some((alias_key, projection)) = alias {
      self.slots.insert(alias_key, Slot::alias(record.clone(), projection));
    }
    self.slots.insert(key.clone(), Slot::primary(record));
    drop(graph);

    if self.config.debug {
      tracing::debug!(key = %key, strategy, disposal = disposal_label, "registered");
    }
    Ok(key)
  }

  // --- Resolution ---

  fn slot(&self, key: &Key) -> Result<Slot, RegistryError> {
    self
      .slots
      .get(key)
      .map(|slot| slot.value().clone())
      .ok_or_else(|| RegistryError::NotRegistered { key: key.clone() })
  }

  /// Resolves `T`, constructing it if its strategy requires.
  ///
  /// Async registrations fail with [`RegistryError::AsyncRecord`], and a
  /// record whose removal is still disposing it fails with
  /// [`RegistryError::RemovalInProgress`].
  pub fn resolve<T: ?Sized + Any + Send + Sync>(&self, tag: Option<&str>) -> Result<Arc<T>, RegistryError> {
    let key = Key::new::<T>(tag);
    let instance = self.slot(&key)?.resolve_sync(&key, self.config.debug)?;
    if self.config.debug {
      tracing::debug!(key = %key, "resolved");
    }
    downcast(&key, &instance)
  }

  /// Like [`Registry::resolve`], but a missing registration is `Ok(None)`.
  /// Every other error, including a removal in progress, is still returned.
  pub fn try_resolve<T: ?Sized + Any + Send + Sync>(
    &self,
    tag: Option<&str>,
  ) -> Result<Option<Arc<T>>, RegistryError> {
    absent_as_none(self.resolve::<T>(tag))
  }

  /// Resolves `T` through any strategy. Concurrent calls for an async record
  /// that is still being built all share that one construction.
  pub async fn resolve_async<T: ?Sized + Any + Send + Sync>(
    &self,
    tag: Option<&str>,
  ) -> Result<Arc<T>, RegistryError> {
    let key = Key::new::<T>(tag);
    let slot = self.slot(&key)?;
    let instance = slot.resolve_async(&key, self.config.debug).await?;
    if self.config.debug {
      tracing::debug!(key = %key, "resolved");
    }
    downcast(&key, &instance)
  }

  pub async fn try_resolve_async<T: ?Sized + Any + Send + Sync>(
    &self,
    tag: Option<&str>,
  ) -> Result<Option<Arc<T>>, RegistryError> {
    absent_as_none(self.resolve_async::<T>(tag).await)
  }

  /// Resolves the single registration carrying `tag`, whatever its type.
  pub fn resolve_by_tag(&self, tag: &str) -> Result<Service, RegistryError> {
    self
      .try_resolve_by_tag(tag)?
      .ok_or_else(|| RegistryError::NotRegistered {
        key: Key::tagged::<dyn Any + Send + Sync>(tag),
      })
  }

  /// Like [`Registry::resolve_by_tag`], but a missing tag is `Ok(None)`.
  ///
  /// Alias keys share their primary's tag and do not count as a second match.
  pub fn try_resolve_by_tag(&self, tag: &str) -> Result<Option<Service>, RegistryError> {
    let mut candidates: Vec<(Key, Slot)> = self
      .slots
      .iter()
      .filter(|entry| entry.key().tag() == Some(tag) && !entry.value().is_alias())
      .map(|entry| (entry.key().clone(), entry.value().clone()))
      .collect();

    match candidates.len() {
      0 => Ok(None),
      1 => {
        let (key, slot) = candidates.remove(0);
        let instance = slot.resolve_sync(&key, self.config.debug)?;
        Ok(Some(Service { key, instance }))
      }
      _ => {
        let mut keys: Vec<Key> = candidates.into_iter().map(|(key, _)| key).collect();
        keys.sort_by_key(|key| key.type_name());
        Err(RegistryError::AmbiguousTag {
          tag: tag.to_owned(),
          candidates: keys,
        })
      }
    }
  }

  /// Returns `true` if `(T, tag)` is registered. Never constructs anything.
  pub fn is_registered<T: ?Sized + Any>(&self, tag: Option<&str>) -> bool {
    self.contains(&Key::new::<T>(tag))
  }

  pub fn contains(&self, key: &Key) -> bool {
    self.slots.contains_key(key)
  }

  /// Returns `true` if the record under `key` currently holds a live instance.
  pub fn is_constructed(&self, key: &Key) -> bool {
    self
      .slot(key)
      .map(|slot| slot.record.provider.is_constructed())
      .unwrap_or(false)
  }

  // --- Dependencies ---

  /// Records that `dependent` needs `dependency`: `dependency` cannot be removed
  /// while the edge exists. Binding an existing edge again is a no-op.
  ///
  /// Edges are between registrations, not instances, so any strategy,
  /// factories included, can take part. An edge that would close a cycle is
  /// rejected with [`RegistryError::CircularDependency`].
  pub fn bind_dependency(&self, dependent: &Key, dependency: &Key) -> Result<(), RegistryError> {
    let mut graph = self.graph.lock();
    let dependent = self.primary_key(dependent)?;
    let dependency = self.primary_key(dependency)?;

    if dependent == dependency || graph.reaches(&dependency, &dependent) {
      return Err(RegistryError::CircularDependency { key: dependent });
    }

    let added = graph.bind(&dependent, &dependency);
    drop(graph);
    if added && self.config.debug {
      tracing::debug!(dependent = %dependent, dependency = %dependency, "bound dependency");
    }
    Ok(())
  }

  /// Registrations that depend on `key`.
  pub fn dependents_of(&self, key: &Key) -> Vec<Key> {
    let graph = self.graph.lock();
    match self.primary_key(key) {
      Ok(primary) => graph.dependents_of(&primary),
      Err(_) => Vec::new(),
    }
  }

  /// Registrations `key` depends on.
  pub fn dependencies_of(&self, key: &Key) -> Vec<Key> {
    let graph = self.graph.lock();
    match self.primary_key(key) {
      Ok(primary) => graph.dependencies_of(&primary),
      Err(_) => Vec::new(),
    }
  }

  /// Maps an alias key onto the key of the record it points to.
  pub(crate) fn primary_key(&self, key: &Key) -> Result<Key, RegistryError> {
    let slot = self.slot(key)?;
    if slot.record.is_retiring() {
      return Err(RegistryError::RemovalInProgress {
        key: slot.record.key.clone(),
      });
    }
    Ok(slot.record.key.clone())
  }
}

/// A service found by tag alone.
#[derive(Clone)]
pub struct Service {
  key: Key,
  instance: Instance,
}

impl Service {
  /// The key the service is registered under.
  pub fn key(&self) -> &Key {
    &self.key
  }

  pub fn is<T: ?Sized + Any + Send + Sync>(&self) -> bool {
    self.instance.is::<Arc<T>>()
  }

  pub fn downcast<T: ?Sized + Any + Send + Sync>(&self) -> Option<Arc<T>> {
    unerase::<T>(&self.instance)
  }
}

impl fmt::Debug for Service {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Service").field("key", &self.key).finish_non_exhaustive()
  }
}

fn downcast<T: ?Sized + Any + Send + Sync>(key: &Key, instance: &Instance) -> Result<Arc<T>, RegistryError> {
  // Instances are stored as `Arc<T>` for the `T` of the key they sit under.
  unerase::<T>(instance).ok_or_else(|| RegistryError::NotRegistered { key: key.clone() })
}

fn absent_as_none<T>(result: Result<T, RegistryError>) -> Result<Option<T>, RegistryError> {
  match result {
    Ok(value) => Ok(Some(value)),
    Err(err) if err.is_not_registered() => Ok(None),
    Err(err) => Err(err),
  }
}
