//! Removal and disposal.
//!
//! A removal runs in two phases. Under the graph lock the record is checked for
//! dependents and marked as retiring, then its disposer runs with no lock held,
//! and finally the removal is committed. Strict removals commit only once the
//! disposer succeeded; forced removals commit regardless.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{Key, Record};
use crate::dispose::DisposeError;
use crate::error::{RegistryError, SweepError};
use crate::registry::Registry;

impl Registry {
  // --- Single removal ---

  /// Removes `(T, tag)`, synchronously disposing its instance first.
  ///
  /// Fails with [`RegistryError::DependencyExists`] while anything depends on
  /// the record, and with [`RegistryError::AsyncDisposalRequired`] if the live
  /// instance has an async disposer. If the disposer fails, the record stays
  /// registered and the error is returned.
  ///
  /// Fenix records keep their slot: the instance is dropped and the next
  /// resolution rebuilds it.
  pub fn remove<T: ?Sized + Any>(&self, tag: Option<&str>) -> Result<(), RegistryError> {
    self.remove_key(&Key::new::<T>(tag))
  }

  pub fn remove_key(&self, key: &Key) -> Result<(), RegistryError> {
    let record = self.begin_removal(key)?;
    let outcome = match record.provider.alive() {
      Some(instance) => match record.disposal.run_sync(&instance) {
        Some(outcome) => outcome,
        None => {
          record.abort_retire();
          return Err(RegistryError::AsyncDisposalRequired {
            key: record.key.clone(),
          });
        }
      },
      None => Ok(()),
    };
    self.settle(&record, outcome, false)
  }

  /// Removes `(T, tag)`, awaiting its disposer. The removal is committed only
  /// after disposal succeeded; on failure the record stays registered.
  pub async fn remove_async<T: ?Sized + Any>(&self, tag: Option<&str>) -> Result<(), RegistryError> {
    self.remove_key_async(&Key::new::<T>(tag), false).await
  }

  /// Like [`Registry::remove_async`], but commits the removal even if the
  /// disposer fails. The failure is logged, not returned.
  pub async fn force_remove_async<T: ?Sized + Any>(&self, tag: Option<&str>) -> Result<(), RegistryError> {
    self.remove_key_async(&Key::new::<T>(tag), true).await
  }

  pub async fn remove_key_async(&self, key: &Key, force: bool) -> Result<(), RegistryError> {
    let record = self.begin_removal(key)?;
    let outcome = match record.provider.alive() {
      Some(instance) => record.disposal.run(instance).await,
      None => Ok(()),
    };
    self.settle(&record, outcome, force)
  }

  /// Phase one: validate and mark the record as retiring.
  fn begin_removal(&self, key: &Key) -> Result<Arc<Record>, RegistryError> {
    let graph = self.graph.lock();
    let record = self
      .slots
      .get(key)
      .map(|slot| slot.record.clone())
      .ok_or_else(|| RegistryError::NotRegistered { key: key.clone() })?;

    if graph.has_dependents(&record.key) {
      return Err(RegistryError::DependencyExists {
        key: record.key.clone(),
        dependents: graph.dependents_of(&record.key),
      });
    }
    if !record.begin_retire() {
      return Err(RegistryError::RemovalInProgress {
        key: record.key.clone(),
      });
    }
    Ok(record)
  }

  fn settle(&self, record: &Arc<Record>, outcome: Result<(), DisposeError>, force: bool) -> Result<(), RegistryError> {
    match outcome {
      Ok(()) => {
        self.commit_removal(record);
        Ok(())
      }
      Err(source) if force => {
        tracing::warn!(key = %record.key, error = %source, "disposal failed; removing anyway");
        self.commit_removal(record);
        Ok(())
      }
      Err(source) => {
        record.abort_retire();
        if self.config.debug {
          tracing::debug!(key = %record.key, error = %source, "disposal failed; registration kept");
        }
        Err(RegistryError::Dispose {
          key: record.key.clone(),
          source,
        })
      }
    }
  }

  /// Phase two: release outgoing edges and drop the slots, or, for fenix
  /// records, just the instance.
  fn commit_removal(&self, record: &Arc<Record>) {
    let fenix = record.provider.is_fenix();
    {
      let mut graph = self.graph.lock();
      graph.release(&record.key);
      if !fenix {
        self.slots.remove_if(&record.key, |_, slot| Arc::ptr_eq(&slot.record, record));
        if let Some(alias) = &record.alias {
          self.slots.remove_if(alias, |_, slot| Arc::ptr_eq(&slot.record, record));
        }
      }
    }

    if fenix {
      record.provider.retire();
      record.abort_retire();
    }
    if self.config.debug {
      tracing::debug!(key = %record.key, strategy = record.provider.strategy(), "removed");
    }
  }

  // --- Sweeps ---

  /// Removes every registration, dependents before their dependencies.
  ///
  /// Synchronous disposers run in order; a constructed record with an async
  /// disposer is still removed but reported as
  /// [`RegistryError::AsyncDisposalRequired`]. Records already being removed
  /// elsewhere are left to that removal and reported as
  /// [`RegistryError::RemovalInProgress`]. Failures never stop the sweep.
  /// Fenix records are cleared like everything else.
  pub fn remove_all(&self) -> Result<(), SweepError> {
    let (records, mut failures) = self.drain();
    for record in records {
      if let Some(instance) = record.provider.alive() {
        let failure = match record.disposal.run_sync(&instance) {
          Some(Ok(())) => None,
          Some(Err(source)) => Some(RegistryError::Dispose {
            key: record.key.clone(),
            source,
          }),
          None => Some(RegistryError::AsyncDisposalRequired {
            key: record.key.clone(),
          }),
        };
        if let Some(failure) = failure {
          tracing::warn!(key = %record.key, error = %failure, "sweep disposal failed");
          failures.push(failure);
        }
      }
      record.provider.retire();
    }
    SweepError::check(failures)
  }

  /// Removes every registration, awaiting async disposers one at a time in
  /// dependents-first order. Failures are collected and the sweep continues.
  pub async fn remove_all_async(&self) -> Result<(), SweepError> {
    let (records, mut failures) = self.drain();
    for record in records {
      if let Some(instance) = record.provider.alive() {
        if let Err(source) = record.disposal.run(instance).await {
          tracing::warn!(key = %record.key, error = %source, "sweep disposal failed");
          failures.push(RegistryError::Dispose {
            key: record.key.clone(),
            source,
          });
        }
      }
      record.provider.retire();
    }
    SweepError::check(failures)
  }

  /// Claims and unmaps every primary record, returning them in teardown order.
  ///
  /// Records that another removal has already claimed stay mapped for that
  /// removal to settle and come back as `RemovalInProgress` failures. They
  /// have no dependents, so every edge touches a claimed record and the whole
  /// graph can be cleared.
  fn drain(&self) -> (Vec<Arc<Record>>, Vec<RegistryError>) {
    let mut graph = self.graph.lock();
    let primaries: Vec<Arc<Record>> = self
      .slots
      .iter()
      .filter(|entry| !entry.value().is_alias())
      .map(|entry| entry.value().record.clone())
      .collect();

    let mut claimed: HashMap<Key, Arc<Record>> = HashMap::with_capacity(primaries.len());
    let mut busy = Vec::new();
    for record in primaries {
      if record.begin_retire() {
        claimed.insert(record.key.clone(), record);
      } else {
        tracing::warn!(key = %record.key, "sweep skipped a registration that is already being removed");
        busy.push(RegistryError::RemovalInProgress {
          key: record.key.clone(),
        });
      }
    }

    for record in claimed.values() {
      self.slots.remove_if(&record.key, |_, slot| Arc::ptr_eq(&slot.record, record));
      if let Some(alias) = &record.alias {
        self.slots.remove_if(alias, |_, slot| Arc::ptr_eq(&slot.record, record));
      }
    }
    let order = graph.teardown_order(claimed.keys().cloned().collect());
    graph.clear();
    drop(graph);

    if self.config.debug {
      tracing::debug!(count = claimed.len(), skipped = busy.len(), "sweeping registry");
    }
    let records = order
      .into_iter()
      .filter_map(|key| claimed.remove(&key))
      .collect();
    (records, busy)
  }
}
