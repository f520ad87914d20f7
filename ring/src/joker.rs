//! `Joker`: a value holder that notifies listeners when it changes.
//!
//! Jokers are registered in a [`Registry`](crate::Registry) like any other
//! service, usually with `.disposable()` so that removing them drops their
//! listeners.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::dispose::{Disposable, DisposeError};

/// Handle returned by [`Joker::listen`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct JokerState<T> {
  value: T,
  listeners: Vec<(ListenerId, Listener<T>)>,
  disposed: bool,
}

/// A reactive value container.
///
/// Listeners run on the thread that changed the value, after the internal
/// lock has been released, so a listener may read the joker again.
pub struct Joker<T> {
  state: Mutex<JokerState<T>>,
  next_id: AtomicU64,
}

impl<T: Clone + Send + Sync + 'static> Joker<T> {
  pub fn new(value: T) -> Self {
    Self {
      state: Mutex::new(JokerState {
        value,
        listeners: Vec::new(),
        disposed: false,
      }),
      next_id: AtomicU64::new(0),
    }
  }

  pub fn get(&self) -> T {
    self.state.lock().value.clone()
  }

  /// Replaces the value and notifies listeners. Returns `false` once disposed.
  pub fn set(&self, value: T) -> bool {
    self.update(|current| *current = value)
  }

  /// Mutates the value in place and notifies listeners.
  pub fn update(&self, change: impl FnOnce(&mut T)) -> bool {
    let (value, listeners) = {
      let mut state = self.state.lock();
      if state.disposed {
        return false;
      }
      change(&mut state.value);
      (state.value.clone(), snapshot(&state.listeners))
    };
    for listener in listeners {
      listener(&value);
    }
    true
  }

  /// Replaces the value without notifying anyone.
  pub fn set_quietly(&self, value: T) -> bool {
    let mut state = self.state.lock();
    if state.disposed {
      return false;
    }
    state.value = value;
    true
  }

  /// Notifies listeners with the current value.
  pub fn notify(&self) {
    let (value, listeners) = {
      let state = self.state.lock();
      (state.value.clone(), snapshot(&state.listeners))
    };
    for listener in listeners {
      listener(&value);
    }
  }

  pub fn listen(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> ListenerId {
    let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
    let mut state = self.state.lock();
    if !state.disposed {
      state.listeners.push((id, Arc::new(listener)));
    }
    id
  }

  /// Removes a listener. Returns `false` if it was not attached.
  pub fn unlisten(&self, id: ListenerId) -> bool {
    let mut state = self.state.lock();
    let before = state.listeners.len();
    state.listeners.retain(|(listener_id, _)| *listener_id != id);
    state.listeners.len() != before
  }

  pub fn listener_count(&self) -> usize {
    self.state.lock().listeners.len()
  }

  pub fn is_disposed(&self) -> bool {
    self.state.lock().disposed
  }
}

impl<T: Clone + Send + Sync + 'static> Disposable for Joker<T> {
  /// Drops every listener and freezes the value.
  fn dispose(&self) -> Result<(), DisposeError> {
    let mut state = self.state.lock();
    state.disposed = true;
    state.listeners.clear();
    Ok(())
  }
}

fn snapshot<T>(listeners: &[(ListenerId, Listener<T>)]) -> Vec<Listener<T>> {
  listeners.iter().map(|(_, listener)| listener.clone()).collect()
}
