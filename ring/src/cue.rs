//! `CueMaster`: a typed publish/subscribe bus.
//!
//! Events are dispatched by their concrete type. The bus is usually registered
//! in a [`Registry`](crate::Registry) under a tag and torn down with it.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::dispose::{Disposable, DisposeError};

/// A subscription handle returned by [`CueMaster::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cue {
  event: TypeId,
  id: u64,
}

type Handler = Arc<dyn Fn(&dyn Any) + Send + Sync>;

#[derive(Default)]
pub struct CueMaster {
  handlers: Mutex<HashMap<TypeId, Vec<(u64, Handler)>>>,
  next_id: AtomicU64,
  disposed: AtomicBool,
}

impl CueMaster {
  pub fn new() -> Self {
    Self::default()
  }

  /// Subscribes `handler` to events of type `E`.
  ///
  /// Subscribing to a disposed bus returns a handle that never fires.
  pub fn on<E: Any>(&self, handler: impl Fn(&E) + Send + Sync + 'static) -> Cue {
    let cue = Cue {
      event: TypeId::of::<E>(),
      id: self.next_id.fetch_add(1, Ordering::Relaxed),
    };
    if self.disposed.load(Ordering::Acquire) {
      return cue;
    }
    let handler: Handler = Arc::new(move |event: &dyn Any| {
      if let Some(event) = event.downcast_ref::<E>() {
        handler(event);
      }
    });
    self
      .handlers
      .lock()
      .entry(cue.event)
      .or_default()
      .push((cue.id, handler));
    cue
  }

  /// Cancels a subscription. Returns `false` if it was not active.
  pub fn off(&self, cue: &Cue) -> bool {
    let mut handlers = self.handlers.lock();
    let Some(list) = handlers.get_mut(&cue.event) else {
      return false;
    };
    let before = list.len();
    list.retain(|(id, _)| *id != cue.id);
    let removed = list.len() != before;
    if list.is_empty() {
      handlers.remove(&cue.event);
    }
    removed
  }

  /// Delivers `event` to every subscriber of `E`. Returns how many were called.
  pub fn send<E: Any>(&self, event: &E) -> usize {
    let targets: Vec<Handler> = match self.handlers.lock().get(&TypeId::of::<E>()) {
      Some(list) => list.iter().map(|(_, handler)| handler.clone()).collect(),
      None => return 0,
    };
    for handler in &targets {
      handler(event);
    }
    targets.len()
  }

  pub fn has_listeners<E: Any>(&self) -> bool {
    self.listener_count::<E>() > 0
  }

  pub fn listener_count<E: Any>(&self) -> usize {
    self
      .handlers
      .lock()
      .get(&TypeId::of::<E>())
      .map_or(0, Vec::len)
  }

  pub fn is_disposed(&self) -> bool {
    self.disposed.load(Ordering::Acquire)
  }
}

impl Disposable for CueMaster {
  /// Drops every subscription; later subscriptions are ignored.
  fn dispose(&self) -> Result<(), DisposeError> {
    self.disposed.store(true, Ordering::Release);
    self.handlers.lock().clear();
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicUsize;

  struct Clicked(usize);
  struct Closed;

  #[test]
  fn events_reach_only_subscribers_of_their_type() {
    let bus = CueMaster::new();
    let total = Arc::new(AtomicUsize::new(0));
    let sink = total.clone();
    bus.on::<Clicked>(move |event| {
      sink.fetch_add(event.0, Ordering::SeqCst);
    });

    assert_eq!(bus.send(&Clicked(3)), 1);
    assert_eq!(bus.send(&Closed), 0);
    assert_eq!(total.load(Ordering::SeqCst), 3);
    assert!(bus.has_listeners::<Clicked>());
    assert!(!bus.has_listeners::<Closed>());
  }

  #[test]
  fn off_cancels_a_single_subscription() {
    let bus = CueMaster::new();
    let first = bus.on::<Closed>(|_| {});
    let _second = bus.on::<Closed>(|_| {});

    assert!(bus.off(&first));
    assert!(!bus.off(&first));
    assert_eq!(bus.listener_count::<Closed>(), 1);
    assert_eq!(bus.send(&Closed), 1);
  }

  #[test]
  fn dispose_drops_subscriptions() {
    let bus = CueMaster::new();
    bus.on::<Closed>(|_| {});
    Disposable::dispose(&bus).unwrap();

    assert!(bus.is_disposed());
    assert_eq!(bus.send(&Closed), 0);
    bus.on::<Closed>(|_| {});
    assert!(!bus.has_listeners::<Closed>());
  }
}
