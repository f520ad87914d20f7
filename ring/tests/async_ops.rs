use circus_ring::{async_trait, AsyncDisposable, Disposable, DisposeError, Key, Registry, RegistryError};
use futures_util::future::join_all;
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

// --- Test Fixtures ---

struct Database {
  generation: usize,
}

struct Connection {
  closed: Arc<AtomicUsize>,
  fail: bool,
}

#[async_trait]
impl AsyncDisposable for Connection {
  async fn dispose(&self) -> Result<(), DisposeError> {
    tokio::time::sleep(Duration::from_millis(5)).await;
    if self.fail {
      return Err("connection reset by peer".into());
    }
    self.closed.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }
}

struct Cache {
  flushed: Arc<AtomicUsize>,
}

impl Disposable for Cache {
  fn dispose(&self) -> Result<(), DisposeError> {
    self.flushed.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }
}

fn connection(closed: &Arc<AtomicUsize>, fail: bool) -> Connection {
  Connection {
    closed: closed.clone(),
    fail,
  }
}

// --- Async Resolution ---

#[tokio::test]
async fn test_concurrent_async_resolution_runs_factory_once() {
  // Arrange
  let ring = Registry::new();
  let builds = Arc::new(AtomicUsize::new(0));
  let counter = builds.clone();
  ring
    .register_lazy_async(move || {
      let counter = counter.clone();
      async move {
        let generation = counter.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Database { generation }
      }
    })
    .commit()
    .unwrap();

  // Act: ten resolutions polled concurrently on one task.
  let results = join_all((0..10).map(|_| ring.resolve_async::<Database>(None))).await;

  // Assert
  let instances: Vec<Arc<Database>> = results.into_iter().map(Result::unwrap).collect();
  assert_eq!(builds.load(Ordering::SeqCst), 1);
  assert!(instances.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
  assert_eq!(instances[0].generation, 0);
  assert!(ring.is_constructed(&Key::of::<Database>()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_async_single_flight_across_tasks() {
  // Arrange
  let ring = Arc::new(Registry::new());
  let builds = Arc::new(AtomicUsize::new(0));
  let counter = builds.clone();
  ring
    .register_lazy_async(move || {
      let counter = counter.clone();
      async move {
        counter.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        Database { generation: 0 }
      }
    })
    .tag("shared")
    .commit()
    .unwrap();

  // Act
  let handles: Vec<_> = (0..16)
    .map(|_| {
      let ring = ring.clone();
      tokio::spawn(async move { ring.resolve_async::<Database>(Some("shared")).await })
    })
    .collect();
  let mut instances = Vec::new();
  for handle in handles {
    instances.push(handle.await.unwrap().unwrap());
  }

  // Assert
  assert_eq!(builds.load(Ordering::SeqCst), 1);
  assert!(instances.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
}

#[tokio::test]
async fn test_resolve_async_serves_sync_records_immediately() {
  let ring = Registry::new();
  ring.register_instance(3u8).commit().unwrap();
  ring.register_lazy(|| String::from("lazy")).commit().unwrap();

  assert_eq!(*ring.resolve_async::<u8>(None).await.unwrap(), 3);
  assert_eq!(*ring.resolve_async::<String>(None).await.unwrap(), "lazy");
  assert!(ring.try_resolve_async::<u16>(None).await.unwrap().is_none());
}

#[tokio::test]
async fn test_async_record_becomes_removable_after_construction() {
  let ring = Registry::new();
  ring
    .register_lazy_async(|| async { Database { generation: 9 } })
    .commit()
    .unwrap();

  let db = ring.resolve_async::<Database>(None).await.unwrap();
  assert_eq!(db.generation, 9);
  // Sync resolution stays rejected even once the value exists.
  assert!(matches!(
    ring.resolve::<Database>(None),
    Err(RegistryError::AsyncRecord { .. })
  ));

  ring.remove_async::<Database>(None).await.unwrap();
  assert!(!ring.is_registered::<Database>(None));
}

// --- Async Removal ---

#[tokio::test]
async fn test_remove_async_awaits_disposer() {
  // Arrange
  let ring = Registry::new();
  let closed = Arc::new(AtomicUsize::new(0));
  ring
    .register_instance(connection(&closed, false))
    .async_disposable()
    .commit()
    .unwrap();

  // Act
  ring.remove_async::<Connection>(None).await.unwrap();

  // Assert
  assert_eq!(closed.load(Ordering::SeqCst), 1);
  assert!(!ring.is_registered::<Connection>(None));
}

#[tokio::test]
async fn test_sync_remove_refuses_async_disposer() {
  let ring = Registry::new();
  let closed = Arc::new(AtomicUsize::new(0));
  ring
    .register_instance(connection(&closed, false))
    .async_disposable()
    .commit()
    .unwrap();

  assert!(matches!(
    ring.remove::<Connection>(None),
    Err(RegistryError::AsyncDisposalRequired { .. })
  ));
  // The refused removal left the record fully usable.
  assert!(ring.resolve::<Connection>(None).is_ok());
  ring.remove_async::<Connection>(None).await.unwrap();
  assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_strict_async_removal_keeps_record_on_failure() {
  let ring = Registry::new();
  let closed = Arc::new(AtomicUsize::new(0));
  ring
    .register_instance(connection(&closed, true))
    .async_disposable()
    .commit()
    .unwrap();

  let err = ring.remove_async::<Connection>(None).await.unwrap_err();

  assert!(matches!(err, RegistryError::Dispose { .. }));
  assert!(ring.is_registered::<Connection>(None));
  // Not stuck in a half-removed state: it can be tried again.
  assert!(matches!(
    ring.remove_async::<Connection>(None).await,
    Err(RegistryError::Dispose { .. })
  ));
}

#[tokio::test]
async fn test_forced_async_removal_commits_on_failure() {
  let ring = Registry::new();
  let closed = Arc::new(AtomicUsize::new(0));
  ring
    .register_instance(connection(&closed, true))
    .async_disposable()
    .commit()
    .unwrap();

  ring.force_remove_async::<Connection>(None).await.unwrap();

  assert!(!ring.is_registered::<Connection>(None));
}

#[tokio::test]
async fn test_remove_all_async_continues_past_failures() {
  // Arrange: one failing and two succeeding async disposers, plus a sync one.
  let ring = Registry::new();
  let closed = Arc::new(AtomicUsize::new(0));
  let flushed = Arc::new(AtomicUsize::new(0));
  for (tag, fail) in [("primary", false), ("replica", true), ("audit", false)] {
    ring
      .register_instance(connection(&closed, fail))
      .tag(tag)
      .async_disposable()
      .commit()
      .unwrap();
  }
  ring
    .register_instance(Cache {
      flushed: flushed.clone(),
    })
    .disposable()
    .commit()
    .unwrap();

  // Act
  let sweep = ring.remove_all_async().await;

  // Assert
  let failures = sweep.unwrap_err().into_failures();
  assert_eq!(failures.len(), 1);
  assert_eq!(failures[0].key(), Some(&Key::tagged::<Connection>("replica")));
  assert_eq!(closed.load(Ordering::SeqCst), 2);
  assert_eq!(flushed.load(Ordering::SeqCst), 1);
  assert!(ring.is_empty());
}

#[tokio::test]
async fn test_sync_sweep_reports_async_disposers() {
  let ring = Registry::new();
  let closed = Arc::new(AtomicUsize::new(0));
  ring
    .register_instance(connection(&closed, false))
    .async_disposable()
    .commit()
    .unwrap();

  let failures = ring.remove_all().unwrap_err().into_failures();

  assert!(matches!(failures[0], RegistryError::AsyncDisposalRequired { .. }));
  assert!(ring.is_empty());
  assert_eq!(closed.load(Ordering::SeqCst), 0);
}

// --- Concurrent Removal ---

/// Holds a disposer open until the test releases it.
#[derive(Clone, Default)]
struct Latch {
  entered: Arc<Notify>,
  release: Arc<Notify>,
  disposals: Arc<AtomicUsize>,
}

struct Socket {
  latch: Latch,
  generation: usize,
}

#[async_trait]
impl AsyncDisposable for Socket {
  async fn dispose(&self) -> Result<(), DisposeError> {
    self.latch.entered.notify_one();
    self.latch.release.notified().await;
    self.latch.disposals.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }
}

fn register_socket(ring: &Registry, latch: &Latch) {
  ring
    .register_instance(Socket {
      latch: latch.clone(),
      generation: 0,
    })
    .async_disposable()
    .commit()
    .unwrap();
}

/// Starts removing the socket and returns once its disposer is running.
async fn removal_in_flight(ring: &Arc<Registry>, latch: &Latch) -> JoinHandle<Result<(), RegistryError>> {
  let removal = tokio::spawn({
    let ring = ring.clone();
    async move { ring.remove_async::<Socket>(None).await }
  });
  latch.entered.notified().await;
  removal
}

#[tokio::test]
async fn test_sweep_skips_record_already_being_removed() {
  // Arrange
  let ring = Arc::new(Registry::new());
  let latch = Latch::default();
  let flushed = Arc::new(AtomicUsize::new(0));
  register_socket(&ring, &latch);
  ring
    .register_instance(Cache {
      flushed: flushed.clone(),
    })
    .disposable()
    .commit()
    .unwrap();
  let removal = removal_in_flight(&ring, &latch).await;

  // Act
  let sweep = ring.remove_all_async().await;

  // Assert
  let failures = sweep.unwrap_err().into_failures();
  assert_eq!(failures.len(), 1);
  assert!(matches!(
    &failures[0],
    RegistryError::RemovalInProgress { key } if *key == Key::of::<Socket>()
  ));
  assert_eq!(flushed.load(Ordering::SeqCst), 1);
  assert!(ring.contains(&Key::of::<Socket>()));

  latch.release.notify_one();
  removal.await.unwrap().unwrap();
  assert_eq!(latch.disposals.load(Ordering::SeqCst), 1);
  assert!(ring.is_empty());
}

#[tokio::test]
async fn test_sync_sweep_skips_record_already_being_removed() {
  let ring = Arc::new(Registry::new());
  let latch = Latch::default();
  register_socket(&ring, &latch);
  let removal = removal_in_flight(&ring, &latch).await;

  let failures = ring.remove_all().unwrap_err().into_failures();

  assert!(matches!(failures[0], RegistryError::RemovalInProgress { .. }));
  latch.release.notify_one();
  removal.await.unwrap().unwrap();
  assert_eq!(latch.disposals.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_resolution_is_refused_while_disposing() {
  // Arrange
  let ring = Arc::new(Registry::new());
  let latch = Latch::default();
  register_socket(&ring, &latch);
  let removal = removal_in_flight(&ring, &latch).await;

  // Act & Assert: none of the lookups hand out the instance being disposed.
  assert!(matches!(
    ring.resolve::<Socket>(None),
    Err(RegistryError::RemovalInProgress { .. })
  ));
  assert!(matches!(
    ring.try_resolve::<Socket>(None),
    Err(RegistryError::RemovalInProgress { .. })
  ));
  assert!(matches!(
    ring.resolve_async::<Socket>(None).await,
    Err(RegistryError::RemovalInProgress { .. })
  ));
  assert!(matches!(
    ring.try_resolve_async::<Socket>(None).await,
    Err(RegistryError::RemovalInProgress { .. })
  ));

  latch.release.notify_one();
  removal.await.unwrap().unwrap();
  assert!(ring.try_resolve::<Socket>(None).unwrap().is_none());
}

#[tokio::test]
async fn test_fenix_record_is_unavailable_until_disposal_finishes() {
  // Arrange
  let ring = Arc::new(Registry::new());
  let latch = Latch::default();
  let builds = Arc::new(AtomicUsize::new(0));
  ring
    .register_lazy({
      let (latch, builds) = (latch.clone(), builds.clone());
      move || Socket {
        latch: latch.clone(),
        generation: builds.fetch_add(1, Ordering::SeqCst),
      }
    })
    .fenix()
    .async_disposable()
    .commit()
    .unwrap();
  let first = ring.resolve::<Socket>(None).unwrap();
  let removal = removal_in_flight(&ring, &latch).await;

  // Act
  let during = ring.resolve::<Socket>(None);
  latch.release.notify_one();
  removal.await.unwrap().unwrap();
  let after = ring.resolve::<Socket>(None).unwrap();

  // Assert
  assert!(matches!(during, Err(RegistryError::RemovalInProgress { .. })));
  assert_eq!((first.generation, after.generation), (0, 1));
  assert_eq!(latch.disposals.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_second_removal_is_refused_while_first_is_disposing() {
  let ring = Arc::new(Registry::new());
  let latch = Latch::default();
  register_socket(&ring, &latch);
  let removal = removal_in_flight(&ring, &latch).await;

  assert!(matches!(
    ring.remove_async::<Socket>(None).await,
    Err(RegistryError::RemovalInProgress { .. })
  ));
  assert!(matches!(
    ring.remove::<Socket>(None),
    Err(RegistryError::RemovalInProgress { .. })
  ));

  latch.release.notify_one();
  removal.await.unwrap().unwrap();
  assert_eq!(latch.disposals.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_bind_dependency_refuses_record_being_removed() {
  struct Consumer;

  let ring = Arc::new(Registry::new());
  let latch = Latch::default();
  register_socket(&ring, &latch);
  let consumer = ring
    .register_instance(Consumer)
    .commit()
    .map(|_| Key::of::<Consumer>())
    .unwrap();
  let removal = removal_in_flight(&ring, &latch).await;

  assert!(matches!(
    ring.bind_dependency(&consumer, &Key::of::<Socket>()),
    Err(RegistryError::RemovalInProgress { .. })
  ));
  assert!(matches!(
    ring.bind_dependency(&Key::of::<Socket>(), &consumer),
    Err(RegistryError::RemovalInProgress { .. })
  ));

  latch.release.notify_one();
  removal.await.unwrap().unwrap();
  assert!(ring.dependents_of(&consumer).is_empty());
  ring.remove::<Consumer>(None).unwrap();
}

#[tokio::test]
async fn test_replace_refuses_record_being_removed() {
  let ring = Arc::new(Registry::new());
  let latch = Latch::default();
  register_socket(&ring, &latch);
  let removal = removal_in_flight(&ring, &latch).await;

  let replacement = ring
    .register_instance(Socket {
      latch: Latch::default(),
      generation: 1,
    })
    .replace()
    .commit();

  assert!(matches!(
    replacement,
    Err(RegistryError::RemovalInProgress { .. })
  ));
  latch.release.notify_one();
  removal.await.unwrap().unwrap();
  assert!(!ring.is_registered::<Socket>(None));

  ring
    .register_instance(Socket {
      latch: Latch::default(),
      generation: 2,
    })
    .commit()
    .unwrap();
  assert_eq!(ring.resolve::<Socket>(None).unwrap().generation, 2);
}
