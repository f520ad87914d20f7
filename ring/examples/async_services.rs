use circus_ring::{async_trait, AsyncDisposable, DisposeError, Registry};
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use tokio::time::{sleep, Duration};

struct ConnectionPool {
  size: usize,
}

#[async_trait]
impl AsyncDisposable for ConnectionPool {
  async fn dispose(&self) -> Result<(), DisposeError> {
    println!("--- Pool: draining {} connections...", self.size);
    sleep(Duration::from_millis(100)).await;
    println!("--- Pool: closed.");
    Ok(())
  }
}

#[tokio::main]
async fn main() {
  let ring = Arc::new(Registry::new());
  let builds = Arc::new(AtomicUsize::new(0));

  ring
    .register_lazy_async({
      let builds = builds.clone();
      move || {
        let builds = builds.clone();
        async move {
          println!("--- Pool: connecting (slow)...");
          builds.fetch_add(1, Ordering::SeqCst);
          sleep(Duration::from_millis(300)).await;
          ConnectionPool { size: 8 }
        }
      }
    })
    .async_disposable()
    .commit()
    .unwrap();

  println!("--- Thundering Herd Demonstration ---");
  println!("Spawning 10 tasks to resolve the pool at once.\n");

  let mut tasks = Vec::new();
  for i in 0..10 {
    let ring = ring.clone();
    tasks.push(tokio::spawn(async move {
      let pool = ring.resolve_async::<ConnectionPool>(None).await.unwrap();
      println!("[Task {}] Got pool with {} connections", i, pool.size);
    }));
  }
  for task in tasks {
    task.await.unwrap();
  }

  println!("\n--- Verification ---");
  println!("Pool was built {} time(s).", builds.load(Ordering::SeqCst));
  assert_eq!(builds.load(Ordering::SeqCst), 1);

  println!("\n--- Async Removal ---");
  ring.remove_async::<ConnectionPool>(None).await.unwrap();
  println!("Pool registered: {}", ring.is_registered::<ConnectionPool>(None));
}
