use circus_ring::{Disposable, DisposeError, Key, Registry};
use std::sync::Arc;

struct Logger;
impl Disposable for Logger {
  fn dispose(&self) -> Result<(), DisposeError> {
    println!("Logger: flushing and closing.");
    Ok(())
  }
}

struct Repository {
  logger: Arc<Logger>,
}
impl Disposable for Repository {
  fn dispose(&self) -> Result<(), DisposeError> {
    println!("Repository: closing connections.");
    Ok(())
  }
}

// A self-healing session: removal disposes it, the next resolution rebuilds it.
struct Session {
  generation: u32,
}
impl Disposable for Session {
  fn dispose(&self) -> Result<(), DisposeError> {
    println!("Session #{}: disposed.", self.generation);
    Ok(())
  }
}

fn main() {
  let ring = Arc::new(Registry::new());

  ring.register_instance(Logger).disposable().commit().unwrap();
  let lookup = ring.clone();
  let repo = ring
    .register_lazy(move || Repository {
      logger: lookup.resolve::<Logger>(None).unwrap(),
    })
    .disposable()
    .commit()
    .unwrap();
  ring.bind_dependency(&repo, &Key::of::<Logger>()).unwrap();

  let repository = ring.resolve::<Repository>(None).unwrap();
  assert!(Arc::ptr_eq(&repository.logger, &ring.resolve::<Logger>(None).unwrap()));

  println!("--- Dependency-Bound Removal ---");
  match ring.remove::<Logger>(None) {
    Err(err) => println!("Removing the logger first fails: {}", err),
    Ok(()) => unreachable!("the repository still depends on the logger"),
  }
  ring.remove::<Repository>(None).unwrap();
  ring.remove::<Logger>(None).unwrap();
  println!("Removed repository, then logger.\n");

  println!("--- Fenix Registration ---");
  let generation = std::sync::atomic::AtomicU32::new(1);
  ring
    .register_lazy(move || Session {
      generation: generation.fetch_add(1, std::sync::atomic::Ordering::SeqCst),
    })
    .fenix()
    .disposable()
    .commit()
    .unwrap();
  println!("Resolved session #{}", ring.resolve::<Session>(None).unwrap().generation);
  ring.remove::<Session>(None).unwrap();
  println!("Still registered after removal: {}", ring.is_registered::<Session>(None));
  println!("Resolved session #{}", ring.resolve::<Session>(None).unwrap().generation);

  println!("\n--- Sweep ---");
  ring.remove_all().unwrap();
  println!("Registry empty: {}", ring.is_empty());
}
