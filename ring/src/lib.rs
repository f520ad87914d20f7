//! # Circus Ring
//!
//! A tagged, thread-safe service registry with lifecycle management.
//!
//! Services are stored under a [`Key`], a type plus an optional tag, using one
//! of several strategies:
//!
//! - **Instance**: an already constructed singleton.
//! - **Lazy**: a singleton built on first resolution. A *fenix* lazy singleton
//!   survives removal: its instance is disposed and rebuilt on next access.
//! - **Lazy async**: a singleton built by an async factory. Concurrent
//!   resolutions share a single construction.
//! - **Factory**: a fresh instance on every resolution.
//!
//! Registrations may depend on each other via [`Registry::bind_dependency`]; a
//! registration that something depends on cannot be removed. Removal runs the
//! disposer chosen at registration time ([`Disposable`] or [`AsyncDisposable`]).
//!
//! ## Quick Start
//!
//! ```
//! use circus_ring::{Disposable, DisposeError, Key, Registry, RegistryError};
//! use std::sync::Arc;
//!
//! struct Logger;
//! impl Disposable for Logger {
//!   fn dispose(&self) -> Result<(), DisposeError> {
//!     Ok(())
//!   }
//! }
//!
//! struct Repo {
//!   logger: Arc<Logger>,
//! }
//!
//! fn main() -> Result<(), RegistryError> {
//!   let ring = Arc::new(Registry::new());
//!
//!   let logger = ring.register_instance(Logger).disposable().commit()?;
//!
//!   let lookup = ring.clone();
//!   let repo = ring
//!     .register_lazy(move || Repo {
//!       logger: lookup.resolve::<Logger>(None).unwrap(),
//!     })
//!     .commit()?;
//!   ring.bind_dependency(&repo, &Key::of::<Logger>())?;
//!
//!   assert!(Arc::ptr_eq(&ring.resolve::<Repo>(None)?.logger, &logger));
//!
//!   // The logger is protected until the repo is gone.
//!   assert!(ring.remove::<Logger>(None).is_err());
//!   ring.remove::<Repo>(None)?;
//!   ring.remove::<Logger>(None)?;
//!   Ok(())
//! }
//! ```

mod config;
mod core;
pub mod cue;
mod dispose;
mod error;
mod global;
mod graph;
pub mod joker;
mod macros;
mod register;
mod registry;
mod removal;

pub use crate::core::Key;
pub use config::RingConfig;
pub use cue::{Cue, CueMaster};
pub use dispose::{AsyncDisposable, Disposable, DisposeError};
pub use error::{RegistryError, SweepError};
pub use global::global;
pub use joker::{Joker, ListenerId};
pub use register::{Eager, Lazy, LazyAsync, Register, Transient};
pub use registry::{Registry, Service};

pub use async_trait::async_trait;
