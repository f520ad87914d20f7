//! Public macros for ergonomic service resolution.

/// Resolves a service from the given registry, panicking if it is missing.
///
/// Accepts a concrete type or `trait Name`, each optionally followed by a tag.
///
/// # Panics
///
/// Panics if the service cannot be resolved. Use [`maybe_resolve_from!`] for a
/// non-panicking version.
#[macro_export]
macro_rules! resolve_from {
  ($registry:expr, trait $trait_ident:ident) => {
    match $registry.resolve::<dyn $trait_ident>(None) {
      Ok(service) => service,
      Err(err) => panic!(
        "Failed to resolve required trait service {}: {}",
        std::any::type_name::<dyn $trait_ident>(),
        err
      ),
    }
  };

  ($registry:expr, trait $trait_ident:ident, $tag:expr) => {
    match $registry.resolve::<dyn $trait_ident>(Some($tag)) {
      Ok(service) => service,
      Err(err) => panic!(
        "Failed to resolve required trait service with tag '{}': {}",
        $tag, err
      ),
    }
  };

  ($registry:expr, $type:ty) => {
    match $registry.resolve::<$type>(None) {
      Ok(service) => service,
      Err(err) => panic!(
        "Failed to resolve required service {}: {}",
        std::any::type_name::<$type>(),
        err
      ),
    }
  };

  ($registry:expr, $type:ty, $tag:expr) => {
    match $registry.resolve::<$type>(Some($tag)) {
      Ok(service) => service,
      Err(err) => panic!(
        "Failed to resolve required service with tag '{}': {}",
        $tag, err
      ),
    }
  };
}

/// Resolves a service from the given registry, returning `None` if it is not
/// registered.
///
/// # Panics
///
/// Still panics on errors other than a missing registration, such as resolving
/// an async record synchronously.
#[macro_export]
macro_rules! maybe_resolve_from {
  (@unwrap $result:expr) => {
    match $result {
      Ok(service) => service,
      Err(err) => panic!("Failed to resolve service: {}", err),
    }
  };

  ($registry:expr, trait $trait_ident:ident) => {
    $crate::maybe_resolve_from!(@unwrap $registry.try_resolve::<dyn $trait_ident>(None))
  };

  ($registry:expr, trait $trait_ident:ident, $tag:expr) => {
    $crate::maybe_resolve_from!(@unwrap $registry.try_resolve::<dyn $trait_ident>(Some($tag)))
  };

  ($registry:expr, $type:ty) => {
    $crate::maybe_resolve_from!(@unwrap $registry.try_resolve::<$type>(None))
  };

  ($registry:expr, $type:ty, $tag:expr) => {
    $crate::maybe_resolve_from!(@unwrap $registry.try_resolve::<$type>(Some($tag)))
  };
}

/// Resolves a service from the global registry, panicking if it is missing.
///
/// # Examples
///
/// ```
/// use circus_ring::{global, resolve};
/// use std::sync::Arc;
///
/// global().register_lazy(|| String::from("hello")).tag("doc_resolve").commit().unwrap();
/// let message = resolve!(String, "doc_resolve");
/// assert_eq!(*message, "hello");
///
/// trait Greeter: Send + Sync { fn greet(&self) -> String; }
/// struct EnglishGreeter;
/// impl Greeter for EnglishGreeter { fn greet(&self) -> String { "Hello!".to_string() } }
///
/// global()
///   .register_lazy_arc::<dyn Greeter, _>(|| Arc::new(EnglishGreeter))
///   .commit()
///   .unwrap();
/// let greeter = resolve!(trait Greeter);
/// assert_eq!(greeter.greet(), "Hello!");
/// ```
#[macro_export]
macro_rules! resolve {
  (trait $trait_ident:ident) => {
    $crate::resolve_from!($crate::global(), trait $trait_ident)
  };
  (trait $trait_ident:ident, $tag:expr) => {
    $crate::resolve_from!($crate::global(), trait $trait_ident, $tag)
  };
  ($type:ty) => {
    $crate::resolve_from!($crate::global(), $type)
  };
  ($type:ty, $tag:expr) => {
    $crate::resolve_from!($crate::global(), $type, $tag)
  };
}

/// Resolves a service from the global registry, returning `None` if it is not
/// registered.
#[macro_export]
macro_rules! maybe_resolve {
  (trait $trait_ident:ident) => {
    $crate::maybe_resolve_from!($crate::global(), trait $trait_ident)
  };
  (trait $trait_ident:ident, $tag:expr) => {
    $crate::maybe_resolve_from!($crate::global(), trait $trait_ident, $tag)
  };
  ($type:ty) => {
    $crate::maybe_resolve_from!($crate::global(), $type)
  };
  ($type:ty, $tag:expr) => {
    $crate::maybe_resolve_from!($crate::global(), $type, $tag)
  };
}
