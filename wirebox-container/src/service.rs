//! Service and implementation traits.
//!
//! Every sized `Send + Sync + 'static` type is a [`Service`]. Trait objects
//! opt in with [`service!`](crate::service!), and implementations declare the
//! services they can be used as with [`implements!`](crate::implements!).
//!
//! ```
//! use std::sync::Arc;
//! use wirebox_container::{implements, service};
//! use wirebox_container::service::Implements;
//!
//! trait Logger: Send + Sync {
//!     fn log(&self, msg: &str) -> String;
//! }
//! service!(dyn Logger);
//!
//! struct ConsoleLogger;
//! impl Logger for ConsoleLogger {
//!     fn log(&self, msg: &str) -> String { format!("[console] {msg}") }
//! }
//! implements!(ConsoleLogger => dyn Logger);
//!
//! let logger: Arc<dyn Logger> = Arc::new(ConsoleLogger).upcast();
//! assert_eq!(logger.log("hi"), "[console] hi");
//! ```

use std::any::Any;
use std::sync::Arc;

use crate::error::{Result, WireboxError};
use crate::generic::GenericService;
use crate::key::TypeInfo;

/// A resolved, type-erased instance. Always holds an `Arc<S>` for the
/// service type `S` it was produced for.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Converts an instance of an implementation into an instance of a service.
pub(crate) type Converter = Arc<dyn Fn(Instance) -> Result<Instance> + Send + Sync>;

/// A type that can be requested from the container.
pub trait Service: Send + Sync + 'static {
    /// Describes the generic shape of the service.
    ///
    /// Generic services override this to list their type arguments, the
    /// closed implementations known for them, and their variants.
    fn generic() -> Option<GenericService<Self>> {
        None
    }
}

impl<T: Send + Sync + 'static> Service for T {}

/// Declares that `Self` can be used as the service `S`.
pub trait Implements<S: ?Sized>: Send + Sync + 'static {
    fn upcast(self: Arc<Self>) -> Arc<S>;
}

impl<T: Send + Sync + 'static> Implements<T> for T {
    fn upcast(self: Arc<Self>) -> Arc<T> {
        self
    }
}

/// Implements [`Service`] with no generic shape for trait objects.
#[macro_export]
macro_rules! service {
    ($($service:ty),+ $(,)?) => {
        $(impl $crate::service::Service for $service {})+
    };
}

/// Implements [`Implements`] of one or more trait objects for a type.
#[macro_export]
macro_rules! implements {
    ($implementation:ty => $($service:ty),+ $(,)?) => {
        $(impl $crate::service::Implements<$service> for $implementation {
            fn upcast(self: ::std::sync::Arc<Self>) -> ::std::sync::Arc<$service> {
                self
            }
        })+
    };
}

pub(crate) fn into_instance<S: ?Sized + Service>(value: Arc<S>) -> Instance {
    Arc::new(value)
}

pub(crate) fn from_instance<S: ?Sized + Service>(instance: &Instance) -> Result<Arc<S>> {
    instance
        .downcast_ref::<Arc<S>>()
        .cloned()
        .ok_or_else(|| WireboxError::TypeMismatch {
            expected: TypeInfo::of::<S>(),
            context: "resolved instance holds a different type".into(),
        })
}

pub(crate) fn upcast_instance<S, I>(instance: Instance) -> Result<Instance>
where
    S: ?Sized + Service,
    I: Implements<S>,
{
    let implementation = from_instance::<I>(&instance)?;
    Ok(into_instance::<S>(<I as Implements<S>>::upcast(implementation)))
}

/// The converter from `I` instances to `S` instances, or `None` when the
/// implementation is the service itself.
pub(crate) fn converter<S, I>() -> Option<Converter>
where
    S: ?Sized + Service,
    I: Implements<S>,
{
    if TypeInfo::of::<S>() == TypeInfo::of::<I>() {
        None
    } else {
        Some(Arc::new(upcast_instance::<S, I>))
    }
}

/// Marker stored for an optional dependency that could not be resolved.
pub(crate) struct Absent;

pub(crate) fn is_absent(instance: &Instance) -> bool {
    instance.is::<Absent>()
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }
    crate::service!(dyn Greeter);

    struct English;
    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".into()
        }
    }
    crate::implements!(English => dyn Greeter);

    #[test]
    fn instance_round_trips_through_any() {
        let instance = into_instance::<dyn Greeter>(Arc::new(English));
        let greeter = from_instance::<dyn Greeter>(&instance).unwrap();
        assert_eq!(greeter.greet(), "hello");
    }

    #[test]
    fn wrong_type_is_a_mismatch() {
        let instance = into_instance::<String>(Arc::new("x".to_string()));
        let err = from_instance::<dyn Greeter>(&instance).err().unwrap();
        assert!(matches!(err, WireboxError::TypeMismatch { .. }));
    }

    #[test]
    fn upcast_converts_implementation_instances() {
        let instance = into_instance::<English>(Arc::new(English));
        let converted = upcast_instance::<dyn Greeter, English>(instance).unwrap();
        assert_eq!(from_instance::<dyn Greeter>(&converted).unwrap().greet(), "hello");
    }

    #[test]
    fn identity_needs_no_converter() {
        assert!(converter::<English, English>().is_none());
        assert!(converter::<dyn Greeter, English>().is_some());
    }

    #[test]
    fn absent_marker_is_detected() {
        let absent: Instance = Arc::new(Absent);
        assert!(is_absent(&absent));
        assert!(!is_absent(&into_instance::<u8>(Arc::new(1))));
    }
}
