//! Collections of services.
//!
//! [`AllInstances<S>`] is a lazy, restartable sequence: every iteration
//! creates (or fetches, per lifestyle) each element again through its own
//! producer's factory.

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use crate::container::{Container, ContainerInner};
use crate::error::{Result, WireboxError};
use crate::expression::Factory;
use crate::key::TypeInfo;
use crate::registry::ResolveContext;
use crate::scope::Scope;
use crate::service::{Instance, Service, from_instance, into_instance};

/// Every registered instance of `S`, in registration order.
pub struct AllInstances<S: ?Sized> {
    factories: Arc<[Factory]>,
    container: Weak<ContainerInner>,
    scope: Option<Arc<Scope>>,
    _service: PhantomData<fn() -> Arc<S>>,
}

impl<S: ?Sized + Service> AllInstances<S> {
    #[inline]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Creates the element at `index`, or `None` if out of range.
    pub fn get(&self, index: usize) -> Option<Result<Arc<S>>> {
        let factory = self.factories.get(index)?;
        Some(self.create(factory))
    }

    /// Iterates the elements, creating each on demand.
    pub fn iter(&self) -> impl Iterator<Item = Result<Arc<S>>> + '_ {
        self.factories.iter().map(|factory| self.create(factory))
    }

    /// Creates every element, stopping at the first failure.
    pub fn to_vec(&self) -> Result<Vec<Arc<S>>> {
        self.iter().collect()
    }

    fn create(&self, factory: &Factory) -> Result<Arc<S>> {
        let container = self
            .container
            .upgrade()
            .map(Container::from_inner)
            .ok_or(WireboxError::ContainerDisposed {
                service: TypeInfo::of::<S>(),
            })?;
        let ctx = ResolveContext::new(&container, self.scope.as_ref());
        from_instance::<S>(&factory(&ctx)?)
    }
}

impl<S: ?Sized> Clone for AllInstances<S> {
    fn clone(&self) -> Self {
        Self {
            factories: self.factories.clone(),
            container: self.container.clone(),
            scope: self.scope.clone(),
            _service: PhantomData,
        }
    }
}

impl<S: ?Sized> fmt::Debug for AllInstances<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllInstances")
            .field("service", &std::any::type_name::<S>())
            .field("len", &self.factories.len())
            .finish()
    }
}

/// Builds the instance resolved for a collection of `S`.
pub(crate) fn assemble<S: ?Sized + Service>(
    factories: Vec<Factory>,
    container: Weak<ContainerInner>,
    scope: Option<Arc<Scope>>,
) -> Instance {
    into_instance::<AllInstances<S>>(Arc::new(AllInstances {
        factories: factories.into(),
        container,
        scope,
        _service: PhantomData,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::factory_fn;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn numbers(container: &Container, counter: Arc<AtomicUsize>) -> AllInstances<usize> {
        let factories: Vec<Factory> = (0..3)
            .map(|i| {
                let counter = counter.clone();
                factory_fn(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(into_instance::<usize>(Arc::new(i)))
                })
            })
            .collect();
        let instance = assemble::<usize>(factories, container.downgrade(), None);
        (*from_instance::<AllInstances<usize>>(&instance).unwrap()).clone()
    }

    #[test]
    fn elements_are_created_lazily() {
        let container = Container::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let all = numbers(&container, counter.clone());

        assert_eq!(all.len(), 3);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(*all.get(1).unwrap().unwrap(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(all.get(3).is_none());
    }

    #[test]
    fn iteration_restarts() {
        let container = Container::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let all = numbers(&container, counter.clone());

        let first: Vec<usize> = all.to_vec().unwrap().iter().map(|v| **v).collect();
        let second: Vec<usize> = all.to_vec().unwrap().iter().map(|v| **v).collect();
        assert_eq!(first, vec![0, 1, 2]);
        assert_eq!(first, second);
        assert_eq!(counter.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn dropped_container_is_reported() {
        let counter = Arc::new(AtomicUsize::new(0));
        let all = {
            let container = Container::new();
            numbers(&container, counter)
        };
        assert!(matches!(all.get(0), Some(Err(WireboxError::ContainerDisposed { .. }))));
    }
}
