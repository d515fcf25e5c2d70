//! Service registry: everything the container knows before it is locked.
//!
//! The registry maps service types to producers and holds collections,
//! open generic registrations, decorators and event observers. It is
//! mutated under the container's write lock and frozen into an immutable
//! snapshot when the container locks.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::collection::AllInstances;
use crate::container::Container;
use crate::error::{AlreadyRegisteredError, Result, WireboxError};
use crate::events::{BuiltHandler, ExpressionBuildingObserver, UnregisteredHandler};
use crate::generic::OpenGenericRegistration;
use crate::key::ServiceType;
use crate::producer::InstanceProducer;
use crate::registration::PredicateContext;
use crate::scope::{self, Scope};
use crate::service::{Instance, Service, from_instance};

/// User factory closure. Receives a [`Resolver`] to pull its own
/// dependencies.
pub type FactoryFn = Arc<dyn Fn(&dyn Resolver) -> Result<Instance> + Send + Sync>;

/// Predicate deciding whether a conditional registration applies.
pub type Predicate = Arc<dyn Fn(&PredicateContext<'_>) -> bool + Send + Sync>;

/// Resolves services from inside factories.
///
/// Separated from [`Container`] so factories see the scope of the
/// resolution that called them.
pub trait Resolver {
    fn resolve_service(&self, service_type: &ServiceType) -> Result<Instance>;

    fn container(&self) -> &Container;
}

impl dyn Resolver + '_ {
    /// Resolves a typed service.
    pub fn resolve<S: ?Sized + Service>(&self) -> Result<Arc<S>> {
        from_instance::<S>(&self.resolve_service(&ServiceType::of::<S>())?)
    }

    /// Resolves every registered instance of `S`.
    pub fn resolve_all<S: ?Sized + Service>(&self) -> Result<AllInstances<S>> {
        let instance = self.resolve_service(&ServiceType::collection_of::<S>())?;
        from_instance::<AllInstances<S>>(&instance).map(|all| (*all).clone())
    }
}

/// The context a composed factory runs in: the container and the explicit
/// scope of the resolution, if any.
pub struct ResolveContext<'a> {
    container: &'a Container,
    scope: Option<&'a Arc<Scope>>,
}

impl<'a> ResolveContext<'a> {
    pub fn new(container: &'a Container, scope: Option<&'a Arc<Scope>>) -> Self {
        Self { container, scope }
    }

    /// The explicit scope, else the calling thread's ambient scope.
    pub fn scope(&self) -> Option<Arc<Scope>> {
        match self.scope {
            Some(scope) => Some(scope.clone()),
            None => scope::current(self.container.id()),
        }
    }

    pub(crate) fn explicit_scope(&self) -> Option<&'a Arc<Scope>> {
        self.scope
    }
}

impl Resolver for ResolveContext<'_> {
    fn resolve_service(&self, service_type: &ServiceType) -> Result<Instance> {
        self.container.resolve_service(service_type, self.scope)
    }

    fn container(&self) -> &Container {
        self.container
    }
}

/// A conditional producer together with its predicate.
#[derive(Clone)]
pub(crate) struct ConditionalProducer {
    pub producer: Arc<InstanceProducer>,
    pub predicate: Predicate,
}

/// What the service table holds for a service type.
#[derive(Clone)]
pub(crate) enum Entry {
    Single(Arc<InstanceProducer>),
    Conditional(Vec<ConditionalProducer>),
}

impl Entry {
    pub fn producers(&self) -> Vec<Arc<InstanceProducer>> {
        match self {
            Entry::Single(producer) => vec![producer.clone()],
            Entry::Conditional(list) => list.iter().map(|c| c.producer.clone()).collect(),
        }
    }
}

/// Stores all registrations of a container.
#[derive(Clone, Default)]
pub(crate) struct Registry {
    services: HashMap<TypeId, Entry>,
    collections: HashMap<TypeId, Vec<Arc<InstanceProducer>>>,
    pub open_collections: Vec<OpenGenericRegistration>,
    pub unregistered_handlers: Vec<UnregisteredHandler>,
    pub building_observers: Vec<ExpressionBuildingObserver>,
    pub built_handlers: Vec<BuiltHandler>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an unconditional producer.
    ///
    /// # Errors
    /// [`WireboxError::AlreadyRegistered`] if the service is registered and
    /// `allow_override` is false; [`WireboxError::InvalidRegistration`] if
    /// the service has conditional registrations.
    pub fn register(&mut self, producer: Arc<InstanceProducer>, allow_override: bool) -> Result<()> {
        let service = producer.service_type();

        match self.services.get(&service.type_id()) {
            Some(Entry::Single(_)) if !allow_override => {
                return Err(WireboxError::AlreadyRegistered(AlreadyRegisteredError {
                    service: service.type_name().to_string(),
                }));
            }
            Some(Entry::Conditional(_)) => {
                return Err(WireboxError::InvalidRegistration {
                    service: service.type_name().to_string(),
                    reason: "the service already has conditional registrations".into(),
                });
            }
            _ => {}
        }

        debug!(
            service = %service,
            implementation = %producer.implementation_type(),
            lifestyle = %producer.lifestyle(),
            "Registered service"
        );
        self.services.insert(service.type_id(), Entry::Single(producer));
        Ok(())
    }

    /// Adds a conditional producer.
    pub fn register_conditional(&mut self, conditional: ConditionalProducer) -> Result<()> {
        let service = conditional.producer.service_type();

        let entry = self
            .services
            .entry(service.type_id())
            .or_insert_with(|| Entry::Conditional(Vec::new()));

        match entry {
            Entry::Conditional(list) => {
                debug!(
                    service = %service,
                    implementation = %conditional.producer.implementation_type(),
                    "Registered conditional service"
                );
                list.push(conditional);
                Ok(())
            }
            Entry::Single(_) => Err(WireboxError::InvalidRegistration {
                service: service.type_name().to_string(),
                reason: "the service already has an unconditional registration".into(),
            }),
        }
    }

    /// Appends a producer to the collection of its service type.
    pub fn append(&mut self, producer: Arc<InstanceProducer>) {
        debug!(
            service = %producer.service_type(),
            implementation = %producer.implementation_type(),
            "Appended to collection"
        );
        self.collections
            .entry(producer.service_type().type_id())
            .or_default()
            .push(producer);
    }

    /// Makes sure a collection exists, even when empty.
    pub fn ensure_collection(&mut self, element: &ServiceType) {
        self.collections.entry(element.type_id()).or_default();
    }

    pub fn get(&self, service: &ServiceType) -> Option<&Entry> {
        self.services.get(&service.type_id())
    }

    pub fn collection(&self, element: &ServiceType) -> Vec<Arc<InstanceProducer>> {
        self.collections
            .get(&element.type_id())
            .cloned()
            .unwrap_or_default()
    }

    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.services.values()
    }

    pub fn collections(&self) -> impl Iterator<Item = &Vec<Arc<InstanceProducer>>> {
        self.collections.values()
    }

    /// Names of all registered service types, for suggestions.
    pub fn service_names(&self) -> Vec<&'static str> {
        self.services
            .values()
            .filter_map(|entry| entry.producers().first().map(|p| p.service_type().type_name()))
            .collect()
    }

    /// Returns the number of registered service types.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("services", &self.services.len())
            .field("collections", &self.collections.len())
            .field("unregistered_handlers", &self.unregistered_handlers.len())
            .field("built_handlers", &self.built_handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifestyle::Lifestyle;

    struct Database;

    fn producer(container: &Container) -> Arc<InstanceProducer> {
        let registration =
            Lifestyle::singleton().create_factory_registration::<Database, _>(container, |_| Ok(Arc::new(Database)));
        InstanceProducer::new::<Database, Database>(registration).unwrap()
    }

    #[test]
    fn register_and_get() {
        let container = Container::new();
        let mut registry = Registry::new();
        registry.register(producer(&container), false).unwrap();
        assert!(registry.get(&ServiceType::of::<Database>()).is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn duplicate_fails() {
        let container = Container::new();
        let mut registry = Registry::new();
        registry.register(producer(&container), false).unwrap();
        let err = registry.register(producer(&container), false).err().unwrap();
        assert!(matches!(err, WireboxError::AlreadyRegistered(_)));
    }

    #[test]
    fn duplicate_with_override_ok() {
        let container = Container::new();
        let mut registry = Registry::new();
        registry.register(producer(&container), false).unwrap();
        assert!(registry.register(producer(&container), true).is_ok());
    }

    #[test]
    fn conditional_and_single_do_not_mix() {
        let container = Container::new();
        let mut registry = Registry::new();
        registry.register(producer(&container), false).unwrap();

        let conditional = ConditionalProducer {
            producer: producer(&container),
            predicate: Arc::new(|_| true),
        };
        assert!(registry.register_conditional(conditional).is_err());
    }

    #[test]
    fn collections_start_empty() {
        let container = Container::new();
        let mut registry = Registry::new();
        let element = ServiceType::of::<Database>();
        assert!(registry.collection(&element).is_empty());

        registry.append(producer(&container));
        registry.append(producer(&container));
        assert_eq!(registry.collection(&element).len(), 2);
    }
}
