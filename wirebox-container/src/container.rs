//! # The Container
//!
//! Maps service types to [`InstanceProducer`]s, raises the container events
//! and owns the lock/verify lifecycle.
//!
//! # Lifecycle
//! ```text
//! Container::new()  ──register*()──>  Unlocked
//!                                        │
//!                    first get_instance / get_registration / verify
//!                                        │
//!                                        ▼
//!                                     Locked  (registrations frozen)
//! ```
//!
//! # Examples
//! ```rust
//! use std::sync::Arc;
//! use wirebox_container::prelude::*;
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
//! impl Component for ConsoleLogger {
//!     fn constructors() -> Vec<Constructor<Self>> {
//!         vec![Constructor::new(|_| Ok(ConsoleLogger))]
//!     }
//! }
//!
//! struct UserService {
//!     logger: Arc<dyn Logger>,
//! }
//!
//! impl Component for UserService {
//!     fn constructors() -> Vec<Constructor<Self>> {
//!         vec![Constructor::new(|args| Ok(UserService { logger: args.get(0)? })).param::<dyn Logger>("logger")]
//!     }
//! }
//!
//! let container = Container::new();
//! container.register_singleton::<dyn Logger, ConsoleLogger>().unwrap();
//! container.register_transient::<UserService, UserService>().unwrap();
//!
//! let service = container.get_instance::<UserService>().unwrap();
//! assert_eq!(service.logger.log("hi"), "[console] hi");
//! ```

use std::any::{TypeId, type_name};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use tracing::{debug, info, instrument, trace, warn};
use wirebox_support::rendering::suggest_similar;

use crate::behaviors::{ConstructorSelector, DependencyResolver, InjectionConsumer, PropertySelector};
use crate::circular::CycleGuard;
use crate::collection::AllInstances;
use crate::component::{Component, activator_for};
use crate::decorator::{DecoratorPredicateContext, DecoratorRegistration};
use crate::discovery;
use crate::error::{NotRegisteredError, Result, WireboxError};
use crate::events::{
    BuiltHandler, ExpressionBuildingEventArgs, ExpressionBuiltEventArgs, UnregisteredHandler,
    UnregisteredTypeEventArgs,
};
use crate::expression::Expression;
use crate::generic::{OpenGenericContext, OpenGenericPredicate, OpenGenericRegistration};
use crate::graph::GraphValidator;
use crate::key::{GenericDefinition, ServiceType, TypeInfo};
use crate::lifestyle::Lifestyle;
use crate::options::ContainerOptions;
use crate::producer::InstanceProducer;
use crate::provider::Provider;
use crate::registration::{PredicateContext, Registration, next_id};
use crate::registry::{ConditionalProducer, Entry, Registry, ResolveContext, Resolver};
use crate::scope::{Scope, ScopeGuard};
use crate::service::{Implements, Instance, Service, from_instance, into_instance};

/// A lazily filled cache slot with its own cycle-guard identity.
struct Slot<T> {
    id: u64,
    cell: OnceCell<T>,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Self {
            id: next_id(),
            cell: OnceCell::new(),
        }
    }
}

pub(crate) struct ContainerInner {
    id: u64,
    options: RwLock<ContainerOptions>,
    registry: RwLock<Registry>,
    frozen: OnceCell<Registry>,
    locked: AtomicBool,
    has_registrations: AtomicBool,
    unregistered: DashMap<TypeId, Arc<Slot<Option<Arc<InstanceProducer>>>>>,
    collections: DashMap<TypeId, Arc<Slot<Arc<InstanceProducer>>>>,
}

/// How thoroughly [`Container::verify_with`] checks the configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VerificationOption {
    /// Build and create every registration; diagnostics are only logged.
    VerifyOnly,
    /// Like `VerifyOnly`, and lifestyle mismatches fail verification.
    #[default]
    VerifyAndDiagnose,
}

// ═══════════════════════════════════════════
// Container
// ═══════════════════════════════════════════

/// Thread-safe dependency injection container.
///
/// Cloning is cheap; clones share the same registrations and caches.
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Container {
    /// Creates a container with default options.
    pub fn new() -> Self {
        Self::with_options(ContainerOptions::default())
    }

    pub fn with_options(options: ContainerOptions) -> Self {
        let id = next_id();
        debug!(container = id, ?options, "Creating container");
        Self {
            inner: Arc::new(ContainerInner {
                id,
                options: RwLock::new(options),
                registry: RwLock::new(Registry::new()),
                frozen: OnceCell::new(),
                locked: AtomicBool::new(false),
                has_registrations: AtomicBool::new(false),
                unregistered: DashMap::new(),
                collections: DashMap::new(),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ContainerInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<ContainerInner> {
        Arc::downgrade(&self.inner)
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// A snapshot of the current options.
    pub fn options(&self) -> ContainerOptions {
        self.inner.options.read().clone()
    }

    /// Whether the first resolution (or `verify`) has happened.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.inner.locked.load(Ordering::Acquire)
    }

    /// Freezes the registrations. Idempotent.
    pub(crate) fn lock(&self) {
        if self.is_locked() {
            return;
        }
        let registry = self.inner.registry.write();
        if self.is_locked() {
            return;
        }
        let _ = self.inner.frozen.set(registry.clone());
        self.inner.locked.store(true, Ordering::Release);
        debug!(container = self.inner.id, services = registry.len(), "Container locked");
    }

    /// Runs `f` on the frozen registry, or on the live one before locking.
    fn with_registry<R>(&self, f: impl FnOnce(&Registry) -> R) -> R {
        match self.inner.frozen.get() {
            Some(frozen) => f(frozen),
            None => f(&self.inner.registry.read()),
        }
    }

    fn mutate<R>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut Registry, &ContainerOptions) -> Result<R>,
    ) -> Result<R> {
        let mut registry = self.inner.registry.write();
        if self.is_locked() {
            return Err(WireboxError::ContainerLocked { operation });
        }
        let options = self.inner.options.read();
        let result = f(&mut registry, &options)?;
        self.inner.has_registrations.store(true, Ordering::Release);
        Ok(result)
    }

    // ── Behaviors ──

    pub fn set_constructor_selector(&self, selector: impl ConstructorSelector + 'static) -> Result<()> {
        self.configure("constructor selector", |options| options.set_selector(Arc::new(selector)))
    }

    pub fn set_dependency_resolver(&self, resolver: impl DependencyResolver + 'static) -> Result<()> {
        self.configure("dependency resolver", |options| options.set_resolver(Arc::new(resolver)))
    }

    pub fn set_property_selector(&self, selector: impl PropertySelector + 'static) -> Result<()> {
        self.configure("property selector", |options| options.set_properties(Arc::new(selector)))
    }

    fn configure(&self, behavior: &'static str, f: impl FnOnce(&mut ContainerOptions)) -> Result<()> {
        let _registry = self.inner.registry.write();
        if self.is_locked() || self.inner.has_registrations.load(Ordering::Acquire) {
            return Err(WireboxError::BehaviorLocked { behavior });
        }
        f(&mut self.inner.options.write());
        debug!(behavior, "Replaced resolution behavior");
        Ok(())
    }

    pub fn constructor_selector(&self) -> Arc<dyn ConstructorSelector> {
        self.inner.options.read().selector()
    }

    pub fn dependency_resolver(&self) -> Arc<dyn DependencyResolver> {
        self.inner.options.read().resolver()
    }

    pub fn property_selector(&self) -> Arc<dyn PropertySelector> {
        self.inner.options.read().properties()
    }

    // ── Registration: components ──

    /// Registers `I` as the implementation of `S` with the default lifestyle.
    pub fn register<S, I>(&self) -> Result<()>
    where
        S: ?Sized + Service,
        I: Component + Implements<S>,
    {
        let lifestyle = self.inner.options.read().lifestyle().clone();
        self.register_with::<S, I>(lifestyle)
    }

    /// Registers `I` as the implementation of `S`.
    ///
    /// # Errors
    /// - [`WireboxError::NoConstructor`] / [`WireboxError::AmbiguousConstructor`]
    ///   if the constructor selector can't pick a constructor of `I`
    /// - [`WireboxError::AlreadyRegistered`] if `S` is registered and
    ///   overriding is disabled
    /// - [`WireboxError::ContainerLocked`] after the first resolution
    pub fn register_with<S, I>(&self, lifestyle: Lifestyle) -> Result<()>
    where
        S: ?Sized + Service,
        I: Component + Implements<S>,
    {
        self.validate_constructor::<I>()?;
        let producer = InstanceProducer::new::<S, I>(lifestyle.create_registration::<I>(self))?;
        self.add_producer(producer, "register")
    }

    pub fn register_transient<S, I>(&self) -> Result<()>
    where
        S: ?Sized + Service,
        I: Component + Implements<S>,
    {
        self.register_with::<S, I>(Lifestyle::transient())
    }

    pub fn register_scoped<S, I>(&self) -> Result<()>
    where
        S: ?Sized + Service,
        I: Component + Implements<S>,
    {
        self.register_with::<S, I>(Lifestyle::scoped())
    }

    pub fn register_singleton<S, I>(&self) -> Result<()>
    where
        S: ?Sized + Service,
        I: Component + Implements<S>,
    {
        self.register_with::<S, I>(Lifestyle::singleton())
    }

    // ── Registration: instances and factories ──

    /// Registers a pre-built instance as a singleton.
    pub fn register_instance<S: ?Sized + Service>(&self, instance: Arc<S>) -> Result<()> {
        let registration = Registration::instance(TypeInfo::of::<S>(), into_instance(instance), self);
        let producer = InstanceProducer::with_converter(ServiceType::of::<S>(), registration, None);
        self.add_producer(producer, "register_instance")
    }

    /// Registers a factory closure. The closure gets a [`Resolver`] for its
    /// own dependencies.
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use wirebox_container::prelude::*;
    ///
    /// let container = Container::new();
    /// container.register_instance::<String>(Arc::new("db".into())).unwrap();
    /// container
    ///     .register_factory::<usize, _>(Lifestyle::transient(), |r| Ok(Arc::new(r.resolve::<String>()?.len())))
    ///     .unwrap();
    /// assert_eq!(*container.get_instance::<usize>().unwrap(), 2);
    /// ```
    pub fn register_factory<S, F>(&self, lifestyle: Lifestyle, factory: F) -> Result<()>
    where
        S: ?Sized + Service,
        F: Fn(&dyn Resolver) -> Result<Arc<S>> + Send + Sync + 'static,
    {
        let registration = lifestyle.create_factory_registration::<S, F>(self, factory);
        let producer = InstanceProducer::with_converter(ServiceType::of::<S>(), registration, None);
        self.add_producer(producer, "register_factory")
    }

    /// Maps `S` onto an existing registration. Every service added this way
    /// shares the registration's lifestyle cache.
    ///
    /// # Errors
    /// [`WireboxError::InvalidRegistration`] if the registration belongs to
    /// another container.
    pub fn add_registration<S, I>(&self, registration: Arc<Registration>) -> Result<()>
    where
        S: ?Sized + Service,
        I: Implements<S>,
    {
        if registration.container()?.id() != self.id() {
            return Err(WireboxError::InvalidRegistration {
                service: type_name::<S>().to_string(),
                reason: "the registration was created for another container".into(),
            });
        }
        self.add_producer(InstanceProducer::new::<S, I>(registration)?, "add_registration")
    }

    /// Registers `I` for `S` when `predicate` accepts the injection context.
    ///
    /// Exactly one conditional registration of a service may apply to a
    /// consumer.
    pub fn register_conditional<S, I>(
        &self,
        lifestyle: Lifestyle,
        predicate: impl Fn(&PredicateContext<'_>) -> bool + Send + Sync + 'static,
    ) -> Result<()>
    where
        S: ?Sized + Service,
        I: Component + Implements<S>,
    {
        self.validate_constructor::<I>()?;
        let producer = InstanceProducer::new::<S, I>(lifestyle.create_registration::<I>(self))?;
        self.mutate("register_conditional", |registry, _| {
            registry.register_conditional(ConditionalProducer {
                producer,
                predicate: Arc::new(predicate),
            })
        })
    }

    // ── Registration: open generics ──

    /// Maps every closed type of `service` onto the matching closed type of
    /// `implementation`, resolved on first request.
    pub fn register_open_generic(
        &self,
        service: GenericDefinition,
        implementation: GenericDefinition,
        lifestyle: Lifestyle,
    ) -> Result<()> {
        let open = open_registration(service, implementation, lifestyle, None)?;
        self.add_open_generic(open)
    }

    /// Like [`register_open_generic`](Self::register_open_generic), for the
    /// closed types `predicate` accepts.
    pub fn register_open_generic_when(
        &self,
        service: GenericDefinition,
        implementation: GenericDefinition,
        lifestyle: Lifestyle,
        predicate: impl Fn(&OpenGenericContext<'_>) -> bool + Send + Sync + 'static,
    ) -> Result<()> {
        let open = open_registration(service, implementation, lifestyle, Some(Arc::new(predicate)))?;
        self.add_open_generic(open)
    }

    fn add_open_generic(&self, open: OpenGenericRegistration) -> Result<()> {
        self.mutate("register_open_generic", |registry, _| {
            debug!(registration = ?open, "Registered open generic");
            registry.unregistered_handlers.push(UnregisteredHandler::OpenGeneric(open));
            Ok(())
        })
    }

    // ── Registration: decorators ──

    /// Registers `D` as a transient decorator of `S`.
    pub fn register_decorator<S, D>(&self) -> Result<()>
    where
        S: ?Sized + Service,
        D: Component + Implements<S>,
    {
        self.register_decorator_with::<S, D>(Lifestyle::transient())
    }

    pub fn register_decorator_with<S, D>(&self, lifestyle: Lifestyle) -> Result<()>
    where
        S: ?Sized + Service,
        D: Component + Implements<S>,
    {
        self.add_decorator(DecoratorRegistration::closed::<S, D>(lifestyle, None)?)
    }

    /// Registers `D` as a decorator of `S` for the producers `predicate`
    /// accepts.
    pub fn register_decorator_when<S, D>(
        &self,
        lifestyle: Lifestyle,
        predicate: impl Fn(&DecoratorPredicateContext) -> bool + Send + Sync + 'static,
    ) -> Result<()>
    where
        S: ?Sized + Service,
        D: Component + Implements<S>,
    {
        self.add_decorator(DecoratorRegistration::closed::<S, D>(lifestyle, Some(Arc::new(predicate)))?)
    }

    pub fn register_open_decorator(
        &self,
        service: GenericDefinition,
        decorator: GenericDefinition,
        lifestyle: Lifestyle,
    ) -> Result<()> {
        self.add_decorator(DecoratorRegistration::open(service, decorator, lifestyle, None)?)
    }

    pub fn register_open_decorator_when(
        &self,
        service: GenericDefinition,
        decorator: GenericDefinition,
        lifestyle: Lifestyle,
        predicate: impl Fn(&DecoratorPredicateContext) -> bool + Send + Sync + 'static,
    ) -> Result<()> {
        self.add_decorator(DecoratorRegistration::open(
            service,
            decorator,
            lifestyle,
            Some(Arc::new(predicate)),
        )?)
    }

    fn add_decorator(&self, decorator: DecoratorRegistration) -> Result<()> {
        self.mutate("register_decorator", |registry, _| {
            debug!(decorator = ?decorator, lifestyle = %decorator.lifestyle(), "Registered decorator");
            registry
                .built_handlers
                .push(BuiltHandler::Decorator(Arc::new(decorator)));
            Ok(())
        })
    }

    // ── Registration: collections ──

    /// Declares a collection of `S`, so it resolves even with no elements.
    pub fn register_collection<S: ?Sized + Service>(&self) -> Result<()> {
        self.mutate("register_collection", |registry, _| {
            registry.ensure_collection(&ServiceType::of::<S>());
            Ok(())
        })
    }

    /// Appends `I` to the collection of `S`.
    pub fn append_to_collection<S, I>(&self, lifestyle: Lifestyle) -> Result<()>
    where
        S: ?Sized + Service,
        I: Component + Implements<S>,
    {
        self.validate_constructor::<I>()?;
        let producer = InstanceProducer::new::<S, I>(lifestyle.create_registration::<I>(self))?;
        self.mutate("append_to_collection", |registry, _| {
            registry.append(producer);
            Ok(())
        })
    }

    /// Appends the closed type of `implementation` to every collection of a
    /// closed `service` type. Such elements follow the explicitly appended
    /// ones.
    pub fn append_open_generic_to_collection(
        &self,
        service: GenericDefinition,
        implementation: GenericDefinition,
        lifestyle: Lifestyle,
    ) -> Result<()> {
        let open = open_registration(service, implementation, lifestyle, None)?;
        self.mutate("append_open_generic_to_collection", |registry, _| {
            debug!(registration = ?open, "Appended open generic to collections");
            registry.open_collections.push(open);
            Ok(())
        })
    }

    // ── Registration: modules ──

    /// Lets `provider` register its services.
    pub fn add_provider(&self, provider: &dyn Provider) -> Result<()> {
        debug!(provider = provider.name(), "Adding provider");
        provider.register(self)
    }

    /// Registers every [`Discoverable`](crate::discovery::Discoverable)
    /// submitted under `tag`. Returns how many ran.
    pub fn register_discovered(&self, tag: &str) -> Result<usize> {
        let mut count = 0;
        for entry in discovery::entries(tag) {
            trace!(tag, name = entry.name(), "Registering discovered component");
            entry.register(self)?;
            count += 1;
        }
        debug!(tag, count, "Registered discovered components");
        Ok(count)
    }

    // ── Events ──

    /// Adds an observer of the `ResolveUnregisteredType` event.
    pub fn on_resolve_unregistered_type(
        &self,
        observer: impl Fn(&mut UnregisteredTypeEventArgs<'_>) -> Result<()> + Send + Sync + 'static,
    ) -> Result<()> {
        self.mutate("on_resolve_unregistered_type", |registry, _| {
            registry
                .unregistered_handlers
                .push(UnregisteredHandler::Observer(Arc::new(observer)));
            Ok(())
        })
    }

    /// Adds an observer of the `ExpressionBuilding` event.
    pub fn on_expression_building(
        &self,
        observer: impl Fn(&mut ExpressionBuildingEventArgs) -> Result<()> + Send + Sync + 'static,
    ) -> Result<()> {
        self.mutate("on_expression_building", |registry, _| {
            registry.building_observers.push(Arc::new(observer));
            Ok(())
        })
    }

    /// Adds an observer of the `ExpressionBuilt` event. Observers and
    /// decorators run in registration order.
    pub fn on_expression_built(
        &self,
        observer: impl Fn(&mut ExpressionBuiltEventArgs) -> Result<()> + Send + Sync + 'static,
    ) -> Result<()> {
        self.mutate("on_expression_built", |registry, _| {
            registry
                .built_handlers
                .push(BuiltHandler::Observer(Arc::new(observer)));
            Ok(())
        })
    }

    // ── Resolution ──

    /// Resolves `S` in the calling thread's ambient scope. Locks the
    /// container.
    ///
    /// ```rust,ignore
    /// let logger: Arc<dyn Logger> = container.get_instance::<dyn Logger>()?;
    /// ```
    pub fn get_instance<S: ?Sized + Service>(&self) -> Result<Arc<S>> {
        trace!(service = type_name::<S>(), "Resolving");
        from_instance::<S>(&self.resolve_service(&ServiceType::of::<S>(), None)?)
    }

    /// Resolves `S` with `scope` as the active scope.
    pub fn get_instance_in<S: ?Sized + Service>(&self, scope: &Arc<Scope>) -> Result<Arc<S>> {
        trace!(service = type_name::<S>(), scope = scope.id(), "Resolving in scope");
        from_instance::<S>(&self.resolve_service(&ServiceType::of::<S>(), Some(scope))?)
    }

    /// Every registered instance of `S`, in registration order. Empty when
    /// nothing was appended.
    pub fn get_all_instances<S: ?Sized + Service>(&self) -> Result<AllInstances<S>> {
        let instance = self.resolve_service(&ServiceType::collection_of::<S>(), None)?;
        from_instance::<AllInstances<S>>(&instance).map(|all| (*all).clone())
    }

    pub fn get_all_instances_in<S: ?Sized + Service>(&self, scope: &Arc<Scope>) -> Result<AllInstances<S>> {
        let instance = self.resolve_service(&ServiceType::collection_of::<S>(), Some(scope))?;
        from_instance::<AllInstances<S>>(&instance).map(|all| (*all).clone())
    }

    /// Untyped resolution. `Ok(None)` when the service can't be resolved.
    pub fn get_service(&self, service_type: &ServiceType) -> Result<Option<Instance>> {
        self.lock();
        match self.producer_for(service_type)? {
            Some(producer) => {
                let factory = producer.factory()?;
                factory(&ResolveContext::new(self, None)).map(Some)
            }
            None => Ok(None),
        }
    }

    /// The producer for `service_type`, including ones supplied by
    /// unregistered-type handlers. Locks the container.
    ///
    /// # Errors
    /// [`WireboxError::NotRegistered`] if nothing can produce the service
    /// and `throw_on_failure` is set.
    pub fn get_registration(
        &self,
        service_type: &ServiceType,
        throw_on_failure: bool,
    ) -> Result<Option<Arc<InstanceProducer>>> {
        self.lock();
        match self.producer_for(service_type)? {
            Some(producer) => Ok(Some(producer)),
            None if throw_on_failure => Err(self.not_registered(service_type)),
            None => Ok(None),
        }
    }

    /// Explicitly registered producers plus those resolved so far for
    /// unregistered types. The order is unspecified.
    pub fn get_current_registrations(&self) -> Vec<Arc<InstanceProducer>> {
        let mut producers: Vec<Arc<InstanceProducer>> =
            self.with_registry(|registry| registry.entries().flat_map(Entry::producers).collect());
        producers.extend(
            self.inner
                .unregistered
                .iter()
                .filter_map(|slot| slot.value().cell.get().cloned().flatten()),
        );
        producers
    }

    pub(crate) fn resolve_service(&self, service_type: &ServiceType, scope: Option<&Arc<Scope>>) -> Result<Instance> {
        self.lock();
        let producer = self
            .producer_for(service_type)?
            .ok_or_else(|| self.not_registered(service_type))?;
        let factory = producer.factory()?;
        factory(&ResolveContext::new(self, scope))
    }

    fn producer_for(&self, service_type: &ServiceType) -> Result<Option<Arc<InstanceProducer>>> {
        if service_type.is_collection() {
            return self.collection_producer(service_type).map(Some);
        }
        self.find_producer(service_type, None)
    }

    // ── Scopes ──

    /// Starts an ambient scope on the calling thread, nested in the current
    /// one. It ends when the guard is dropped.
    pub fn begin_scope(&self) -> ScopeGuard {
        let guard = ScopeGuard::begin(self.inner.id);
        debug!(scope = guard.scope().id(), "Beginning scope");
        guard
    }

    /// Creates a detached scope for [`get_instance_in`](Self::get_instance_in).
    pub fn create_scope(&self) -> Arc<Scope> {
        let scope = Scope::new(self.inner.id, None);
        debug!(scope = scope.id(), "Creating scope");
        scope
    }

    // ── Verification ──

    /// Verifies with [`VerificationOption::VerifyAndDiagnose`].
    pub fn verify(&self) -> Result<()> {
        self.verify_with(VerificationOption::VerifyAndDiagnose)
    }

    /// Builds every registration and creates one instance of each, then
    /// checks the graph for lifestyle mismatches and disposable transients.
    /// Locks the container.
    ///
    /// # Errors
    /// - [`WireboxError::Verification`] wrapping the first failing service
    /// - [`WireboxError::LifestyleMismatch`] under
    ///   [`VerificationOption::VerifyAndDiagnose`], unless suppressed
    #[instrument(skip(self), name = "container_verify")]
    pub fn verify_with(&self, option: VerificationOption) -> Result<()> {
        self.lock();
        let producers = self.with_registry(|registry| {
            registry
                .entries()
                .flat_map(Entry::producers)
                .chain(registry.collections().flatten().cloned())
                .collect::<Vec<_>>()
        });
        info!(producers = producers.len(), "Verifying container");

        for producer in &producers {
            producer
                .build_expression()
                .map_err(|source| verification_error(producer, source))?;
        }

        let scope = self.create_scope();
        for producer in &producers {
            producer
                .get_instance_in(&scope)
                .map_err(|source| verification_error(producer, source))?;
        }
        scope.dispose();

        let diagnostics = GraphValidator::new().validate(&producers);
        for mismatch in &diagnostics.mismatches {
            warn!(
                consumer = %mismatch.consumer,
                consumer_lifestyle = %mismatch.consumer_lifestyle,
                dependency = %mismatch.dependency,
                dependency_lifestyle = %mismatch.dependency_lifestyle,
                "Lifestyle mismatch"
            );
        }
        for implementation in &diagnostics.disposable_transients {
            warn!(
                implementation = %implementation,
                "Transient component has a disposal hook the container never runs"
            );
        }

        let suppressed = self.inner.options.read().lifestyle_mismatches_suppressed();
        if option == VerificationOption::VerifyAndDiagnose && !suppressed {
            if let Some(mismatch) = diagnostics.mismatches.into_iter().next() {
                return Err(WireboxError::LifestyleMismatch(mismatch));
            }
        }

        info!("Container verified ✓");
        Ok(())
    }

    // ── Internal lookups ──

    /// The producer for a single service: registered, conditional or
    /// supplied by the unregistered-type handlers.
    pub(crate) fn find_producer(
        &self,
        service_type: &ServiceType,
        consumer: Option<&InjectionConsumer>,
    ) -> Result<Option<Arc<InstanceProducer>>> {
        let entry = self.with_registry(|registry| registry.get(service_type).cloned());
        match entry {
            Some(Entry::Single(producer)) => Ok(Some(producer)),
            Some(Entry::Conditional(candidates)) => select_conditional(service_type, &candidates, consumer),
            None => self.resolve_unregistered(service_type),
        }
    }

    /// Runs the unregistered-type handlers at most once per service type.
    /// Failures are not cached.
    fn resolve_unregistered(&self, service_type: &ServiceType) -> Result<Option<Arc<InstanceProducer>>> {
        let slot = self
            .inner
            .unregistered
            .entry(service_type.type_id())
            .or_insert_with(|| Arc::new(Slot::new()))
            .value()
            .clone();
        if let Some(producer) = slot.cell.get() {
            return Ok(producer.clone());
        }

        let _guard = CycleGuard::enter(slot.id, service_type.info())?;
        slot.cell
            .get_or_try_init(|| self.raise_unregistered(service_type))
            .cloned()
    }

    fn raise_unregistered(&self, service_type: &ServiceType) -> Result<Option<Arc<InstanceProducer>>> {
        let mut args = UnregisteredTypeEventArgs::new(*service_type, self);
        if let Some(producer) = self.resolve_variant(service_type)? {
            args.register_producer(producer)?;
        }

        let handlers = self.with_registry(|registry| registry.unregistered_handlers.clone());
        for handler in &handlers {
            handler.handle(&mut args)?;
        }

        let producer = args.into_producer();
        match &producer {
            Some(producer) => debug!(
                service = %service_type,
                implementation = %producer.implementation_type(),
                lifestyle = %producer.lifestyle(),
                "Resolved unregistered type"
            ),
            None => trace!(service = %service_type, "Unregistered type stays unresolved"),
        }
        Ok(producer)
    }

    /// Maps a request onto the single registered variant the service
    /// declares.
    fn resolve_variant(&self, service_type: &ServiceType) -> Result<Option<Arc<InstanceProducer>>> {
        let Some(info) = service_type.generic() else {
            return Ok(None);
        };

        let mut candidates = self.with_registry(|registry| {
            info.variants()
                .iter()
                .filter_map(|variant| match registry.get(&variant.service) {
                    Some(Entry::Single(producer)) => Some((producer.clone(), variant.converter.clone())),
                    _ => None,
                })
                .collect::<Vec<_>>()
        });

        if candidates.len() > 1 {
            return Err(WireboxError::AmbiguousVariant {
                service: service_type.info(),
                candidates: candidates
                    .iter()
                    .map(|(producer, _)| producer.service_type().info())
                    .collect(),
            });
        }
        let Some((producer, converter)) = candidates.pop() else {
            return Ok(None);
        };

        trace!(service = %service_type, variant = %producer.service_type(), "Mapped to registered variant");
        let registration = Registration::forward(service_type.info(), producer, converter, self);
        Ok(Some(InstanceProducer::with_converter(*service_type, registration, None)))
    }

    /// The producer of a collection service type, composed once.
    pub(crate) fn collection_producer(&self, service_type: &ServiceType) -> Result<Arc<InstanceProducer>> {
        let element = service_type
            .element()
            .ok_or_else(|| WireboxError::InvalidRegistration {
                service: service_type.type_name().to_string(),
                reason: "not a collection service type".into(),
            })?;

        let slot = self
            .inner
            .collections
            .entry(service_type.type_id())
            .or_insert_with(|| Arc::new(Slot::new()))
            .value()
            .clone();
        if let Some(producer) = slot.cell.get() {
            return Ok(producer.clone());
        }

        let _guard = CycleGuard::enter(slot.id, service_type.info())?;
        slot.cell
            .get_or_try_init(|| {
                let (mut producers, open) =
                    self.with_registry(|registry| (registry.collection(&element), registry.open_collections.clone()));
                for registration in &open {
                    if let Some(producer) = registration.close(&element, self)? {
                        producers.push(producer);
                    }
                }

                debug!(service = %element, elements = producers.len(), "Composed collection");
                let registration = Registration::collection(*service_type, producers, self);
                Ok(InstanceProducer::with_converter(*service_type, registration, None))
            })
            .cloned()
    }

    /// Raises `ExpressionBuilding` for a raw creation expression.
    pub(crate) fn notify_expression_building(
        &self,
        registration: &Registration,
        expression: Expression,
    ) -> Result<Expression> {
        let observers = self.with_registry(|registry| registry.building_observers.clone());
        if observers.is_empty() {
            return Ok(expression);
        }

        let mut args = ExpressionBuildingEventArgs::new(registration, expression);
        for observer in &observers {
            observer(&mut args)?;
        }
        Ok(args.into_expression())
    }

    /// Raises `ExpressionBuilt` for a producer expression. Returns the final
    /// expression and the decorators applied, innermost first.
    pub(crate) fn notify_expression_built(
        &self,
        producer: &InstanceProducer,
        expression: Expression,
    ) -> Result<(Expression, Vec<TypeInfo>)> {
        let handlers = self.with_registry(|registry| registry.built_handlers.clone());
        let mut expression = expression;
        let mut applied = Vec::new();

        for handler in &handlers {
            expression = match handler {
                BuiltHandler::Decorator(decorator) => decorator.apply(producer, self, expression, &mut applied)?,
                BuiltHandler::Observer(observer) => {
                    let mut args = ExpressionBuiltEventArgs::new(producer, expression);
                    observer(&mut args)?;
                    args.into_expression()
                }
            };
        }
        Ok((expression, applied))
    }

    fn not_registered(&self, service_type: &ServiceType) -> WireboxError {
        let names = self.with_registry(|registry| registry.service_names());
        WireboxError::NotRegistered(NotRegisteredError {
            requested: service_type.info(),
            suggestions: suggest_similar(service_type.type_name(), &names, 3),
        })
    }

    fn validate_constructor<I: Component>(&self) -> Result<()> {
        let activator = activator_for::<I>();
        self.constructor_selector()
            .select_constructor(activator.implementation(), &activator.constructors(), self)
            .map(|_| ())
    }

    fn add_producer(&self, producer: Arc<InstanceProducer>, operation: &'static str) -> Result<()> {
        self.mutate(operation, |registry, options| {
            registry.register(producer, options.allows_override())
        })
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.inner.id)
            .field("registered", &self.with_registry(Registry::len))
            .field("locked", &self.is_locked())
            .finish()
    }
}

fn select_conditional(
    service_type: &ServiceType,
    candidates: &[ConditionalProducer],
    consumer: Option<&InjectionConsumer>,
) -> Result<Option<Arc<InstanceProducer>>> {
    let applicable: Vec<&ConditionalProducer> = candidates
        .iter()
        .filter(|candidate| {
            (candidate.predicate)(&PredicateContext {
                service_type,
                implementation_type: candidate.producer.implementation_type(),
                consumer,
            })
        })
        .collect();

    match applicable.as_slice() {
        [] => {
            trace!(service = %service_type, "No conditional registration applies");
            Ok(None)
        }
        [only] => Ok(Some(only.producer.clone())),
        many => Err(WireboxError::AmbiguousConditional {
            service: service_type.info(),
            consumer: consumer.map(InjectionConsumer::implementation_type),
            candidates: many.iter().map(|c| c.producer.implementation_type()).collect(),
        }),
    }
}

fn open_registration(
    service: GenericDefinition,
    implementation: GenericDefinition,
    lifestyle: Lifestyle,
    predicate: Option<OpenGenericPredicate>,
) -> Result<OpenGenericRegistration> {
    if service.arity() == 0 {
        return Err(WireboxError::InvalidRegistration {
            service: service.to_string(),
            reason: "the service is not an open generic definition".into(),
        });
    }
    if service.arity() != implementation.arity() {
        return Err(WireboxError::InvalidRegistration {
            service: service.to_string(),
            reason: format!(
                "{implementation} has {} type parameters, but the service has {}",
                implementation.arity(),
                service.arity()
            ),
        });
    }
    Ok(OpenGenericRegistration::new(service, implementation, lifestyle, predicate))
}

fn verification_error(producer: &InstanceProducer, source: WireboxError) -> WireboxError {
    WireboxError::Verification {
        service: producer.service_type().info(),
        source: Box::new(source),
    }
}

// ═══════════════════════════════════════════
// Prelude
// ═══════════════════════════════════════════

pub mod prelude {
    pub use super::{Container, VerificationOption};
    pub use crate::collection::AllInstances;
    pub use crate::component::{Arguments, Component, Constructor, Property};
    pub use crate::error::{Result, WireboxError};
    pub use crate::key::{GenericDefinition, ServiceType, TypeInfo};
    pub use crate::lifestyle::Lifestyle;
    pub use crate::options::ContainerOptions;
    pub use crate::provider::Provider;
    pub use crate::registry::Resolver;
    pub use crate::scope::{Scope, ScopeGuard};
    pub use crate::service::{Implements, Service};
    pub use crate::{implements, service};
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════
