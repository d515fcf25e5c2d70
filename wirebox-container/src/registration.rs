//! Registrations: how one implementation is created and cached.
//!
//! A [`Registration`] owns the lazily built [`Expression`] for its
//! implementation. Several [`InstanceProducer`]s may share one registration,
//! in which case they share its lifestyle cache.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{instrument, trace};

use crate::behaviors::InjectionConsumer;
use crate::circular::CycleGuard;
use crate::component::{Activator, ConstructorInfo, PropertyInfo};
use crate::container::{Container, ContainerInner};
use crate::error::{Result, UnresolvableParameterError, WireboxError};
use crate::expression::{Expression, Factory, factory_fn};
use crate::key::{ServiceType, TypeInfo};
use crate::lifestyle::Lifestyle;
use crate::producer::InstanceProducer;
use crate::registry::{FactoryFn, Resolver};
use crate::scope::Disposer;
use crate::service::{Converter, Instance};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates a process-wide unique id for registrations, producers and
/// lifestyle cache keys.
pub(crate) fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Diagnostic warnings a registration can suppress.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiagnosticType {
    /// A component depends on a dependency with a shorter lifestyle.
    LifestyleMismatch,
    /// A transient component has a disposal hook that never runs.
    DisposableTransientComponent,
}

/// A dependency recorded while building a registration.
#[derive(Clone)]
pub struct KnownRelationship {
    implementation: TypeInfo,
    lifestyle: Lifestyle,
    dependency: Arc<InstanceProducer>,
}

impl KnownRelationship {
    pub(crate) fn new(implementation: TypeInfo, lifestyle: Lifestyle, dependency: Arc<InstanceProducer>) -> Self {
        Self {
            implementation,
            lifestyle,
            dependency,
        }
    }

    /// The consuming implementation.
    pub fn implementation_type(&self) -> TypeInfo {
        self.implementation
    }

    pub fn lifestyle(&self) -> &Lifestyle {
        &self.lifestyle
    }

    /// The producer the dependency was resolved from.
    pub fn dependency(&self) -> &Arc<InstanceProducer> {
        &self.dependency
    }
}

impl fmt::Debug for KnownRelationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) -> {} ({})",
            self.implementation.short_name(),
            self.lifestyle,
            self.dependency.service_type().info().short_name(),
            self.dependency.lifestyle(),
        )
    }
}

/// Context handed to the predicate of a conditional registration.
pub struct PredicateContext<'a> {
    pub(crate) service_type: &'a ServiceType,
    pub(crate) implementation_type: TypeInfo,
    pub(crate) consumer: Option<&'a InjectionConsumer>,
}

impl PredicateContext<'_> {
    pub fn service_type(&self) -> &ServiceType {
        self.service_type
    }

    pub fn implementation_type(&self) -> TypeInfo {
        self.implementation_type
    }

    /// The component the dependency is injected into; `None` for a root
    /// resolution.
    pub fn consumer(&self) -> Option<&InjectionConsumer> {
        self.consumer
    }
}

pub(crate) enum Source {
    Component(Arc<dyn Activator>),
    Factory(FactoryFn),
    Instance(Instance),
    Expression(Expression),
    Forward {
        producer: Arc<InstanceProducer>,
        converter: Converter,
    },
    Collection {
        service: ServiceType,
        producers: Vec<Arc<InstanceProducer>>,
    },
}

/// How an implementation is created, with which lifestyle.
pub struct Registration {
    id: u64,
    implementation: TypeInfo,
    lifestyle: Lifestyle,
    container: Weak<ContainerInner>,
    source: Source,
    expression: OnceCell<Expression>,
    relationships: Mutex<Vec<KnownRelationship>>,
    suppressions: Mutex<Vec<(DiagnosticType, String)>>,
}

impl Registration {
    fn create(implementation: TypeInfo, lifestyle: Lifestyle, container: &Container, source: Source) -> Arc<Self> {
        Arc::new(Self {
            id: next_id(),
            implementation,
            lifestyle,
            container: container.downgrade(),
            source,
            expression: OnceCell::new(),
            relationships: Mutex::new(Vec::new()),
            suppressions: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn component(activator: Arc<dyn Activator>, lifestyle: Lifestyle, container: &Container) -> Arc<Self> {
        Self::create(activator.implementation(), lifestyle, container, Source::Component(activator))
    }

    pub(crate) fn factory(
        implementation: TypeInfo,
        lifestyle: Lifestyle,
        container: &Container,
        factory: FactoryFn,
    ) -> Arc<Self> {
        Self::create(implementation, lifestyle, container, Source::Factory(factory))
    }

    pub(crate) fn instance(implementation: TypeInfo, instance: Instance, container: &Container) -> Arc<Self> {
        Self::create(
            implementation,
            Lifestyle::singleton(),
            container,
            Source::Instance(instance),
        )
    }

    pub(crate) fn expression(expression: Expression, lifestyle: Lifestyle, container: &Container) -> Arc<Self> {
        Self::create(
            expression.produces(),
            lifestyle,
            container,
            Source::Expression(expression),
        )
    }

    /// A registration that reuses another producer's instances.
    pub(crate) fn forward(
        implementation: TypeInfo,
        producer: Arc<InstanceProducer>,
        converter: Converter,
        container: &Container,
    ) -> Arc<Self> {
        let lifestyle = producer.lifestyle().clone();
        Self::create(
            implementation,
            lifestyle,
            container,
            Source::Forward { producer, converter },
        )
    }

    pub(crate) fn collection(
        service: ServiceType,
        producers: Vec<Arc<InstanceProducer>>,
        container: &Container,
    ) -> Arc<Self> {
        Self::create(
            service.info(),
            Lifestyle::transient(),
            container,
            Source::Collection { service, producers },
        )
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn implementation_type(&self) -> TypeInfo {
        self.implementation
    }

    #[inline]
    pub fn lifestyle(&self) -> &Lifestyle {
        &self.lifestyle
    }

    pub fn is_built(&self) -> bool {
        self.expression.get().is_some()
    }

    /// The dependencies recorded by the build, empty before it.
    pub fn relationships(&self) -> Vec<KnownRelationship> {
        self.relationships.lock().clone()
    }

    /// Suppresses a verification warning for this registration.
    ///
    /// # Errors
    /// [`WireboxError::InvalidRegistration`] if `justification` is empty.
    pub fn suppress_diagnostic_warning(&self, kind: DiagnosticType, justification: &str) -> Result<()> {
        if justification.trim().is_empty() {
            return Err(WireboxError::InvalidRegistration {
                service: self.implementation.type_name().to_string(),
                reason: "a justification is required to suppress a diagnostic warning".into(),
            });
        }
        self.suppressions.lock().push((kind, justification.to_string()));
        Ok(())
    }

    pub fn is_suppressed(&self, kind: DiagnosticType) -> bool {
        self.suppressions.lock().iter().any(|(k, _)| *k == kind)
    }

    pub(crate) fn has_disposer(&self) -> bool {
        matches!(&self.source, Source::Component(activator) if activator.disposer().is_some())
    }

    pub(crate) fn container(&self) -> Result<Container> {
        self.container
            .upgrade()
            .map(Container::from_inner)
            .ok_or(WireboxError::ContainerDisposed {
                service: self.implementation,
            })
    }

    /// Builds the expression on first call and returns the same expression
    /// on every later call. Locks the container.
    pub fn build_expression(&self) -> Result<Expression> {
        if let Some(expression) = self.expression.get() {
            return Ok(expression.clone());
        }

        let container = self.container()?;
        container.lock();

        let _guard = CycleGuard::enter(self.id, self.implementation)?;
        self.expression
            .get_or_try_init(|| self.build(&container))
            .cloned()
    }

    #[instrument(level = "debug", skip_all, fields(implementation = %self.implementation, lifestyle = %self.lifestyle))]
    fn build(&self, container: &Container) -> Result<Expression> {
        match &self.source {
            Source::Component(activator) => {
                let raw = self.build_component(container, activator.as_ref())?;
                self.finish(container, raw, activator.disposer())
            }
            Source::Factory(factory) => {
                let factory = factory.clone();
                let raw = Expression::invoke(
                    self.implementation,
                    factory_fn(move |ctx| factory(ctx as &dyn Resolver)),
                );
                let applied = self.finish(container, raw, None)?;
                Ok(self.guarded(applied))
            }
            Source::Instance(instance) => {
                let raw = Expression::constant(self.implementation, instance.clone());
                container.notify_expression_building(self, raw)
            }
            Source::Expression(expression) => self.finish(container, expression.clone(), None),
            Source::Forward { producer, converter } => {
                trace!(from = %self.implementation, to = %producer.service_type(), "Forwarding to registered variant");
                let target = producer.build_expression()?;
                self.record(vec![KnownRelationship::new(
                    self.implementation,
                    self.lifestyle.clone(),
                    producer.clone(),
                )]);
                Ok(Expression::convert(self.implementation, target, converter.clone()))
            }
            Source::Collection { service, producers } => self.build_collection(container, service, producers),
        }
    }

    fn finish(&self, container: &Container, raw: Expression, disposer: Option<Disposer>) -> Result<Expression> {
        let raw = container.notify_expression_building(self, raw)?;
        Ok(self.lifestyle.apply(raw, self.id, disposer))
    }

    /// Factory closures are opaque; guard them at run time so a factory
    /// that resolves itself fails instead of deadlocking its own cache.
    fn guarded(&self, expression: Expression) -> Expression {
        let id = self.id;
        let implementation = self.implementation;
        let inner = expression.compile();
        Expression::intercept(
            expression,
            factory_fn(move |ctx| {
                let _guard = CycleGuard::enter(id, implementation)?;
                inner(ctx)
            }),
        )
    }

    fn build_component(&self, container: &Container, activator: &dyn Activator) -> Result<Expression> {
        let constructors = activator.constructors();
        let index = container
            .constructor_selector()
            .select_constructor(self.implementation, &constructors, container)?;
        let constructor = constructors.get(index).ok_or_else(|| WireboxError::NoConstructor {
            implementation: self.implementation,
            reason: format!("the constructor selector picked #{index}, which does not exist"),
        })?;

        let dependencies = resolve_dependencies(
            container,
            self.implementation,
            &self.lifestyle,
            constructor,
            &activator.properties(),
            None,
        )?;
        let expression = activator.new_instance(index, dependencies.arguments, dependencies.properties)?;
        self.record(dependencies.relationships);
        Ok(expression)
    }

    fn build_collection(
        &self,
        container: &Container,
        service: &ServiceType,
        producers: &[Arc<InstanceProducer>],
    ) -> Result<Expression> {
        let assemble = service.assembler().ok_or_else(|| WireboxError::InvalidRegistration {
            service: service.type_name().to_string(),
            reason: "not a collection service type".into(),
        })?;

        let items = producers
            .iter()
            .map(|producer| producer.build_expression())
            .collect::<Result<Vec<_>>>()?;
        self.record(
            producers
                .iter()
                .map(|p| KnownRelationship::new(self.implementation, self.lifestyle.clone(), p.clone()))
                .collect(),
        );

        let factories: Vec<Factory> = items.iter().map(Expression::compile).collect();
        let owner = container.downgrade();
        let factory = factory_fn(move |ctx| {
            Ok(assemble(
                factories.clone(),
                owner.clone(),
                ctx.explicit_scope().cloned(),
            ))
        });
        Ok(Expression::collection(self.implementation, items, factory))
    }

    pub(crate) fn record(&self, relationships: Vec<KnownRelationship>) {
        self.relationships.lock().extend(relationships);
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("implementation", &self.implementation)
            .field("lifestyle", &self.lifestyle)
            .field("built", &self.is_built())
            .finish()
    }
}

/// Expressions for the parameters and selected properties of a constructor.
#[derive(Default)]
pub(crate) struct Dependencies {
    pub arguments: Vec<Expression>,
    pub properties: Vec<(usize, Expression)>,
    pub relationships: Vec<KnownRelationship>,
}

/// Resolves every parameter of `constructor` and every property the
/// property selector picks. A `decoratee` replaces the parameter at its
/// position with the given expression.
pub(crate) fn resolve_dependencies(
    container: &Container,
    implementation: TypeInfo,
    lifestyle: &Lifestyle,
    constructor: &ConstructorInfo,
    properties: &[PropertyInfo],
    decoratee: Option<(usize, &Expression)>,
) -> Result<Dependencies> {
    let resolver = container.dependency_resolver();
    let mut dependencies = Dependencies::default();

    for (position, parameter) in constructor.parameters().iter().enumerate() {
        if let Some((index, expression)) = decoratee {
            if index == position {
                dependencies.arguments.push(expression.clone());
                continue;
            }
        }

        let consumer = InjectionConsumer::parameter(implementation, parameter.clone());
        let producer = required_producer(resolver.get_producer(&consumer, container, true)?, &consumer)?;
        dependencies.arguments.push(producer.build_expression()?);
        if !producer.is_ad_hoc() {
            dependencies
                .relationships
                .push(KnownRelationship::new(implementation, lifestyle.clone(), producer));
        }
    }

    let selector = container.property_selector();
    for (index, property) in properties.iter().enumerate() {
        let consumer = InjectionConsumer::property(implementation, property.clone());
        if !selector.select_property(&consumer, container) {
            continue;
        }

        trace!(implementation = %implementation, property = property.name(), "Injecting property");
        let producer = required_producer(resolver.get_producer(&consumer, container, true)?, &consumer)?;
        dependencies.properties.push((index, producer.build_expression()?));
        if !producer.is_ad_hoc() {
            dependencies
                .relationships
                .push(KnownRelationship::new(implementation, lifestyle.clone(), producer));
        }
    }

    Ok(dependencies)
}

fn required_producer(
    producer: Option<Arc<InstanceProducer>>,
    consumer: &InjectionConsumer,
) -> Result<Arc<InstanceProducer>> {
    producer.ok_or_else(|| {
        WireboxError::UnresolvableParameter(UnresolvableParameterError {
            implementation: consumer.implementation_type(),
            parameter: consumer.name(),
            parameter_type: consumer.service_type().info(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, Constructor};
    use std::sync::atomic::AtomicUsize;

    struct Config;

    struct Repository {
        _config: Arc<Config>,
    }

    impl Component for Repository {
        fn constructors() -> Vec<Constructor<Self>> {
            vec![Constructor::new(|args| Ok(Repository { _config: args.get(0)? })).param::<Config>("config")]
        }
    }

    #[test]
    fn build_expression_is_idempotent() {
        let container = Container::new();
        container.register_instance::<Config>(Arc::new(Config)).unwrap();
        let registration = Lifestyle::transient().create_registration::<Repository>(&container);

        let first = registration.build_expression().unwrap();
        let second = registration.build_expression().unwrap();
        assert!(Expression::ptr_eq(&first, &second));
        assert!(registration.is_built());
        assert!(container.is_locked());
    }

    #[test]
    fn build_records_relationships() {
        let container = Container::new();
        container.register_instance::<Config>(Arc::new(Config)).unwrap();
        let registration = Lifestyle::singleton().create_registration::<Repository>(&container);
        registration.build_expression().unwrap();

        let relationships = registration.relationships();
        assert_eq!(relationships.len(), 1);
        assert_eq!(relationships[0].implementation_type(), TypeInfo::of::<Repository>());
        assert_eq!(relationships[0].dependency().service_type(), &ServiceType::of::<Config>());
    }

    #[test]
    fn missing_parameter_names_the_parameter() {
        let container = Container::new();
        let registration = Lifestyle::transient().create_registration::<Repository>(&container);

        match registration.build_expression() {
            Err(WireboxError::UnresolvableParameter(e)) => {
                assert_eq!(e.parameter, "config");
                assert_eq!(e.parameter_type, TypeInfo::of::<Config>());
                assert_eq!(e.implementation, TypeInfo::of::<Repository>());
            }
            other => panic!("expected UnresolvableParameter, got {other:?}"),
        }
    }

    #[test]
    fn singleton_factory_runs_on_first_use_only() {
        let container = Container::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let registration = Lifestyle::singleton().create_factory_registration::<Config, _>(&container, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Config))
        });

        let expression = registration.build_expression().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let ctx = crate::registry::ResolveContext::new(&container, None);
        expression.evaluate(&ctx).unwrap();
        expression.evaluate(&ctx).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn suppression_needs_a_justification() {
        let container = Container::new();
        let registration = Lifestyle::transient().create_registration::<Repository>(&container);

        assert!(registration
            .suppress_diagnostic_warning(DiagnosticType::LifestyleMismatch, "  ")
            .is_err());
        registration
            .suppress_diagnostic_warning(DiagnosticType::LifestyleMismatch, "stateless")
            .unwrap();
        assert!(registration.is_suppressed(DiagnosticType::LifestyleMismatch));
        assert!(!registration.is_suppressed(DiagnosticType::DisposableTransientComponent));
    }

    #[test]
    fn dropped_container_is_reported() {
        let registration = {
            let container = Container::new();
            Lifestyle::transient().create_registration::<Repository>(&container)
        };
        assert!(matches!(
            registration.build_expression(),
            Err(WireboxError::ContainerDisposed { .. })
        ));
    }
}
