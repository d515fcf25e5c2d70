//! Resolution behaviors: pluggable strategies consulted while a registration
//! builds its expression.
//!
//! - [`ConstructorSelector`] picks the constructor of an implementation.
//! - [`DependencyResolver`] finds the producer for each parameter.
//! - [`PropertySelector`] decides which properties are injected.
//!
//! Behaviors are set through [`ContainerOptions`](crate::options::ContainerOptions)
//! or the setters on [`Container`], before the first registration.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::component::{ConstructorInfo, Parameter, ParameterKind, PropertyInfo};
use crate::container::Container;
use crate::error::{Result, UnresolvableParameterError, WireboxError};
use crate::key::{ServiceType, TypeInfo};
use crate::producer::InstanceProducer;
use crate::service::{Instance, Service, into_instance};

/// The parameter or property a dependency is injected into.
#[derive(Clone, Debug)]
pub enum InjectionTarget {
    Parameter(Parameter),
    Property(PropertyInfo),
}

/// A dependency together with the component that consumes it.
#[derive(Clone, Debug)]
pub struct InjectionConsumer {
    implementation: TypeInfo,
    target: InjectionTarget,
}

impl InjectionConsumer {
    pub fn parameter(implementation: TypeInfo, parameter: Parameter) -> Self {
        Self {
            implementation,
            target: InjectionTarget::Parameter(parameter),
        }
    }

    pub fn property(implementation: TypeInfo, property: PropertyInfo) -> Self {
        Self {
            implementation,
            target: InjectionTarget::Property(property),
        }
    }

    /// The consuming implementation.
    #[inline]
    pub fn implementation_type(&self) -> TypeInfo {
        self.implementation
    }

    #[inline]
    pub fn target(&self) -> &InjectionTarget {
        &self.target
    }

    pub fn name(&self) -> &'static str {
        match &self.target {
            InjectionTarget::Parameter(parameter) => parameter.name(),
            InjectionTarget::Property(property) => property.name(),
        }
    }

    /// The service the consumer asks for.
    pub fn service_type(&self) -> &ServiceType {
        match &self.target {
            InjectionTarget::Parameter(parameter) => parameter.service_type(),
            InjectionTarget::Property(property) => property.service_type(),
        }
    }

    /// Properties are always required once selected.
    pub fn kind(&self) -> ParameterKind {
        match &self.target {
            InjectionTarget::Parameter(parameter) => parameter.kind(),
            InjectionTarget::Property(_) => ParameterKind::Required,
        }
    }
}

/// Picks the constructor used to create an implementation.
pub trait ConstructorSelector: Send + Sync {
    /// Returns the index of the chosen constructor.
    ///
    /// # Errors
    /// [`WireboxError::NoConstructor`] or
    /// [`WireboxError::AmbiguousConstructor`] when no unique constructor
    /// qualifies.
    fn select_constructor(
        &self,
        implementation: TypeInfo,
        constructors: &[ConstructorInfo],
        container: &Container,
    ) -> Result<usize>;
}

/// Requires exactly one constructor. The default.
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleConstructor;

impl ConstructorSelector for SingleConstructor {
    fn select_constructor(
        &self,
        implementation: TypeInfo,
        constructors: &[ConstructorInfo],
        _container: &Container,
    ) -> Result<usize> {
        match constructors.len() {
            1 => Ok(0),
            0 => Err(no_constructors(implementation)),
            count => Err(WireboxError::NoConstructor {
                implementation,
                reason: format!("it should have exactly one public constructor, but it has {count}"),
            }),
        }
    }
}

/// Picks the constructor with the most parameters; a tie is an error.
#[derive(Debug, Default, Clone, Copy)]
pub struct MostParameters;

impl ConstructorSelector for MostParameters {
    fn select_constructor(
        &self,
        implementation: TypeInfo,
        constructors: &[ConstructorInfo],
        _container: &Container,
    ) -> Result<usize> {
        longest(implementation, constructors, 0..constructors.len())
    }
}

/// Picks the longest constructor whose parameters can all be resolved.
///
/// Before the container is locked dependency availability is not known yet,
/// so this behaves like [`MostParameters`].
#[derive(Debug, Default, Clone, Copy)]
pub struct MostResolvableParameters;

impl ConstructorSelector for MostResolvableParameters {
    fn select_constructor(
        &self,
        implementation: TypeInfo,
        constructors: &[ConstructorInfo],
        container: &Container,
    ) -> Result<usize> {
        if !container.is_locked() {
            return MostParameters.select_constructor(implementation, constructors, container);
        }
        if constructors.is_empty() {
            return Err(no_constructors(implementation));
        }

        let resolvable: Vec<usize> = constructors
            .iter()
            .enumerate()
            .filter(|(_, constructor)| {
                constructor
                    .parameters()
                    .iter()
                    .all(|parameter| is_resolvable(implementation, parameter, container))
            })
            .map(|(index, _)| index)
            .collect();

        if resolvable.is_empty() {
            return Err(WireboxError::NoConstructor {
                implementation,
                reason: "none of its constructors has only resolvable parameters".into(),
            });
        }
        longest(implementation, constructors, resolvable.into_iter())
    }
}

fn is_resolvable(implementation: TypeInfo, parameter: &Parameter, container: &Container) -> bool {
    match parameter.kind() {
        ParameterKind::Optional | ParameterKind::Collection => true,
        ParameterKind::Required => {
            let consumer = InjectionConsumer::parameter(implementation, parameter.clone());
            matches!(
                container.dependency_resolver().get_producer(&consumer, container, false),
                Ok(Some(_))
            )
        }
    }
}

fn longest(
    implementation: TypeInfo,
    constructors: &[ConstructorInfo],
    candidates: impl Iterator<Item = usize>,
) -> Result<usize> {
    let candidates: Vec<usize> = candidates.collect();
    let Some(max) = candidates
        .iter()
        .map(|&index| constructors[index].parameters().len())
        .max()
    else {
        return Err(no_constructors(implementation));
    };

    let longest: Vec<usize> = candidates
        .into_iter()
        .filter(|&index| constructors[index].parameters().len() == max)
        .collect();
    match longest.as_slice() {
        [index] => Ok(*index),
        tied => Err(WireboxError::AmbiguousConstructor {
            implementation,
            count: tied.len(),
            parameters: max,
        }),
    }
}

fn no_constructors(implementation: TypeInfo) -> WireboxError {
    WireboxError::NoConstructor {
        implementation,
        reason: "it declares no constructors".into(),
    }
}

/// Finds the producer that satisfies a dependency.
///
/// Implementations may wrap another resolver and defer to it for the
/// dependencies they do not handle.
pub trait DependencyResolver: Send + Sync {
    /// Returns the producer for `consumer`.
    ///
    /// With `throw_on_failure` a required dependency that can't be resolved
    /// is an error; without it the result is `Ok(None)`.
    fn get_producer(
        &self,
        consumer: &InjectionConsumer,
        container: &Container,
        throw_on_failure: bool,
    ) -> Result<Option<Arc<InstanceProducer>>>;
}

/// Resolves dependencies from the container's registrations.
///
/// Collection parameters get the collection of their element service,
/// optional parameters an absent value when the service is unknown.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDependencyResolver;

impl DependencyResolver for DefaultDependencyResolver {
    fn get_producer(
        &self,
        consumer: &InjectionConsumer,
        container: &Container,
        throw_on_failure: bool,
    ) -> Result<Option<Arc<InstanceProducer>>> {
        let service_type = consumer.service_type();

        if consumer.kind() == ParameterKind::Collection {
            return container.collection_producer(service_type).map(Some);
        }

        match container.find_producer(service_type, Some(consumer))? {
            Some(producer) => Ok(Some(producer)),
            None if consumer.kind() == ParameterKind::Optional => {
                trace!(
                    implementation = %consumer.implementation_type(),
                    parameter = consumer.name(),
                    "Optional dependency is not registered"
                );
                Ok(Some(InstanceProducer::absent(*service_type, container)))
            }
            None if throw_on_failure => Err(WireboxError::UnresolvableParameter(
                UnresolvableParameterError {
                    implementation: consumer.implementation_type(),
                    parameter: consumer.name(),
                    parameter_type: service_type.info(),
                },
            )),
            None => Ok(None),
        }
    }
}

/// Injects configuration values into parameters by name, deferring every
/// other dependency to an inner resolver.
///
/// ```
/// use std::sync::Arc;
/// use wirebox_container::behaviors::{ConfigurationValueResolver, DefaultDependencyResolver};
///
/// let resolver = ConfigurationValueResolver::new(Arc::new(DefaultDependencyResolver))
///     .with_value::<String>("connection_string", Arc::new("sqlite::memory:".into()))
///     .with_value::<u16>("port", Arc::new(8080));
/// assert_eq!(resolver.len(), 2);
/// ```
pub struct ConfigurationValueResolver {
    inner: Arc<dyn DependencyResolver>,
    values: HashMap<&'static str, (TypeInfo, Instance)>,
}

impl ConfigurationValueResolver {
    pub fn new(inner: Arc<dyn DependencyResolver>) -> Self {
        Self {
            inner,
            values: HashMap::new(),
        }
    }

    /// Supplies `value` to every parameter named `name` of type `V`.
    pub fn with_value<V: ?Sized + Service>(mut self, name: &'static str, value: Arc<V>) -> Self {
        self.values.insert(name, (TypeInfo::of::<V>(), into_instance(value)));
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl DependencyResolver for ConfigurationValueResolver {
    fn get_producer(
        &self,
        consumer: &InjectionConsumer,
        container: &Container,
        throw_on_failure: bool,
    ) -> Result<Option<Arc<InstanceProducer>>> {
        match self.values.get(consumer.name()) {
            Some((info, value)) if *info == consumer.service_type().info() => {
                trace!(
                    implementation = %consumer.implementation_type(),
                    parameter = consumer.name(),
                    "Injecting configuration value"
                );
                Ok(Some(InstanceProducer::constant(
                    *consumer.service_type(),
                    value.clone(),
                    container,
                )))
            }
            _ => self.inner.get_producer(consumer, container, throw_on_failure),
        }
    }
}

impl fmt::Debug for ConfigurationValueResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.values.keys().copied().collect();
        names.sort_unstable();
        f.debug_struct("ConfigurationValueResolver")
            .field("values", &names)
            .finish()
    }
}

/// Decides which properties are injected after construction.
pub trait PropertySelector: Send + Sync {
    fn select_property(&self, consumer: &InjectionConsumer, container: &Container) -> bool;
}

/// Injects no properties. The default.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPropertyInjection;

impl PropertySelector for NoPropertyInjection {
    fn select_property(&self, _consumer: &InjectionConsumer, _container: &Container) -> bool {
        false
    }
}

/// Injects properties declared with [`Property::marked`](crate::component::Property::marked).
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkedProperties;

impl PropertySelector for MarkedProperties {
    fn select_property(&self, consumer: &InjectionConsumer, _container: &Container) -> bool {
        matches!(consumer.target(), InjectionTarget::Property(property) if property.is_marked())
    }
}

/// Injects properties whose name satisfies a predicate.
pub struct ConventionProperties {
    convention: Box<dyn Fn(&str) -> bool + Send + Sync>,
}

impl ConventionProperties {
    pub fn new(convention: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            convention: Box::new(convention),
        }
    }
}

impl PropertySelector for ConventionProperties {
    fn select_property(&self, consumer: &InjectionConsumer, _container: &Container) -> bool {
        (self.convention)(consumer.name())
    }
}

impl fmt::Debug for ConventionProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConventionProperties")
    }
}

/// Injects every property whose service can be resolved.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegisteredProperties;

impl PropertySelector for RegisteredProperties {
    fn select_property(&self, consumer: &InjectionConsumer, container: &Container) -> bool {
        matches!(container.find_producer(consumer.service_type(), Some(consumer)), Ok(Some(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, Constructor, Property};

    struct Port;
    struct Host;

    struct Listener;

    impl Component for Listener {
        fn constructors() -> Vec<Constructor<Self>> {
            vec![
                Constructor::named("bare", |_| Ok(Listener)),
                Constructor::named("with_port", |_| Ok(Listener)).param::<Port>("port"),
                Constructor::named("with_host", |_| Ok(Listener)).param::<Host>("host"),
                Constructor::named("full", |_| Ok(Listener))
                    .param::<Port>("port")
                    .param::<Host>("host"),
            ]
        }

        fn properties() -> Vec<Property<Self>> {
            vec![
                Property::new::<Port>("port", |_: &mut Listener, _| {}).marked(),
                Property::new::<Host>("host_override", |_: &mut Listener, _| {}),
            ]
        }
    }

    fn constructors() -> Vec<ConstructorInfo> {
        Listener::constructors().iter().map(|c| c.info().clone()).collect()
    }

    fn property_consumers() -> Vec<InjectionConsumer> {
        Listener::properties()
            .iter()
            .map(|p| InjectionConsumer::property(TypeInfo::of::<Listener>(), p.info().clone()))
            .collect()
    }

    #[test]
    fn single_constructor_rejects_many() {
        let container = Container::new();
        let err = SingleConstructor
            .select_constructor(TypeInfo::of::<Listener>(), &constructors(), &container)
            .err()
            .unwrap();
        assert!(matches!(err, WireboxError::NoConstructor { .. }));
    }

    #[test]
    fn most_parameters_picks_the_longest() {
        let container = Container::new();
        let index = MostParameters
            .select_constructor(TypeInfo::of::<Listener>(), &constructors(), &container)
            .unwrap();
        assert_eq!(constructors()[index].name(), "full");
    }

    #[test]
    fn most_parameters_fails_on_a_tie() {
        let container = Container::new();
        let tied = &constructors()[1..3];
        match MostParameters.select_constructor(TypeInfo::of::<Listener>(), tied, &container) {
            Err(WireboxError::AmbiguousConstructor { count, parameters, .. }) => {
                assert_eq!(count, 2);
                assert_eq!(parameters, 1);
            }
            other => panic!("expected AmbiguousConstructor, got {other:?}"),
        }
    }

    #[test]
    fn most_resolvable_falls_back_before_lock() {
        let container = Container::new();
        let index = MostResolvableParameters
            .select_constructor(TypeInfo::of::<Listener>(), &constructors(), &container)
            .unwrap();
        assert_eq!(constructors()[index].name(), "full");
    }

    #[test]
    fn most_resolvable_skips_unresolvable_constructors() {
        let container = Container::new();
        container.register_instance::<Port>(Arc::new(Port)).unwrap();
        container.lock();

        let index = MostResolvableParameters
            .select_constructor(TypeInfo::of::<Listener>(), &constructors(), &container)
            .unwrap();
        assert_eq!(constructors()[index].name(), "with_port");
    }

    #[test]
    fn default_resolver_raises_for_required_parameters() {
        let container = Container::new();
        container.lock();
        let parameter = constructors()[1].parameters()[0].clone();
        let consumer = InjectionConsumer::parameter(TypeInfo::of::<Listener>(), parameter);

        assert!(matches!(
            DefaultDependencyResolver.get_producer(&consumer, &container, false),
            Ok(None)
        ));
        match DefaultDependencyResolver.get_producer(&consumer, &container, true) {
            Err(WireboxError::UnresolvableParameter(e)) => assert_eq!(e.parameter, "port"),
            other => panic!("expected UnresolvableParameter, got {other:?}"),
        }
    }

    #[test]
    fn configuration_values_match_name_and_type() {
        struct Gateway;
        impl Component for Gateway {
            fn constructors() -> Vec<Constructor<Self>> {
                vec![
                    Constructor::new(|_| Ok(Gateway))
                        .param::<String>("connection_string")
                        .param::<u32>("connection_string"),
                ]
            }
        }

        let container = Container::new();
        container.lock();
        let resolver = ConfigurationValueResolver::new(Arc::new(DefaultDependencyResolver))
            .with_value::<String>("connection_string", Arc::new("db".into()));
        let parameters = Gateway::constructors()[0].info().parameters().to_vec();

        let matching = InjectionConsumer::parameter(TypeInfo::of::<Gateway>(), parameters[0].clone());
        let producer = resolver.get_producer(&matching, &container, true).unwrap().unwrap();
        assert_eq!(*producer.get::<String>().unwrap(), "db");

        let wrong_type = InjectionConsumer::parameter(TypeInfo::of::<Gateway>(), parameters[1].clone());
        assert!(resolver.get_producer(&wrong_type, &container, true).is_err());
    }

    #[test]
    fn property_selectors() {
        let container = Container::new();
        container.register_instance::<Host>(Arc::new(Host)).unwrap();
        let consumers = property_consumers();

        assert!(!NoPropertyInjection.select_property(&consumers[0], &container));
        assert!(MarkedProperties.select_property(&consumers[0], &container));
        assert!(!MarkedProperties.select_property(&consumers[1], &container));

        let convention = ConventionProperties::new(|name| name.ends_with("_override"));
        assert!(!convention.select_property(&consumers[0], &container));
        assert!(convention.select_property(&consumers[1], &container));

        container.lock();
        assert!(!RegisteredProperties.select_property(&consumers[0], &container));
        assert!(RegisteredProperties.select_property(&consumers[1], &container));
    }
}
