//! Decorators: registrations that wrap the instances of a service.
//!
//! Decorators run on a producer's `ExpressionBuilt` step in registration
//! order. Each applicable decorator wraps the expression produced so far, so
//! the last registered decorator ends up outermost.
//!
//! A decorator has exactly one constructor with exactly one parameter of
//! the decorated service; that parameter receives the decoratee. Other
//! parameters are resolved like any other dependency.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::component::{Activator, Component, ParameterKind, activator_for};
use crate::container::Container;
use crate::error::{Result, WireboxError};
use crate::expression::Expression;
use crate::key::{GenericDefinition, ServiceType, TypeInfo};
use crate::lifestyle::Lifestyle;
use crate::producer::InstanceProducer;
use crate::registration::{next_id, resolve_dependencies};
use crate::service::{Converter, Implements, Service, converter};

/// What a decorator predicate sees for one producer.
pub struct DecoratorPredicateContext {
    service_type: ServiceType,
    implementation_type: TypeInfo,
    applied_decorators: Vec<TypeInfo>,
    expression: Expression,
}

impl DecoratorPredicateContext {
    /// The closed service being decorated.
    #[inline]
    pub fn service_type(&self) -> &ServiceType {
        &self.service_type
    }

    /// The implementation behind the decorated producer.
    #[inline]
    pub fn implementation_type(&self) -> TypeInfo {
        self.implementation_type
    }

    /// Decorators already applied, innermost first.
    #[inline]
    pub fn applied_decorators(&self) -> &[TypeInfo] {
        &self.applied_decorators
    }

    /// The expression built so far, including earlier decorators.
    #[inline]
    pub fn expression(&self) -> &Expression {
        &self.expression
    }
}

/// Decides whether a decorator applies.
pub type DecoratorPredicate = Arc<dyn Fn(&DecoratorPredicateContext) -> bool + Send + Sync>;

enum Target {
    Closed {
        service_type: ServiceType,
        activator: Arc<dyn Activator>,
        converter: Option<Converter>,
    },
    Open {
        service: GenericDefinition,
        decorator: GenericDefinition,
    },
}

/// A validated decorator registration.
pub struct DecoratorRegistration {
    target: Target,
    lifestyle: Lifestyle,
    predicate: Option<DecoratorPredicate>,
}

impl DecoratorRegistration {
    /// Decorator `D` for service `S`.
    ///
    /// # Errors
    /// [`WireboxError::InvalidDecorator`] if `D` does not have the decorator
    /// shape.
    pub(crate) fn closed<S, D>(lifestyle: Lifestyle, predicate: Option<DecoratorPredicate>) -> Result<Self>
    where
        S: ?Sized + Service,
        D: Component + Implements<S>,
    {
        let service_type = ServiceType::of::<S>();
        let activator = activator_for::<D>();
        decoratee_position(activator.as_ref(), &service_type)?;

        Ok(Self {
            target: Target::Closed {
                service_type,
                activator,
                converter: converter::<S, D>(),
            },
            lifestyle,
            predicate,
        })
    }

    /// Open decorator `decorator` for every closed type of `service`.
    ///
    /// The constructor shape is checked when the decorator is closed; the
    /// arity is checked here.
    pub(crate) fn open(
        service: GenericDefinition,
        decorator: GenericDefinition,
        lifestyle: Lifestyle,
        predicate: Option<DecoratorPredicate>,
    ) -> Result<Self> {
        if service.arity() == 0 {
            return Err(WireboxError::InvalidDecorator {
                decorator: decorator.to_string(),
                service: service.to_string(),
                reason: "the decorated service is not an open generic definition".into(),
            });
        }
        if service.arity() != decorator.arity() {
            return Err(WireboxError::InvalidDecorator {
                decorator: decorator.to_string(),
                service: service.to_string(),
                reason: format!(
                    "the decorator has {} type parameters, but the service has {}",
                    decorator.arity(),
                    service.arity()
                ),
            });
        }

        Ok(Self {
            target: Target::Open { service, decorator },
            lifestyle,
            predicate,
        })
    }

    #[inline]
    pub fn lifestyle(&self) -> &Lifestyle {
        &self.lifestyle
    }

    /// Wraps `expression` if this decorator applies to `producer`.
    pub(crate) fn apply(
        &self,
        producer: &InstanceProducer,
        container: &Container,
        expression: Expression,
        applied: &mut Vec<TypeInfo>,
    ) -> Result<Expression> {
        let service_type = *producer.service_type();

        let (activator, converter) = match &self.target {
            Target::Closed {
                service_type: target,
                activator,
                converter,
            } => {
                if *target != service_type {
                    return Ok(expression);
                }
                (activator.clone(), converter.clone())
            }
            Target::Open { service, decorator } => {
                if service_type.definition() != Some(*service) {
                    return Ok(expression);
                }
                let component = service_type
                    .generic()
                    .and_then(|info| info.component(*decorator).cloned());
                let Some(component) = component else {
                    trace!(service = %service_type, decorator = %decorator, "No closed shape for the decorator");
                    return Ok(expression);
                };
                (component.activator(), component.converter())
            }
        };
        let decorator = activator.implementation();

        if let Some(predicate) = &self.predicate {
            let context = DecoratorPredicateContext {
                service_type,
                implementation_type: producer.implementation_type(),
                applied_decorators: applied.clone(),
                expression: expression.clone(),
            };
            if !predicate(&context) {
                trace!(service = %service_type, decorator = %decorator, "Decorator predicate declined");
                return Ok(expression);
            }
        }

        let position = decoratee_position(activator.as_ref(), &service_type)?;
        let constructors = activator.constructors();
        let constructor = constructors.first().ok_or_else(|| WireboxError::NoConstructor {
            implementation: decorator,
            reason: "it declares no constructors".into(),
        })?;

        let dependencies = resolve_dependencies(
            container,
            decorator,
            &self.lifestyle,
            constructor,
            &activator.properties(),
            Some((position, &expression)),
        )?;
        let raw = activator.new_instance(0, dependencies.arguments, dependencies.properties)?;
        producer.registration().record(dependencies.relationships);

        let mut decorated = self.lifestyle.apply(raw, next_id(), activator.disposer());
        if let Some(converter) = converter {
            decorated = Expression::convert(service_type.info(), decorated, converter);
        }

        debug!(
            service = %service_type,
            decorator = %decorator,
            lifestyle = %self.lifestyle,
            "Applied decorator"
        );
        applied.push(decorator);
        Ok(decorated)
    }
}

impl fmt::Debug for DecoratorRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Target::Closed {
                service_type,
                activator,
                ..
            } => write!(f, "{} decorates {}", activator.implementation(), service_type),
            Target::Open { service, decorator } => write!(f, "{decorator} decorates {service}"),
        }
    }
}

/// Position of the decoratee parameter in the decorator's only constructor.
fn decoratee_position(activator: &dyn Activator, service_type: &ServiceType) -> Result<usize> {
    let invalid = |reason: String| WireboxError::InvalidDecorator {
        decorator: activator.implementation().type_name().to_string(),
        service: service_type.type_name().to_string(),
        reason,
    };

    let constructors = activator.constructors();
    let [constructor] = constructors.as_slice() else {
        return Err(invalid(format!(
            "it must have exactly one public constructor, but it has {}",
            constructors.len()
        )));
    };

    let positions: Vec<usize> = constructor
        .parameters()
        .iter()
        .enumerate()
        .filter(|(_, p)| p.service_type() == service_type && p.kind() == ParameterKind::Required)
        .map(|(index, _)| index)
        .collect();

    match positions.as_slice() {
        [position] => Ok(*position),
        [] => Err(invalid(format!(
            "its constructor has no parameter of type {}",
            service_type.info().short_name()
        ))),
        many => Err(invalid(format!(
            "its constructor has {} parameters of type {}; exactly one is allowed",
            many.len(),
            service_type.info().short_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Constructor;

    trait Sink: Send + Sync {}
    crate::service!(dyn Sink);

    struct Buffered {
        _inner: Arc<dyn Sink>,
    }
    impl Sink for Buffered {}
    crate::implements!(Buffered => dyn Sink);

    impl Component for Buffered {
        fn constructors() -> Vec<Constructor<Self>> {
            vec![Constructor::new(|args| Ok(Buffered { _inner: args.get(0)? })).param::<dyn Sink>("inner")]
        }
    }

    struct NoDecoratee;
    impl Sink for NoDecoratee {}
    crate::implements!(NoDecoratee => dyn Sink);

    impl Component for NoDecoratee {
        fn constructors() -> Vec<Constructor<Self>> {
            vec![Constructor::new(|_| Ok(NoDecoratee)).param::<String>("name")]
        }
    }

    struct TwoConstructors;
    impl Sink for TwoConstructors {}
    crate::implements!(TwoConstructors => dyn Sink);

    impl Component for TwoConstructors {
        fn constructors() -> Vec<Constructor<Self>> {
            vec![
                Constructor::new(|_| Ok(TwoConstructors)).param::<dyn Sink>("inner"),
                Constructor::named("other", |_| Ok(TwoConstructors)).param::<dyn Sink>("inner"),
            ]
        }
    }

    struct Pair<A, B>(A, B);
    struct Single<A>(A);

    #[test]
    fn valid_decorator_is_accepted() {
        assert!(DecoratorRegistration::closed::<dyn Sink, Buffered>(Lifestyle::transient(), None).is_ok());
    }

    #[test]
    fn decorator_without_decoratee_is_rejected() {
        let err = DecoratorRegistration::closed::<dyn Sink, NoDecoratee>(Lifestyle::transient(), None)
            .err()
            .unwrap();
        assert!(matches!(err, WireboxError::InvalidDecorator { .. }));
        assert!(err.to_string().contains("no parameter of type"));
    }

    #[test]
    fn decorator_with_two_constructors_is_rejected() {
        let err = DecoratorRegistration::closed::<dyn Sink, TwoConstructors>(Lifestyle::transient(), None)
            .err()
            .unwrap();
        assert!(err.to_string().contains("exactly one public constructor"));
    }

    #[test]
    fn open_decorator_arity_must_match() {
        let service = GenericDefinition::of::<Pair<(), ()>>();
        assert!(DecoratorRegistration::open(service, GenericDefinition::of::<Pair<u8, u8>>(), Lifestyle::transient(), None).is_ok());

        let err = DecoratorRegistration::open(service, GenericDefinition::of::<Single<()>>(), Lifestyle::transient(), None)
            .err()
            .unwrap();
        assert!(matches!(err, WireboxError::InvalidDecorator { .. }));
    }

    #[test]
    fn open_decorator_needs_a_generic_service() {
        let err = DecoratorRegistration::open(
            GenericDefinition::of::<String>(),
            GenericDefinition::of::<String>(),
            Lifestyle::transient(),
            None,
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("not an open generic definition"));
    }
}
