//! Container events.
//!
//! - `ResolveUnregisteredType` fires once per unregistered service type and
//!   lets a handler supply a registration for it.
//! - `ExpressionBuilding` fires for every raw creation expression, before the
//!   lifestyle is applied.
//! - `ExpressionBuilt` fires for every producer expression, after the
//!   lifestyle is applied. Decorators run as part of this step.

use std::fmt;
use std::sync::Arc;

use crate::container::Container;
use crate::decorator::DecoratorRegistration;
use crate::error::{Result, WireboxError};
use crate::expression::Expression;
use crate::generic::OpenGenericRegistration;
use crate::key::{ServiceType, TypeInfo};
use crate::lifestyle::Lifestyle;
use crate::producer::InstanceProducer;
use crate::registration::Registration;

/// Arguments of the `ResolveUnregisteredType` event.
pub struct UnregisteredTypeEventArgs<'a> {
    service_type: ServiceType,
    container: &'a Container,
    producer: Option<Arc<InstanceProducer>>,
}

impl<'a> UnregisteredTypeEventArgs<'a> {
    pub(crate) fn new(service_type: ServiceType, container: &'a Container) -> Self {
        Self {
            service_type,
            container,
            producer: None,
        }
    }

    /// The requested service.
    #[inline]
    pub fn service_type(&self) -> &ServiceType {
        &self.service_type
    }

    #[inline]
    pub fn container(&self) -> &Container {
        self.container
    }

    /// Whether a handler already supplied a registration.
    pub fn handled(&self) -> bool {
        self.producer.is_some()
    }

    /// Supplies an expression for the requested service. It is built once
    /// and evaluated on every request; any caching is up to the expression.
    ///
    /// # Errors
    /// [`WireboxError::TypeMismatch`] if the expression does not produce the
    /// requested service, [`WireboxError::UnregisteredTypeConflict`] if a
    /// registration was already supplied.
    pub fn register(&mut self, expression: Expression) -> Result<()> {
        expression.expect_produces(self.service_type.info())?;
        let registration = Registration::expression(expression, Lifestyle::transient(), self.container);
        self.register_registration(registration)
    }

    /// Supplies a registration that creates the requested service itself.
    pub fn register_registration(&mut self, registration: Arc<Registration>) -> Result<()> {
        if registration.implementation_type() != self.service_type.info() {
            return Err(WireboxError::TypeMismatch {
                expected: self.service_type.info(),
                context: format!("registration creates {}", registration.implementation_type()),
            });
        }
        let producer = InstanceProducer::with_converter(self.service_type, registration, None);
        self.register_producer(producer)
    }

    pub(crate) fn register_producer(&mut self, producer: Arc<InstanceProducer>) -> Result<()> {
        if self.producer.is_some() {
            return Err(WireboxError::UnregisteredTypeConflict {
                service: self.service_type.info(),
            });
        }
        self.producer = Some(producer);
        Ok(())
    }

    pub(crate) fn into_producer(self) -> Option<Arc<InstanceProducer>> {
        self.producer
    }
}

/// Arguments of the `ExpressionBuilding` event.
pub struct ExpressionBuildingEventArgs {
    registration_id: u64,
    implementation: TypeInfo,
    lifestyle: Lifestyle,
    expression: Expression,
}

impl ExpressionBuildingEventArgs {
    pub(crate) fn new(registration: &Registration, expression: Expression) -> Self {
        Self {
            registration_id: registration.id(),
            implementation: registration.implementation_type(),
            lifestyle: registration.lifestyle().clone(),
            expression,
        }
    }

    pub fn registration_id(&self) -> u64 {
        self.registration_id
    }

    #[inline]
    pub fn implementation_type(&self) -> TypeInfo {
        self.implementation
    }

    pub fn lifestyle(&self) -> &Lifestyle {
        &self.lifestyle
    }

    #[inline]
    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    /// Replaces the expression. It must still produce the implementation.
    pub fn set_expression(&mut self, expression: Expression) -> Result<()> {
        expression.expect_produces(self.implementation)?;
        self.expression = expression;
        Ok(())
    }

    pub(crate) fn into_expression(self) -> Expression {
        self.expression
    }
}

/// Arguments of the `ExpressionBuilt` event.
pub struct ExpressionBuiltEventArgs {
    service_type: ServiceType,
    implementation: TypeInfo,
    lifestyle: Lifestyle,
    expression: Expression,
}

impl ExpressionBuiltEventArgs {
    pub(crate) fn new(producer: &InstanceProducer, expression: Expression) -> Self {
        Self {
            service_type: *producer.service_type(),
            implementation: producer.implementation_type(),
            lifestyle: producer.lifestyle().clone(),
            expression,
        }
    }

    #[inline]
    pub fn service_type(&self) -> &ServiceType {
        &self.service_type
    }

    #[inline]
    pub fn implementation_type(&self) -> TypeInfo {
        self.implementation
    }

    pub fn lifestyle(&self) -> &Lifestyle {
        &self.lifestyle
    }

    #[inline]
    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    /// Replaces the expression. It must still produce the service.
    pub fn set_expression(&mut self, expression: Expression) -> Result<()> {
        expression.expect_produces(self.service_type.info())?;
        self.expression = expression;
        Ok(())
    }

    pub(crate) fn into_expression(self) -> Expression {
        self.expression
    }
}

pub type UnregisteredTypeObserver = Arc<dyn Fn(&mut UnregisteredTypeEventArgs<'_>) -> Result<()> + Send + Sync>;

pub type ExpressionBuildingObserver = Arc<dyn Fn(&mut ExpressionBuildingEventArgs) -> Result<()> + Send + Sync>;

pub type ExpressionBuiltObserver = Arc<dyn Fn(&mut ExpressionBuiltEventArgs) -> Result<()> + Send + Sync>;

/// A participant of the `ResolveUnregisteredType` event, in registration
/// order.
#[derive(Clone)]
pub(crate) enum UnregisteredHandler {
    OpenGeneric(OpenGenericRegistration),
    Observer(UnregisteredTypeObserver),
}

impl UnregisteredHandler {
    pub fn handle(&self, args: &mut UnregisteredTypeEventArgs<'_>) -> Result<()> {
        match self {
            UnregisteredHandler::OpenGeneric(open) => {
                if args.handled() {
                    return Ok(());
                }
                let closed = open.close(args.service_type(), args.container())?;
                match closed {
                    Some(producer) => args.register_producer(producer),
                    None => Ok(()),
                }
            }
            UnregisteredHandler::Observer(observer) => observer(args),
        }
    }
}

impl fmt::Debug for UnregisteredHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnregisteredHandler::OpenGeneric(open) => write!(f, "OpenGeneric({open:?})"),
            UnregisteredHandler::Observer(_) => f.write_str("Observer"),
        }
    }
}

/// A participant of the `ExpressionBuilt` event, in registration order.
#[derive(Clone)]
pub(crate) enum BuiltHandler {
    Decorator(Arc<DecoratorRegistration>),
    Observer(ExpressionBuiltObserver),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_checks_the_produced_type() {
        let container = Container::new();
        let mut args = UnregisteredTypeEventArgs::new(ServiceType::of::<String>(), &container);

        let wrong = Expression::value::<u8>(Arc::new(1));
        assert!(matches!(args.register(wrong), Err(WireboxError::TypeMismatch { .. })));
        assert!(!args.handled());

        args.register(Expression::value::<String>(Arc::new("x".into()))).unwrap();
        assert!(args.handled());
    }

    #[test]
    fn second_registration_conflicts() {
        let container = Container::new();
        let mut args = UnregisteredTypeEventArgs::new(ServiceType::of::<String>(), &container);

        args.register(Expression::value::<String>(Arc::new("a".into()))).unwrap();
        let err = args
            .register(Expression::value::<String>(Arc::new("b".into())))
            .err()
            .unwrap();
        assert!(matches!(err, WireboxError::UnregisteredTypeConflict { .. }));
    }

    #[test]
    fn built_args_keep_the_service_type() {
        let container = Container::new();
        let registration = Lifestyle::transient().create_factory_registration::<String, _>(&container, |_| {
            Ok(Arc::new("core".to_string()))
        });
        let producer = InstanceProducer::with_converter(ServiceType::of::<String>(), registration, None);

        let mut args = ExpressionBuiltEventArgs::new(&producer, Expression::value::<String>(Arc::new("v".into())));
        assert!(args.set_expression(Expression::value::<u8>(Arc::new(0))).is_err());

        let wrapped = args.expression().map::<String, _>(|s| s);
        args.set_expression(wrapped.clone()).unwrap();
        assert!(Expression::ptr_eq(args.expression(), &wrapped));
        assert_eq!(args.lifestyle(), &Lifestyle::transient());
    }
}
