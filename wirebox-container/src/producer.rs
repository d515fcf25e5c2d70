//! Instance producers: a service type paired with a registration.
//!
//! The producer memoizes two things: the decorated expression and the
//! factory composed from it. Both are built once; every later call returns
//! the same value.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::trace;

use crate::circular::CycleGuard;
use crate::container::Container;
use crate::error::{Result, WireboxError};
use crate::expression::{Expression, Factory};
use crate::key::{ServiceType, TypeInfo};
use crate::lifestyle::Lifestyle;
use crate::registration::{Registration, next_id};
use crate::registry::ResolveContext;
use crate::scope::Scope;
use crate::service::{Converter, Implements, Instance, Service, converter, from_instance};

/// Produces instances of one service type from one registration.
pub struct InstanceProducer {
    id: u64,
    service_type: ServiceType,
    registration: Arc<Registration>,
    converter: Option<Converter>,
    expression: OnceCell<Expression>,
    factory: OnceCell<Factory>,
    decorators: OnceCell<Vec<TypeInfo>>,
    ad_hoc: bool,
}

impl InstanceProducer {
    /// Pairs service `S` with a registration whose implementation is `I`.
    ///
    /// # Errors
    /// [`WireboxError::TypeMismatch`] if the registration does not create `I`.
    pub fn new<S, I>(registration: Arc<Registration>) -> Result<Arc<Self>>
    where
        S: ?Sized + Service,
        I: Implements<S>,
    {
        let implementation = TypeInfo::of::<I>();
        if registration.implementation_type() != implementation {
            return Err(WireboxError::TypeMismatch {
                expected: implementation,
                context: format!("registration creates {}", registration.implementation_type()),
            });
        }
        Ok(Self::with_converter(
            ServiceType::of::<S>(),
            registration,
            converter::<S, I>(),
        ))
    }

    pub(crate) fn with_converter(
        service_type: ServiceType,
        registration: Arc<Registration>,
        converter: Option<Converter>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: next_id(),
            service_type,
            registration,
            converter,
            expression: OnceCell::new(),
            factory: OnceCell::new(),
            decorators: OnceCell::new(),
            ad_hoc: false,
        })
    }

    /// A producer outside the service table, yielding a fixed expression.
    /// Not decorated and not recorded as a relationship.
    fn ad_hoc(service_type: ServiceType, expression: Expression, container: &Container) -> Arc<Self> {
        let registration = Registration::expression(expression.clone(), Lifestyle::transient(), container);
        Arc::new(Self {
            id: next_id(),
            service_type,
            registration,
            converter: None,
            expression: OnceCell::with_value(expression),
            factory: OnceCell::new(),
            decorators: OnceCell::with_value(Vec::new()),
            ad_hoc: true,
        })
    }

    /// Placeholder for an optional dependency that is not registered.
    pub(crate) fn absent(service_type: ServiceType, container: &Container) -> Arc<Self> {
        Self::ad_hoc(service_type, Expression::absent(service_type.info()), container)
    }

    /// A fixed value, e.g. a configuration value matched by convention.
    pub(crate) fn constant(service_type: ServiceType, instance: Instance, container: &Container) -> Arc<Self> {
        Self::ad_hoc(
            service_type,
            Expression::constant(service_type.info(), instance),
            container,
        )
    }

    #[inline]
    pub fn service_type(&self) -> &ServiceType {
        &self.service_type
    }

    #[inline]
    pub fn registration(&self) -> &Arc<Registration> {
        &self.registration
    }

    #[inline]
    pub fn implementation_type(&self) -> TypeInfo {
        self.registration.implementation_type()
    }

    #[inline]
    pub fn lifestyle(&self) -> &Lifestyle {
        self.registration.lifestyle()
    }

    pub(crate) fn is_ad_hoc(&self) -> bool {
        self.ad_hoc
    }

    pub fn is_built(&self) -> bool {
        self.expression.get().is_some()
    }

    /// The decorators applied to this producer, innermost first. Empty until
    /// the expression is built.
    pub fn applied_decorators(&self) -> Vec<TypeInfo> {
        self.decorators.get().cloned().unwrap_or_default()
    }

    /// The decorated expression, built on first call. Locks the container.
    pub fn build_expression(&self) -> Result<Expression> {
        if let Some(expression) = self.expression.get() {
            return Ok(expression.clone());
        }

        let container = self.registration.container()?;
        container.lock();

        let _guard = CycleGuard::enter(self.id, self.service_type.info())?;
        self.expression
            .get_or_try_init(|| self.build(&container))
            .cloned()
    }

    fn build(&self, container: &Container) -> Result<Expression> {
        let mut expression = self.registration.build_expression()?;
        if let Some(converter) = &self.converter {
            expression = Expression::convert(self.service_type.info(), expression, converter.clone());
        }

        let (expression, decorators) = container.notify_expression_built(self, expression)?;
        trace!(
            service = %self.service_type,
            implementation = %self.implementation_type(),
            decorators = decorators.len(),
            "Built producer expression"
        );
        let _ = self.decorators.set(decorators);
        Ok(expression)
    }

    /// The composed factory, compiled from the expression on first call.
    pub(crate) fn factory(&self) -> Result<Factory> {
        if let Some(factory) = self.factory.get() {
            return Ok(factory.clone());
        }
        let expression = self.build_expression()?;
        Ok(self.factory.get_or_init(|| expression.compile()).clone())
    }

    /// Creates or fetches an instance in the calling thread's ambient scope.
    pub fn get_instance(&self) -> Result<Instance> {
        let container = self.registration.container()?;
        let factory = self.factory()?;
        factory(&ResolveContext::new(&container, None))
    }

    /// Creates or fetches an instance with `scope` as the active scope.
    pub fn get_instance_in(&self, scope: &Arc<Scope>) -> Result<Instance> {
        let container = self.registration.container()?;
        let factory = self.factory()?;
        factory(&ResolveContext::new(&container, Some(scope)))
    }

    /// Typed [`get_instance`](Self::get_instance).
    pub fn get<S: ?Sized + Service>(&self) -> Result<Arc<S>> {
        from_instance::<S>(&self.get_instance()?)
    }
}

impl fmt::Debug for InstanceProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceProducer")
            .field("service_type", &self.service_type)
            .field("implementation", &self.implementation_type())
            .field("lifestyle", self.lifestyle())
            .field("built", &self.is_built())
            .finish()
    }
}
