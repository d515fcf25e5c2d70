//! Component descriptors.
//!
//! Rust has no runtime reflection, so an implementation type describes how
//! it is built by implementing [`Component`]: its constructors with their
//! ordered parameters, optional injectable properties and an optional
//! disposal hook.
//!
//! ```
//! use std::sync::Arc;
//! use wirebox_container::component::{Component, Constructor};
//!
//! struct Clock;
//! struct Greeter {
//!     clock: Arc<Clock>,
//! }
//!
//! impl Component for Greeter {
//!     fn constructors() -> Vec<Constructor<Self>> {
//!         vec![Constructor::new(|args| Ok(Greeter { clock: args.get(0)? })).param::<Clock>("clock")]
//!     }
//! }
//!
//! let constructors = Greeter::constructors();
//! assert_eq!(constructors[0].info().parameters().len(), 1);
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::collection::AllInstances;
use crate::error::{Result, WireboxError};
use crate::expression::{Expression, Factory, factory_fn};
use crate::key::{ServiceType, TypeInfo};
use crate::scope::Disposer;
use crate::service::{Instance, Service, from_instance, into_instance, is_absent};

/// An implementation type the container can construct.
pub trait Component: Send + Sync + Sized + 'static {
    /// The public constructors of the type.
    fn constructors() -> Vec<Constructor<Self>>;

    /// Properties that a property selector may inject after construction.
    fn properties() -> Vec<Property<Self>> {
        Vec::new()
    }

    /// Called when a scope that cached an instance of this type ends.
    fn disposal() -> Option<fn(&Self)> {
        None
    }
}

/// How a constructor parameter is satisfied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParameterKind {
    /// Must resolve, otherwise activation fails.
    Required,
    /// Receives an absent value when not registered.
    Optional,
    /// Receives every registered instance of the element service.
    Collection,
}

/// A constructor parameter.
#[derive(Clone, Debug)]
pub struct Parameter {
    name: &'static str,
    service_type: ServiceType,
    kind: ParameterKind,
}

impl Parameter {
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The service requested for this parameter. For collection parameters
    /// this is the collection service type.
    #[inline]
    pub fn service_type(&self) -> &ServiceType {
        &self.service_type
    }

    #[inline]
    pub fn kind(&self) -> ParameterKind {
        self.kind
    }
}

/// Name and parameters of a constructor.
#[derive(Clone, Debug)]
pub struct ConstructorInfo {
    name: &'static str,
    parameters: Vec<Parameter>,
}

impl ConstructorInfo {
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }
}

type ConstructorBody<T> = Arc<dyn Fn(&Arguments) -> Result<T> + Send + Sync>;

/// A constructor of `T`: ordered parameters plus the closure that builds
/// the value from resolved [`Arguments`].
pub struct Constructor<T> {
    info: ConstructorInfo,
    body: ConstructorBody<T>,
}

impl<T: 'static> Constructor<T> {
    /// A constructor named `new`.
    pub fn new(body: impl Fn(&Arguments) -> Result<T> + Send + Sync + 'static) -> Self {
        Self::named("new", body)
    }

    pub fn named(
        name: &'static str,
        body: impl Fn(&Arguments) -> Result<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            info: ConstructorInfo {
                name,
                parameters: Vec::new(),
            },
            body: Arc::new(body),
        }
    }

    /// Appends a required parameter of service `S`.
    pub fn param<S: ?Sized + Service>(self, name: &'static str) -> Self {
        self.push(name, ServiceType::of::<S>(), ParameterKind::Required)
    }

    /// Appends an optional parameter of service `S`.
    pub fn optional<S: ?Sized + Service>(self, name: &'static str) -> Self {
        self.push(name, ServiceType::of::<S>(), ParameterKind::Optional)
    }

    /// Appends a parameter receiving all registered `S` instances.
    pub fn collection<S: ?Sized + Service>(self, name: &'static str) -> Self {
        self.push(name, ServiceType::collection_of::<S>(), ParameterKind::Collection)
    }

    fn push(mut self, name: &'static str, service_type: ServiceType, kind: ParameterKind) -> Self {
        self.info.parameters.push(Parameter {
            name,
            service_type,
            kind,
        });
        self
    }

    #[inline]
    pub fn info(&self) -> &ConstructorInfo {
        &self.info
    }
}

impl<T> fmt::Debug for Constructor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constructor").field("info", &self.info).finish()
    }
}

/// Resolved constructor arguments, in parameter order.
pub struct Arguments {
    implementation: TypeInfo,
    parameters: Arc<[Parameter]>,
    values: Vec<Instance>,
}

impl Arguments {
    fn slot(&self, index: usize) -> Result<&Instance> {
        self.values.get(index).ok_or_else(|| WireboxError::TypeMismatch {
            expected: self.implementation,
            context: format!(
                "constructor argument {index} requested, but only {} parameters are declared",
                self.values.len()
            ),
        })
    }

    fn mismatch(&self, index: usize, error: WireboxError) -> WireboxError {
        match (error, self.parameters.get(index)) {
            (WireboxError::TypeMismatch { expected, .. }, Some(parameter)) => WireboxError::TypeMismatch {
                expected,
                context: format!(
                    "argument '{}' of {} is declared as {}",
                    parameter.name,
                    self.implementation.short_name(),
                    parameter.service_type
                ),
            },
            (error, _) => error,
        }
    }

    /// The required dependency at `index`.
    pub fn get<S: ?Sized + Service>(&self, index: usize) -> Result<Arc<S>> {
        from_instance::<S>(self.slot(index)?).map_err(|e| self.mismatch(index, e))
    }

    /// The optional dependency at `index`.
    pub fn optional<S: ?Sized + Service>(&self, index: usize) -> Result<Option<Arc<S>>> {
        let instance = self.slot(index)?;
        if is_absent(instance) {
            return Ok(None);
        }
        from_instance::<S>(instance)
            .map(Some)
            .map_err(|e| self.mismatch(index, e))
    }

    /// The collection dependency at `index`.
    pub fn all<S: ?Sized + Service>(&self, index: usize) -> Result<AllInstances<S>> {
        from_instance::<AllInstances<S>>(self.slot(index)?)
            .map(|all| (*all).clone())
            .map_err(|e| self.mismatch(index, e))
    }

    /// A cloned value dependency at `index`.
    pub fn value<V: Clone + Send + Sync + 'static>(&self, index: usize) -> Result<V> {
        self.get::<V>(index).map(|value| (*value).clone())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Name and service of an injectable property.
#[derive(Clone, Debug)]
pub struct PropertyInfo {
    name: &'static str,
    service_type: ServiceType,
    marked: bool,
}

impl PropertyInfo {
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn service_type(&self) -> &ServiceType {
        &self.service_type
    }

    /// Whether the property carries the inject marker.
    #[inline]
    pub fn is_marked(&self) -> bool {
        self.marked
    }
}

type Setter<T> = Arc<dyn Fn(&mut T, &Instance) -> Result<()> + Send + Sync>;

/// A settable property of `T`.
pub struct Property<T> {
    info: PropertyInfo,
    setter: Setter<T>,
}

impl<T: 'static> Property<T> {
    pub fn new<S: ?Sized + Service>(
        name: &'static str,
        set: impl Fn(&mut T, Arc<S>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            info: PropertyInfo {
                name,
                service_type: ServiceType::of::<S>(),
                marked: false,
            },
            setter: Arc::new(move |target, instance| {
                set(target, from_instance::<S>(instance)?);
                Ok(())
            }),
        }
    }

    /// Marks the property for injection by [`MarkedProperties`](crate::behaviors::MarkedProperties).
    pub fn marked(mut self) -> Self {
        self.info.marked = true;
        self
    }

    #[inline]
    pub fn info(&self) -> &PropertyInfo {
        &self.info
    }
}

/// Type-erased access to a [`Component`].
pub(crate) trait Activator: Send + Sync {
    fn implementation(&self) -> TypeInfo;

    fn constructors(&self) -> Vec<ConstructorInfo>;

    fn properties(&self) -> Vec<PropertyInfo>;

    /// Builds the `New` expression for the constructor at `constructor`.
    fn new_instance(
        &self,
        constructor: usize,
        arguments: Vec<Expression>,
        properties: Vec<(usize, Expression)>,
    ) -> Result<Expression>;

    fn disposer(&self) -> Option<Disposer>;
}

struct TypedActivator<I>(PhantomData<fn() -> I>);

pub(crate) fn activator_for<I: Component>() -> Arc<dyn Activator> {
    Arc::new(TypedActivator::<I>(PhantomData))
}

impl<I: Component> Activator for TypedActivator<I> {
    fn implementation(&self) -> TypeInfo {
        TypeInfo::of::<I>()
    }

    fn constructors(&self) -> Vec<ConstructorInfo> {
        I::constructors().into_iter().map(|c| c.info).collect()
    }

    fn properties(&self) -> Vec<PropertyInfo> {
        I::properties().into_iter().map(|p| p.info).collect()
    }

    fn new_instance(
        &self,
        constructor: usize,
        arguments: Vec<Expression>,
        properties: Vec<(usize, Expression)>,
    ) -> Result<Expression> {
        let implementation = TypeInfo::of::<I>();
        let mut constructors = I::constructors();
        if constructor >= constructors.len() {
            return Err(WireboxError::NoConstructor {
                implementation,
                reason: format!("constructor #{constructor} does not exist"),
            });
        }
        let Constructor { info, body } = constructors.swap_remove(constructor);

        let declared = I::properties();
        let mut setters: Vec<(Setter<I>, Factory)> = Vec::with_capacity(properties.len());
        let mut injected = Vec::with_capacity(properties.len());
        for (index, expression) in properties {
            let property = declared.get(index).ok_or_else(|| WireboxError::TypeMismatch {
                expected: implementation,
                context: format!("property #{index} does not exist"),
            })?;
            setters.push((property.setter.clone(), expression.compile()));
            injected.push((property.info.name, expression));
        }

        let argument_factories: Vec<Factory> = arguments.iter().map(Expression::compile).collect();
        let parameters: Arc<[Parameter]> = info.parameters.into();

        let factory = factory_fn(move |ctx| {
            let mut values = Vec::with_capacity(argument_factories.len());
            for argument in &argument_factories {
                values.push(argument(ctx)?);
            }
            let arguments = Arguments {
                implementation,
                parameters: parameters.clone(),
                values,
            };
            let mut value = body(&arguments)?;
            for (setter, property) in &setters {
                setter(&mut value, &property(ctx)?)?;
            }
            Ok(into_instance::<I>(Arc::new(value)))
        });

        Ok(Expression::new_instance(
            implementation,
            info.name,
            arguments,
            injected,
            factory,
        ))
    }

    fn disposer(&self) -> Option<Disposer> {
        let dispose = I::disposal()?;
        Some(Arc::new(move |instance: &Instance| {
            if let Ok(value) = from_instance::<I>(instance) {
                dispose(&value);
            }
        }))
    }
}
