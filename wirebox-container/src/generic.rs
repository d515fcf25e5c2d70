//! Open generic services.
//!
//! Rust types are closed at compile time, so a generic service trait object
//! describes its closed shapes through [`Service::generic`]: the type
//! arguments, the implementations known for those arguments, and the
//! variant services it can be converted from.
//!
//! ```
//! use std::sync::Arc;
//! use wirebox_container::component::{Component, Constructor};
//! use wirebox_container::generic::GenericService;
//! use wirebox_container::key::{GenericDefinition, ServiceType};
//! use wirebox_container::service::{Implements, Service};
//!
//! trait Repository<T>: Send + Sync {}
//!
//! struct MemoryRepository<T>(std::marker::PhantomData<fn() -> T>);
//! impl<T: 'static> Repository<T> for MemoryRepository<T> {}
//!
//! impl<T: 'static> Implements<dyn Repository<T>> for MemoryRepository<T> {
//!     fn upcast(self: Arc<Self>) -> Arc<dyn Repository<T>> { self }
//! }
//!
//! impl<T: 'static> Component for MemoryRepository<T> {
//!     fn constructors() -> Vec<Constructor<Self>> {
//!         vec![Constructor::new(|_| Ok(MemoryRepository(std::marker::PhantomData)))]
//!     }
//! }
//!
//! impl<T: 'static> Service for dyn Repository<T> {
//!     fn generic() -> Option<GenericService<Self>> {
//!         Some(GenericService::new().argument::<T>().component::<MemoryRepository<T>>())
//!     }
//! }
//!
//! let shape = ServiceType::of::<dyn Repository<u32>>().generic().unwrap();
//! assert_eq!(shape.arguments().len(), 1);
//! assert!(shape.component(GenericDefinition::of::<MemoryRepository<()>>()).is_some());
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::trace;

use crate::component::{Activator, Component, activator_for};
use crate::container::Container;
use crate::error::Result;
use crate::key::{GenericDefinition, ServiceType, TypeInfo};
use crate::lifestyle::Lifestyle;
use crate::producer::InstanceProducer;
use crate::registration::Registration;
use crate::service::{Converter, Implements, Instance, Service, converter, from_instance, into_instance};

/// Builder for the generic shape of service `S`.
pub struct GenericService<S: ?Sized> {
    arguments: Vec<TypeInfo>,
    components: Vec<ClosedComponent>,
    variants: Vec<Variant>,
    _service: PhantomData<fn() -> Arc<S>>,
}

impl<S: ?Sized + Service> GenericService<S> {
    pub fn new() -> Self {
        Self {
            arguments: Vec::new(),
            components: Vec::new(),
            variants: Vec::new(),
            _service: PhantomData,
        }
    }

    /// Appends a type argument of the service.
    pub fn argument<T: ?Sized + 'static>(mut self) -> Self {
        self.arguments.push(TypeInfo::of::<T>());
        self
    }

    /// Declares a closed implementation (or decorator) of `S`.
    pub fn component<I>(mut self) -> Self
    where
        I: Component + Implements<S>,
    {
        self.components.push(ClosedComponent {
            definition: GenericDefinition::of::<I>(),
            implementation: TypeInfo::of::<I>(),
            activator: activator_for::<I>,
            converter: converter::<S, I>(),
        });
        self
    }

    /// Declares that a registered `V` can satisfy requests for `S`.
    pub fn variant<V: ?Sized + Service>(mut self, convert: fn(Arc<V>) -> Arc<S>) -> Self {
        self.variants.push(Variant {
            service: ServiceType::of::<V>(),
            converter: Arc::new(move |instance: Instance| -> Result<Instance> {
                Ok(into_instance::<S>(convert(from_instance::<V>(&instance)?)))
            }),
        });
        self
    }

    /// Erases the service type.
    pub fn into_info(self) -> GenericInfo {
        GenericInfo {
            service: TypeInfo::of::<S>(),
            definition: GenericDefinition::of::<S>(),
            arguments: self.arguments,
            components: self.components,
            variants: self.variants,
        }
    }
}

impl<S: ?Sized + Service> Default for GenericService<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// A closed implementation shape declared by a generic service.
#[derive(Clone)]
pub struct ClosedComponent {
    definition: GenericDefinition,
    implementation: TypeInfo,
    activator: fn() -> Arc<dyn Activator>,
    converter: Option<Converter>,
}

impl ClosedComponent {
    #[inline]
    pub fn definition(&self) -> GenericDefinition {
        self.definition
    }

    #[inline]
    pub fn implementation_type(&self) -> TypeInfo {
        self.implementation
    }

    pub(crate) fn activator(&self) -> Arc<dyn Activator> {
        (self.activator)()
    }

    pub(crate) fn converter(&self) -> Option<Converter> {
        self.converter.clone()
    }
}

impl fmt::Debug for ClosedComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClosedComponent({})", self.implementation)
    }
}

#[derive(Clone)]
pub(crate) struct Variant {
    pub service: ServiceType,
    pub converter: Converter,
}

/// The type-erased generic shape of a closed service type.
#[derive(Clone)]
pub struct GenericInfo {
    service: TypeInfo,
    definition: GenericDefinition,
    arguments: Vec<TypeInfo>,
    components: Vec<ClosedComponent>,
    variants: Vec<Variant>,
}

impl GenericInfo {
    #[inline]
    pub fn service(&self) -> TypeInfo {
        self.service
    }

    #[inline]
    pub fn definition(&self) -> GenericDefinition {
        self.definition
    }

    #[inline]
    pub fn arguments(&self) -> &[TypeInfo] {
        &self.arguments
    }

    pub fn components(&self) -> &[ClosedComponent] {
        &self.components
    }

    /// The closed shape of the implementation definition `definition`.
    pub fn component(&self, definition: GenericDefinition) -> Option<&ClosedComponent> {
        self.components.iter().find(|c| c.definition == definition)
    }

    /// Services that can be converted into this one.
    pub fn variant_services(&self) -> Vec<ServiceType> {
        self.variants.iter().map(|v| v.service).collect()
    }

    pub(crate) fn variants(&self) -> &[Variant] {
        &self.variants
    }
}

impl fmt::Debug for GenericInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericInfo")
            .field("service", &self.service)
            .field("arguments", &self.arguments)
            .field("components", &self.components)
            .field("variants", &self.variants.len())
            .finish()
    }
}

/// What an open generic predicate sees when a definition is closed.
pub struct OpenGenericContext<'a> {
    service_type: &'a ServiceType,
    implementation_type: TypeInfo,
    arguments: &'a [TypeInfo],
}

impl OpenGenericContext<'_> {
    pub fn service_type(&self) -> &ServiceType {
        self.service_type
    }

    pub fn implementation_type(&self) -> TypeInfo {
        self.implementation_type
    }

    /// The type arguments of the requested service.
    pub fn arguments(&self) -> &[TypeInfo] {
        self.arguments
    }
}

/// Decides whether an open generic registration applies to a closed type.
/// Stands in for generic constraints.
pub type OpenGenericPredicate = Arc<dyn Fn(&OpenGenericContext<'_>) -> bool + Send + Sync>;

/// Maps an open service definition to an open implementation definition.
#[derive(Clone)]
pub(crate) struct OpenGenericRegistration {
    service: GenericDefinition,
    implementation: GenericDefinition,
    lifestyle: Lifestyle,
    predicate: Option<OpenGenericPredicate>,
}

impl OpenGenericRegistration {
    pub fn new(
        service: GenericDefinition,
        implementation: GenericDefinition,
        lifestyle: Lifestyle,
        predicate: Option<OpenGenericPredicate>,
    ) -> Self {
        Self {
            service,
            implementation,
            lifestyle,
            predicate,
        }
    }

    pub fn service(&self) -> GenericDefinition {
        self.service
    }

    /// Creates a producer for `service_type` if this registration applies.
    pub fn close(&self, service_type: &ServiceType, container: &Container) -> Result<Option<Arc<InstanceProducer>>> {
        if service_type.definition() != Some(self.service) {
            return Ok(None);
        }

        let Some(info) = service_type.generic() else {
            trace!(service = %service_type, "Generic service declares no closed shapes");
            return Ok(None);
        };
        let Some(component) = info.component(self.implementation) else {
            trace!(
                service = %service_type,
                implementation = %self.implementation,
                "No closed shape for the implementation definition"
            );
            return Ok(None);
        };

        if let Some(predicate) = &self.predicate {
            let context = OpenGenericContext {
                service_type,
                implementation_type: component.implementation_type(),
                arguments: info.arguments(),
            };
            if !predicate(&context) {
                return Ok(None);
            }
        }

        trace!(
            service = %service_type,
            implementation = %component.implementation_type(),
            "Closed open generic registration"
        );
        let registration = Registration::component(component.activator(), self.lifestyle.clone(), container);
        Ok(Some(InstanceProducer::with_converter(
            *service_type,
            registration,
            component.converter(),
        )))
    }
}

impl fmt::Debug for OpenGenericRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} ({})", self.service, self.implementation, self.lifestyle)
    }
}
