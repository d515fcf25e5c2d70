//! Type identities used throughout the container.
//!
//! [`TypeInfo`] identifies any Rust type. [`ServiceType`] identifies a
//! requested service together with its kind (single service or collection)
//! and lazily describes its generic shape. [`GenericDefinition`] identifies an
//! open generic type: the path without type arguments plus the arity.

use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use wirebox_support::type_names::{generic_definition, shorten_type_name};

use crate::collection::{self, AllInstances};
use crate::container::ContainerInner;
use crate::expression::Factory;
use crate::generic::GenericInfo;
use crate::scope::Scope;
use crate::service::{Instance, Service};

/// Identifies a Rust type by [`TypeId`], keeping its name for messages.
///
/// # Examples
/// ```
/// use wirebox_container::key::TypeInfo;
///
/// let info = TypeInfo::of::<String>();
/// assert_eq!(info.type_name(), "alloc::string::String");
/// assert_eq!(info.short_name(), "String");
/// ```
#[derive(Clone, Copy)]
pub struct TypeInfo {
    type_id: TypeId,
    type_name: &'static str,
}

impl TypeInfo {
    /// Creates the identity of type `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the fully qualified type name.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns the type name with module paths stripped.
    pub fn short_name(&self) -> String {
        shorten_type_name(self.type_name)
    }

    /// Returns the open generic definition this type closes, if generic.
    pub fn definition(&self) -> Option<GenericDefinition> {
        let definition = GenericDefinition::from_name(self.type_name);
        (definition.arity() > 0).then_some(definition)
    }
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for TypeInfo {}

impl Hash for TypeInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeInfo({})", self.type_name)
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

/// An open generic type: a path with its type arguments removed.
///
/// `dyn app::Handler<i32>` and `dyn app::Handler<String>` share the
/// definition `app::Handler/1`. A definition never equals a closed type.
///
/// ```
/// use wirebox_container::key::GenericDefinition;
///
/// struct Repository<T>(T);
///
/// let a = GenericDefinition::of::<Repository<i32>>();
/// let b = GenericDefinition::of::<Repository<String>>();
/// assert_eq!(a, b);
/// assert_eq!(a.arity(), 1);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenericDefinition {
    name: &'static str,
    arity: usize,
}

impl GenericDefinition {
    /// Returns the definition of `T`, using any closed instantiation of it.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::from_name(type_name::<T>())
    }

    fn from_name(full_name: &'static str) -> Self {
        let (name, arity) = generic_definition(full_name);
        Self { name, arity }
    }

    /// Returns the path of the definition.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the number of type parameters.
    #[inline]
    pub fn arity(&self) -> usize {
        self.arity
    }
}

impl fmt::Debug for GenericDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GenericDefinition({}/{})", self.name, self.arity)
    }
}

impl fmt::Display for GenericDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let placeholders = vec!["_"; self.arity].join(", ");
        write!(f, "{}<{}>", self.name, placeholders)
    }
}

pub(crate) type Assemble = fn(Vec<Factory>, Weak<ContainerInner>, Option<Arc<Scope>>) -> Instance;

#[derive(Clone, Copy)]
pub(crate) enum ServiceKind {
    Single {
        describe: fn() -> Option<GenericInfo>,
    },
    Collection {
        element: TypeInfo,
        describe: fn() -> Option<GenericInfo>,
        assemble: Assemble,
    },
}

/// A requested service: its type plus whether it is a single service or a
/// collection of services.
#[derive(Clone, Copy)]
pub struct ServiceType {
    info: TypeInfo,
    kind: ServiceKind,
}

impl ServiceType {
    /// The service type for `S`, usually a `dyn Trait`.
    pub fn of<S: ?Sized + Service>() -> Self {
        Self {
            info: TypeInfo::of::<S>(),
            kind: ServiceKind::Single {
                describe: describe::<S>,
            },
        }
    }

    /// The service type for a collection of `S`, resolved as [`AllInstances<S>`].
    pub fn collection_of<S: ?Sized + Service>() -> Self {
        Self {
            info: TypeInfo::of::<AllInstances<S>>(),
            kind: ServiceKind::Collection {
                element: TypeInfo::of::<S>(),
                describe: describe::<S>,
                assemble: collection::assemble::<S>,
            },
        }
    }

    #[inline]
    pub fn info(&self) -> TypeInfo {
        self.info
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.info.type_id
    }

    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.info.type_name
    }

    pub fn is_collection(&self) -> bool {
        matches!(self.kind, ServiceKind::Collection { .. })
    }

    /// For a collection, the element service type.
    pub fn element(&self) -> Option<ServiceType> {
        match self.kind {
            ServiceKind::Collection {
                element, describe, ..
            } => Some(ServiceType {
                info: element,
                kind: ServiceKind::Single { describe },
            }),
            ServiceKind::Single { .. } => None,
        }
    }

    /// The generic shape declared by the service, if any.
    pub fn generic(&self) -> Option<GenericInfo> {
        match self.kind {
            ServiceKind::Single { describe } => describe(),
            ServiceKind::Collection { .. } => None,
        }
    }

    /// The open generic definition of the service, derived from its name.
    pub fn definition(&self) -> Option<GenericDefinition> {
        self.info.definition()
    }

    pub(crate) fn assembler(&self) -> Option<Assemble> {
        match self.kind {
            ServiceKind::Collection { assemble, .. } => Some(assemble),
            ServiceKind::Single { .. } => None,
        }
    }
}

fn describe<S: ?Sized + Service>() -> Option<GenericInfo> {
    S::generic().map(|generic| generic.into_info())
}

impl PartialEq for ServiceType {
    fn eq(&self, other: &Self) -> bool {
        self.info == other.info
    }
}

impl Eq for ServiceType {}

impl Hash for ServiceType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.info.hash(state);
    }
}

impl fmt::Debug for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceType({})", self.info.type_name)
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.info.type_name)
    }
}
