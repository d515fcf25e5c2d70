//! Error types for Wirebox container operations.
//!
//! Configuration errors are raised by the offending `register*` call,
//! activation errors by `get_instance`/`verify`. Every message names the
//! types involved and ends with a hint.

use std::fmt;

use wirebox_support::rendering::{ChainEntry, render_chain, render_lifestyle_chain, render_list};

use crate::key::TypeInfo;

/// Main error type for all Wirebox operations.
#[derive(Debug, thiserror::Error)]
pub enum WireboxError {
    /// Requested service was never registered and no unregistered-type
    /// handler could supply it.
    #[error("{}", .0)]
    NotRegistered(NotRegisteredError),

    /// A constructor parameter could not be resolved.
    #[error("{}", .0)]
    UnresolvableParameter(UnresolvableParameterError),

    /// Circular dependency detected while building or resolving.
    #[error("{}", .0)]
    CircularDependency(CircularDependencyError),

    /// The object graph nests deeper than the build stack allows.
    #[error("Building {service} exceeded the maximum graph depth of {depth}")]
    DepthExceeded { service: TypeInfo, depth: usize },

    /// A longer-lived component depends on a shorter-lived one.
    #[error("{}", .0)]
    LifestyleMismatch(LifestyleMismatchError),

    /// Service was already registered and overriding is disabled.
    #[error("{}", .0)]
    AlreadyRegistered(AlreadyRegisteredError),

    /// The container was locked by its first resolution.
    #[error(
        "The container can't be changed after the first call to get_instance, get_all_instances, get_registration or verify (attempted: {operation})\n  Hint: Move all registrations before the first resolution"
    )]
    ContainerLocked { operation: &'static str },

    /// A resolution behavior was replaced after registrations were made.
    #[error(
        "The {behavior} can only be replaced before the first registration is made\n  Hint: Configure behaviors through ContainerOptions"
    )]
    BehaviorLocked { behavior: &'static str },

    /// The implementation has no usable constructor.
    #[error("For {implementation} to be resolved, it must have a usable constructor: {reason}")]
    NoConstructor {
        implementation: TypeInfo,
        reason: String,
    },

    /// Several constructors qualify and the selector demands a unique one.
    #[error(
        "{implementation} contains {count} constructors with {parameters} parameters; the constructor to use can't be determined\n  Hint: Remove the ambiguity or pick another constructor selector"
    )]
    AmbiguousConstructor {
        implementation: TypeInfo,
        count: usize,
        parameters: usize,
    },

    /// A decorator does not have the required shape.
    #[error("Decorator {decorator} can't decorate {service}: {reason}")]
    InvalidDecorator {
        decorator: String,
        service: String,
        reason: String,
    },

    /// A registration call was malformed.
    #[error("Invalid registration for {service}: {reason}")]
    InvalidRegistration { service: String, reason: String },

    /// A scoped service was requested outside of any scope.
    #[error(
        "{service} is registered as Scoped, but the instance is requested outside the context of an active scope\n  Hint: Resolve it inside container.begin_scope() or pass a scope explicitly"
    )]
    NoActiveScope { service: TypeInfo },

    /// The scope the instance was requested from has already ended.
    #[error("The scope was disposed; {service} can't be resolved from it")]
    ScopeDisposed { service: TypeInfo },

    /// More than one registered service is assignable to a variant request.
    #[error(
        "There is more than one registration assignable to {service}: {}\n  Hint: Register {service} explicitly",
        render_list(&.candidates.iter().map(TypeInfo::type_name).collect::<Vec<_>>())
    )]
    AmbiguousVariant {
        service: TypeInfo,
        candidates: Vec<TypeInfo>,
    },

    /// More than one conditional registration applies to a consumer.
    #[error(
        "Multiple conditional registrations for {service} are applicable{}: {}",
        .consumer.map(|c| format!(" to {c}")).unwrap_or_default(),
        render_list(&.candidates.iter().map(TypeInfo::type_name).collect::<Vec<_>>())
    )]
    AmbiguousConditional {
        service: TypeInfo,
        consumer: Option<TypeInfo>,
        candidates: Vec<TypeInfo>,
    },

    /// Two unregistered-type handlers tried to supply the same service.
    #[error(
        "Multiple handlers of the unregistered-type event registered a producer for {service}\n  Hint: Make sure only one handler or open generic registration applies"
    )]
    UnregisteredTypeConflict { service: TypeInfo },

    /// A factory returned an error during construction.
    #[error("Failed to construct {service}: {source}")]
    ConstructionFailed {
        service: TypeInfo,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A resolved value was not of the expected type.
    #[error("Type mismatch: expected {expected} ({context})")]
    TypeMismatch {
        expected: TypeInfo,
        context: String,
    },

    /// The container owning a registration was dropped.
    #[error("The container that owns {service} has been dropped")]
    ContainerDisposed { service: TypeInfo },

    /// Verification of a registration failed.
    #[error("Verification of {service} failed: {source}")]
    Verification {
        service: TypeInfo,
        #[source]
        source: Box<WireboxError>,
    },
}

impl WireboxError {
    /// Wraps any error raised by user code as a construction failure.
    pub fn construction<E>(service: TypeInfo, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        WireboxError::ConstructionFailed {
            service,
            source: source.into(),
        }
    }

    /// Strips [`WireboxError::Verification`] wrappers.
    pub fn root_cause(&self) -> &WireboxError {
        match self {
            WireboxError::Verification { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Error when a service was not registered.
#[derive(Debug)]
pub struct NotRegisteredError {
    /// The service that was requested
    pub requested: TypeInfo,
    /// Registered services with similar names
    pub suggestions: Vec<String>,
}

impl fmt::Display for NotRegisteredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "No registration for type {} could be found", self.requested)?;

        if !self.suggestions.is_empty() {
            write!(f, "\n  Did you mean one of:")?;
            for suggestion in &self.suggestions {
                write!(f, "\n    - {suggestion}")?;
            }
        }

        write!(
            f,
            "\n  Hint: Did you forget to register {}?",
            self.requested.short_name()
        )
    }
}

/// Error when a constructor parameter can't be resolved.
#[derive(Debug)]
pub struct UnresolvableParameterError {
    /// Type declaring the constructor
    pub implementation: TypeInfo,
    /// Name of the parameter (or property)
    pub parameter: &'static str,
    /// Type of the parameter
    pub parameter_type: TypeInfo,
}

impl fmt::Display for UnresolvableParameterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "The constructor of type {} contains the parameter with name '{}' and type {}, which can't be resolved",
            self.implementation, self.parameter, self.parameter_type,
        )?;
        write!(
            f,
            "\n  Hint: Register {} or declare the parameter optional",
            self.parameter_type.short_name()
        )
    }
}

/// Error when a circular dependency is detected.
#[derive(Debug)]
pub struct CircularDependencyError {
    /// The chain of types that forms the cycle, first and last equal.
    pub chain: Vec<TypeInfo>,
}

impl fmt::Display for CircularDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.chain.iter().map(TypeInfo::type_name).collect();
        write!(f, "Circular dependency detected:\n  {}", render_chain(&names))?;
        write!(
            f,
            "\n  Hint: Break the cycle, e.g. by depending on a factory or a collection"
        )
    }
}

/// Error when a component depends on a shorter-lived dependency.
#[derive(Debug)]
pub struct LifestyleMismatchError {
    pub consumer: TypeInfo,
    pub consumer_lifestyle: String,
    pub dependency: TypeInfo,
    pub dependency_lifestyle: String,
}

impl fmt::Display for LifestyleMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Lifestyle mismatch: {} ({}) depends on {} ({})",
            self.consumer, self.consumer_lifestyle, self.dependency, self.dependency_lifestyle,
        )?;
        let chain = [
            ChainEntry {
                type_name: self.consumer.type_name().to_string(),
                lifestyle: self.consumer_lifestyle.clone(),
            },
            ChainEntry {
                type_name: self.dependency.type_name().to_string(),
                lifestyle: self.dependency_lifestyle.clone(),
            },
        ];
        write!(f, "{}", render_lifestyle_chain(&chain))?;
        write!(
            f,
            "  Hint: Give {} a lifestyle at least as long as {}",
            self.dependency.short_name(),
            self.consumer_lifestyle,
        )
    }
}

/// Error when trying to register a service that already exists.
#[derive(Debug)]
pub struct AlreadyRegisteredError {
    pub service: String,
}

impl fmt::Display for AlreadyRegisteredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type {} has already been registered", self.service)?;
        write!(
            f,
            "\n  Hint: Enable allow_override in ContainerOptions, or use a collection or conditional registration"
        )
    }
}

/// Convenient Result type for Wirebox operations.
pub type Result<T> = std::result::Result<T, WireboxError>;
