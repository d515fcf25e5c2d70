//! Container configuration.

use std::fmt;
use std::sync::Arc;

use crate::behaviors::{
    ConstructorSelector, DefaultDependencyResolver, DependencyResolver, NoPropertyInjection, PropertySelector,
    SingleConstructor,
};
use crate::lifestyle::Lifestyle;

/// Options a [`Container`](crate::container::Container) is created with.
///
/// ```
/// use wirebox_container::behaviors::MostResolvableParameters;
/// use wirebox_container::container::Container;
/// use wirebox_container::lifestyle::Lifestyle;
/// use wirebox_container::options::ContainerOptions;
///
/// let container = Container::with_options(
///     ContainerOptions::new()
///         .allow_override(true)
///         .default_lifestyle(Lifestyle::singleton())
///         .constructor_selector(MostResolvableParameters),
/// );
/// assert!(container.options().allows_override());
/// ```
#[derive(Clone)]
pub struct ContainerOptions {
    allow_override: bool,
    default_lifestyle: Lifestyle,
    constructor_selector: Arc<dyn ConstructorSelector>,
    dependency_resolver: Arc<dyn DependencyResolver>,
    property_selector: Arc<dyn PropertySelector>,
    suppress_lifestyle_mismatch_verification: bool,
}

impl ContainerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow overriding previously registered services.
    pub fn allow_override(mut self, allow: bool) -> Self {
        self.allow_override = allow;
        self
    }

    /// Lifestyle used by [`Container::register`](crate::container::Container::register).
    pub fn default_lifestyle(mut self, lifestyle: Lifestyle) -> Self {
        self.default_lifestyle = lifestyle;
        self
    }

    pub fn constructor_selector(mut self, selector: impl ConstructorSelector + 'static) -> Self {
        self.constructor_selector = Arc::new(selector);
        self
    }

    pub fn dependency_resolver(mut self, resolver: impl DependencyResolver + 'static) -> Self {
        self.dependency_resolver = Arc::new(resolver);
        self
    }

    pub fn property_selector(mut self, selector: impl PropertySelector + 'static) -> Self {
        self.property_selector = Arc::new(selector);
        self
    }

    /// Report lifestyle mismatches as warnings only, even when verifying
    /// with diagnostics.
    pub fn suppress_lifestyle_mismatch_verification(mut self, suppress: bool) -> Self {
        self.suppress_lifestyle_mismatch_verification = suppress;
        self
    }

    #[inline]
    pub fn allows_override(&self) -> bool {
        self.allow_override
    }

    #[inline]
    pub fn lifestyle(&self) -> &Lifestyle {
        &self.default_lifestyle
    }

    #[inline]
    pub fn lifestyle_mismatches_suppressed(&self) -> bool {
        self.suppress_lifestyle_mismatch_verification
    }

    pub(crate) fn selector(&self) -> Arc<dyn ConstructorSelector> {
        self.constructor_selector.clone()
    }

    pub(crate) fn resolver(&self) -> Arc<dyn DependencyResolver> {
        self.dependency_resolver.clone()
    }

    pub(crate) fn properties(&self) -> Arc<dyn PropertySelector> {
        self.property_selector.clone()
    }

    pub(crate) fn set_selector(&mut self, selector: Arc<dyn ConstructorSelector>) {
        self.constructor_selector = selector;
    }

    pub(crate) fn set_resolver(&mut self, resolver: Arc<dyn DependencyResolver>) {
        self.dependency_resolver = resolver;
    }

    pub(crate) fn set_properties(&mut self, selector: Arc<dyn PropertySelector>) {
        self.property_selector = selector;
    }
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            allow_override: false,
            default_lifestyle: Lifestyle::transient(),
            constructor_selector: Arc::new(SingleConstructor),
            dependency_resolver: Arc::new(DefaultDependencyResolver),
            property_selector: Arc::new(NoPropertyInjection),
            suppress_lifestyle_mismatch_verification: false,
        }
    }
}

impl fmt::Debug for ContainerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerOptions")
            .field("allow_override", &self.allow_override)
            .field("default_lifestyle", &self.default_lifestyle)
            .field(
                "suppress_lifestyle_mismatch_verification",
                &self.suppress_lifestyle_mismatch_verification,
            )
            .finish_non_exhaustive()
    }
}
