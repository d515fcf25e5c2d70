//! Lifestyles decide how long a created instance is reused.
//!
//! - [`Lifestyle::transient`]: a new instance on every request
//! - [`Lifestyle::scoped`]: one instance per [`Scope`](crate::scope::Scope)
//! - [`Lifestyle::singleton`]: one instance per registration for the lifetime of the container
//! - [`Lifestyle::custom`]: a user supplied caching transform
//!
//! # Length
//! Every lifestyle has a length; a consumer should never outlive its
//! dependencies. Transient is 1, Scoped 500, Singleton 1000.
//!
//! ```
//! use wirebox_container::lifestyle::Lifestyle;
//!
//! assert!(Lifestyle::singleton().length() > Lifestyle::scoped().length());
//! assert!(Lifestyle::scoped().length() > Lifestyle::transient().length());
//! ```

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::circular::CycleGuard;
use crate::component::{Component, activator_for};
use crate::container::Container;
use crate::error::{Result, WireboxError};
use crate::expression::{Expression, Factory, factory_fn};
use crate::key::TypeInfo;
use crate::registration::{Registration, next_id};
use crate::registry::Resolver;
use crate::scope::Disposer;
use crate::service::{Instance, Service, into_instance};

/// Turns a creating factory into a caching one.
pub type Transform = Arc<dyn Fn(Factory) -> Factory + Send + Sync>;

struct CustomLifestyle {
    name: String,
    length: u32,
    transform: Transform,
}

#[derive(Clone)]
enum Kind {
    Transient,
    Scoped,
    Singleton,
    Custom(Arc<CustomLifestyle>),
}

/// Defines the lifetime of instances created for a registration.
///
/// A lifestyle holds no instances itself. The caching state is created each
/// time the lifestyle wraps a registration's expression, so two
/// registrations with the same lifestyle never share instances.
#[derive(Clone)]
pub struct Lifestyle(Kind);

impl Lifestyle {
    /// New instance on every request. Never cached.
    pub const fn transient() -> Self {
        Lifestyle(Kind::Transient)
    }

    /// One instance per scope (e.g., per request).
    ///
    /// Requesting it outside of any scope fails with
    /// [`WireboxError::NoActiveScope`].
    pub const fn scoped() -> Self {
        Lifestyle(Kind::Scoped)
    }

    /// One instance per registration, created on first use.
    ///
    /// Created at most once, even when first requested by many threads at
    /// the same time.
    pub const fn singleton() -> Self {
        Lifestyle(Kind::Singleton)
    }

    /// A lifestyle defined by a caching transform.
    ///
    /// `transform` receives the creating factory of one registration and
    /// returns the factory to use instead; it is called once per
    /// registration.
    ///
    /// ```
    /// use wirebox_container::lifestyle::Lifestyle;
    ///
    /// let passthrough = Lifestyle::custom("Passthrough", 1, |create| create);
    /// assert_eq!(passthrough.name(), "Passthrough");
    /// ```
    pub fn custom(
        name: impl Into<String>,
        length: u32,
        transform: impl Fn(Factory) -> Factory + Send + Sync + 'static,
    ) -> Self {
        Lifestyle(Kind::Custom(Arc::new(CustomLifestyle {
            name: name.into(),
            length,
            transform: Arc::new(transform),
        })))
    }

    pub fn name(&self) -> &str {
        match &self.0 {
            Kind::Transient => "Transient",
            Kind::Scoped => "Scoped",
            Kind::Singleton => "Singleton",
            Kind::Custom(custom) => &custom.name,
        }
    }

    /// Returns the ordering value (higher = longer lifetime).
    pub fn length(&self) -> u32 {
        match &self.0 {
            Kind::Transient => 1,
            Kind::Scoped => 500,
            Kind::Singleton => 1000,
            Kind::Custom(custom) => custom.length,
        }
    }

    /// Returns `true` if instances are reused.
    #[inline]
    pub fn is_cached(&self) -> bool {
        !matches!(self.0, Kind::Transient)
    }

    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self.0, Kind::Transient)
    }

    /// Creates a registration that constructs `I` through its [`Component`]
    /// descriptor.
    pub fn create_registration<I: Component>(&self, container: &Container) -> Arc<Registration> {
        Registration::component(activator_for::<I>(), self.clone(), container)
    }

    /// Creates a registration that calls `factory` to create instances.
    pub fn create_factory_registration<S, F>(&self, container: &Container, factory: F) -> Arc<Registration>
    where
        S: ?Sized + Service,
        F: Fn(&dyn Resolver) -> Result<Arc<S>> + Send + Sync + 'static,
    {
        Registration::factory(
            TypeInfo::of::<S>(),
            self.clone(),
            container,
            Arc::new(move |resolver: &dyn Resolver| -> Result<Instance> {
                Ok(into_instance(factory(resolver)?))
            }),
        )
    }

    /// Wraps a creation expression with this lifestyle's caching.
    ///
    /// `key` identifies the registration inside a scope.
    pub(crate) fn apply(&self, expression: Expression, key: u64, disposer: Option<Disposer>) -> Expression {
        match &self.0 {
            Kind::Transient => expression,
            Kind::Singleton => {
                let cell: Arc<OnceCell<Instance>> = Arc::new(OnceCell::new());
                let create = expression.compile();
                let service = expression.produces();
                let factory = factory_fn(move |ctx| cell.get_or_try_init(|| create(ctx)).cloned());
                Expression::cached(self.name(), expression, guard_reentry(service, factory))
            }
            Kind::Scoped => {
                let create = expression.compile();
                let service = expression.produces();
                let factory = factory_fn(move |ctx| {
                    let scope = ctx.scope().ok_or(WireboxError::NoActiveScope { service })?;
                    scope.get_or_create(key, service, disposer.as_ref(), || create(ctx))
                });
                Expression::cached(self.name(), expression, guard_reentry(service, factory))
            }
            Kind::Custom(custom) => {
                let service = expression.produces();
                let factory = (custom.transform)(expression.compile());
                Expression::cached(&custom.name, expression, guard_reentry(service, factory))
            }
        }
    }
}

/// A cache that is entered again while it is still creating its instance
/// would wait on itself. Report that as a cycle instead.
fn guard_reentry(service: TypeInfo, factory: Factory) -> Factory {
    let id = next_id();
    factory_fn(move |ctx| {
        let _guard = CycleGuard::enter(id, service)?;
        factory(ctx)
    })
}

impl Default for Lifestyle {
    fn default() -> Self {
        Lifestyle::transient()
    }
}

impl PartialEq for Lifestyle {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Kind::Transient, Kind::Transient)
            | (Kind::Scoped, Kind::Scoped)
            | (Kind::Singleton, Kind::Singleton) => true,
            (Kind::Custom(a), Kind::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Lifestyle {}

impl fmt::Debug for Lifestyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lifestyle({}, {})", self.name(), self.length())
    }
}

impl fmt::Display for Lifestyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::ExpressionKind;
    use crate::registry::ResolveContext;
    use crate::service::from_instance;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting() -> (Expression, Arc<AtomicUsize>) {
        let counter = Arc::new(AtomicUsize::new(0));
        let calls = counter.clone();
        let expression = Expression::from_fn::<usize, _>(move |_| Ok(Arc::new(calls.fetch_add(1, Ordering::SeqCst))));
        (expression, counter)
    }

    #[test]
    fn lifestyle_ordering() {
        assert!(Lifestyle::singleton().length() > Lifestyle::scoped().length());
        assert!(Lifestyle::scoped().length() > Lifestyle::transient().length());
    }

    #[test]
    fn lifestyle_equality() {
        assert_eq!(Lifestyle::singleton(), Lifestyle::singleton());
        assert_ne!(Lifestyle::singleton(), Lifestyle::transient());

        let custom = Lifestyle::custom("Custom", 10, |f| f);
        assert_eq!(custom, custom.clone());
        assert_ne!(custom, Lifestyle::custom("Custom", 10, |f| f));
    }

    #[test]
    fn lifestyle_display() {
        assert_eq!(Lifestyle::singleton().to_string(), "Singleton");
        assert_eq!(Lifestyle::scoped().to_string(), "Scoped");
        assert_eq!(Lifestyle::transient().to_string(), "Transient");
    }

    #[test]
    fn transient_is_not_wrapped() {
        let (expression, _) = counting();
        let applied = Lifestyle::transient().apply(expression.clone(), 1, None);
        assert!(Expression::ptr_eq(&expression, &applied));
    }

    #[test]
    fn singleton_creates_once() {
        let container = Container::new();
        let ctx = ResolveContext::new(&container, None);
        let (expression, counter) = counting();

        let applied = Lifestyle::singleton().apply(expression, 1, None);
        let a = applied.evaluate(&ctx).unwrap();
        let b = applied.evaluate(&ctx).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(matches!(applied.kind(), ExpressionKind::Cached { .. }));
    }

    #[test]
    fn each_application_has_its_own_cache() {
        let container = Container::new();
        let ctx = ResolveContext::new(&container, None);
        let (expression, _) = counting();

        let first = Lifestyle::singleton().apply(expression.clone(), 1, None);
        let second = Lifestyle::singleton().apply(expression, 2, None);
        let a = from_instance::<usize>(&first.evaluate(&ctx).unwrap()).unwrap();
        let b = from_instance::<usize>(&second.evaluate(&ctx).unwrap()).unwrap();
        assert_ne!(*a, *b);
    }

    #[test]
    fn scoped_requires_a_scope() {
        let container = Container::new();
        let ctx = ResolveContext::new(&container, None);
        let (expression, _) = counting();

        let applied = Lifestyle::scoped().apply(expression, 1, None);
        let err = applied.evaluate(&ctx).err().unwrap();
        assert!(matches!(err, WireboxError::NoActiveScope { .. }));
    }

    #[test]
    fn scoped_caches_per_scope() {
        let container = Container::new();
        let (expression, counter) = counting();
        let applied = Lifestyle::scoped().apply(expression, 1, None);

        let first = container.create_scope();
        let second = container.create_scope();
        let in_first = ResolveContext::new(&container, Some(&first));
        let in_second = ResolveContext::new(&container, Some(&second));

        let a = applied.evaluate(&in_first).unwrap();
        let b = applied.evaluate(&in_first).unwrap();
        let c = applied.evaluate(&in_second).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn custom_transform_is_used() {
        let container = Container::new();
        let ctx = ResolveContext::new(&container, None);
        let (expression, counter) = counting();

        let never_twice = Lifestyle::custom("First", 900, |create: Factory| {
            let cell = Arc::new(OnceCell::new());
            factory_fn(move |ctx| cell.get_or_try_init(|| create(ctx)).cloned())
        });
        let applied = never_twice.apply(expression, 1, None);

        applied.evaluate(&ctx).unwrap();
        applied.evaluate(&ctx).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
