//! Expressions: immutable descriptions of how an instance is produced.
//!
//! Every node carries its composed factory closure. A parent's closure calls
//! its children's closures directly, so the factory of a root expression
//! builds the whole object graph without consulting the container again.
//! Identity is pointer identity ([`Expression::ptr_eq`]).

use std::fmt;
use std::sync::Arc;

use crate::error::{Result, WireboxError};
use crate::key::TypeInfo;
use crate::registry::{ResolveContext, Resolver};
use crate::service::{Absent, Converter, Instance, Service, from_instance, into_instance};

/// A composed creation closure.
pub type Factory = Arc<dyn Fn(&ResolveContext<'_>) -> Result<Instance> + Send + Sync>;

/// Boxes a closure as a [`Factory`].
pub fn factory_fn<F>(f: F) -> Factory
where
    F: Fn(&ResolveContext<'_>) -> Result<Instance> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// The shape of an expression node.
#[derive(Clone)]
pub enum ExpressionKind {
    /// Constructor call of a component.
    New {
        constructor: &'static str,
        arguments: Vec<Expression>,
        properties: Vec<(&'static str, Expression)>,
    },
    /// Call of an opaque factory closure.
    Invoke,
    /// A fixed instance.
    Constant,
    /// Placeholder for an optional dependency that is not registered.
    Absent,
    /// A lifestyle cache around a creation expression.
    Cached {
        lifestyle: String,
        inner: Expression,
    },
    /// Conversion of an implementation instance into a service instance.
    Convert { inner: Expression },
    /// A wrapper added by an `ExpressionBuilt` or `ExpressionBuilding` observer.
    Intercept { inner: Expression },
    /// A lazy collection of element expressions.
    Collection { items: Vec<Expression> },
}

struct Node {
    kind: ExpressionKind,
    produces: TypeInfo,
    factory: Factory,
}

/// Reference counted expression node.
#[derive(Clone)]
pub struct Expression(Arc<Node>);

impl Expression {
    fn node(kind: ExpressionKind, produces: TypeInfo, factory: Factory) -> Self {
        Expression(Arc::new(Node {
            kind,
            produces,
            factory,
        }))
    }

    /// An expression that always yields `value`.
    pub fn value<S: ?Sized + Service>(value: Arc<S>) -> Self {
        Self::constant(TypeInfo::of::<S>(), into_instance(value))
    }

    /// An expression that calls `factory` on every evaluation.
    ///
    /// ```
    /// use std::sync::Arc;
    /// use wirebox_container::expression::Expression;
    ///
    /// let expression = Expression::from_fn::<String, _>(|_| Ok(Arc::new("built".to_string())));
    /// assert_eq!(expression.produces().short_name(), "String");
    /// ```
    pub fn from_fn<S, F>(factory: F) -> Self
    where
        S: ?Sized + Service,
        F: Fn(&dyn Resolver) -> Result<Arc<S>> + Send + Sync + 'static,
    {
        Self::invoke(
            TypeInfo::of::<S>(),
            factory_fn(move |ctx| Ok(into_instance(factory(ctx as &dyn Resolver)?))),
        )
    }

    /// Wraps every produced value with `wrap`.
    ///
    /// Fails at evaluation time when this expression does not produce `S`.
    pub fn map<S, F>(&self, wrap: F) -> Self
    where
        S: ?Sized + Service,
        F: Fn(Arc<S>) -> Arc<S> + Send + Sync + 'static,
    {
        let inner = self.compile();
        Self::intercept(
            self.clone(),
            factory_fn(move |ctx| {
                let value = from_instance::<S>(&inner(ctx)?)?;
                Ok(into_instance(wrap(value)))
            }),
        )
    }

    pub(crate) fn intercept(inner: Expression, factory: Factory) -> Self {
        let produces = inner.produces();
        Self::node(ExpressionKind::Intercept { inner }, produces, factory)
    }

    pub(crate) fn new_instance(
        produces: TypeInfo,
        constructor: &'static str,
        arguments: Vec<Expression>,
        properties: Vec<(&'static str, Expression)>,
        factory: Factory,
    ) -> Self {
        Self::node(
            ExpressionKind::New {
                constructor,
                arguments,
                properties,
            },
            produces,
            factory,
        )
    }

    pub(crate) fn invoke(produces: TypeInfo, factory: Factory) -> Self {
        Self::node(ExpressionKind::Invoke, produces, factory)
    }

    pub(crate) fn constant(produces: TypeInfo, instance: Instance) -> Self {
        Self::node(
            ExpressionKind::Constant,
            produces,
            factory_fn(move |_| Ok(instance.clone())),
        )
    }

    pub(crate) fn absent(produces: TypeInfo) -> Self {
        let marker: Instance = Arc::new(Absent);
        Self::node(
            ExpressionKind::Absent,
            produces,
            factory_fn(move |_| Ok(marker.clone())),
        )
    }

    pub(crate) fn cached(lifestyle: &str, inner: Expression, factory: Factory) -> Self {
        let produces = inner.produces();
        Self::node(
            ExpressionKind::Cached {
                lifestyle: lifestyle.to_string(),
                inner,
            },
            produces,
            factory,
        )
    }

    pub(crate) fn convert(produces: TypeInfo, inner: Expression, converter: Converter) -> Self {
        let source = inner.compile();
        Self::node(
            ExpressionKind::Convert { inner },
            produces,
            factory_fn(move |ctx| converter(source(ctx)?)),
        )
    }

    pub(crate) fn collection(produces: TypeInfo, items: Vec<Expression>, factory: Factory) -> Self {
        Self::node(ExpressionKind::Collection { items }, produces, factory)
    }

    /// The type of the instances this expression yields.
    #[inline]
    pub fn produces(&self) -> TypeInfo {
        self.0.produces
    }

    #[inline]
    pub fn kind(&self) -> &ExpressionKind {
        &self.0.kind
    }

    /// Returns the composed factory of this expression.
    #[inline]
    pub fn compile(&self) -> Factory {
        self.0.factory.clone()
    }

    pub fn evaluate(&self, ctx: &ResolveContext<'_>) -> Result<Instance> {
        (self.0.factory)(ctx)
    }

    /// Returns `true` when both handles point at the same node.
    #[inline]
    pub fn ptr_eq(a: &Expression, b: &Expression) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// The direct child expressions of this node.
    pub fn children(&self) -> Vec<&Expression> {
        match &self.0.kind {
            ExpressionKind::New {
                arguments,
                properties,
                ..
            } => arguments
                .iter()
                .chain(properties.iter().map(|(_, expression)| expression))
                .collect(),
            ExpressionKind::Cached { inner, .. }
            | ExpressionKind::Convert { inner }
            | ExpressionKind::Intercept { inner } => vec![inner],
            ExpressionKind::Collection { items } => items.iter().collect(),
            ExpressionKind::Invoke | ExpressionKind::Constant | ExpressionKind::Absent => Vec::new(),
        }
    }

    /// Returns `true` if `other` is this node or one of its descendants.
    pub fn contains(&self, other: &Expression) -> bool {
        Expression::ptr_eq(self, other) || self.children().iter().any(|child| child.contains(other))
    }

    pub(crate) fn expect_produces(&self, expected: TypeInfo) -> Result<()> {
        if self.produces() == expected {
            Ok(())
        } else {
            Err(WireboxError::TypeMismatch {
                expected,
                context: format!("expression produces {}", self.produces()),
            })
        }
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let produces = self.produces().short_name();
        match self.kind() {
            ExpressionKind::New {
                constructor,
                arguments,
                properties,
            } => {
                let mut list = f.debug_tuple(&format!("New({produces}::{constructor})"));
                for argument in arguments {
                    list.field(argument);
                }
                for (_, property) in properties {
                    list.field(property);
                }
                list.finish()
            }
            ExpressionKind::Invoke => write!(f, "Invoke({produces})"),
            ExpressionKind::Constant => write!(f, "Constant({produces})"),
            ExpressionKind::Absent => write!(f, "Absent({produces})"),
            ExpressionKind::Cached { lifestyle, inner } => {
                f.debug_tuple(lifestyle).field(inner).finish()
            }
            ExpressionKind::Convert { inner } => {
                f.debug_tuple(&format!("Convert({produces})")).field(inner).finish()
            }
            ExpressionKind::Intercept { inner } => f.debug_tuple("Intercept").field(inner).finish(),
            ExpressionKind::Collection { items } => f
                .debug_tuple(&format!("Collection({produces})"))
                .field(&items.len())
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;

    #[test]
    fn constant_yields_the_same_instance() {
        let container = Container::new();
        let ctx = ResolveContext::new(&container, None);
        let expression = Expression::value::<u32>(Arc::new(7));

        let a = expression.evaluate(&ctx).unwrap();
        let b = expression.evaluate(&ctx).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(*from_instance::<u32>(&a).unwrap(), 7);
    }

    #[test]
    fn map_wraps_values() {
        let container = Container::new();
        let ctx = ResolveContext::new(&container, None);
        let expression = Expression::from_fn::<String, _>(|_| Ok(Arc::new("core".to_string())))
            .map::<String, _>(|inner| Arc::new(format!("<{inner}>")));

        let value = from_instance::<String>(&expression.evaluate(&ctx).unwrap()).unwrap();
        assert_eq!(*value, "<core>");
        assert!(matches!(expression.kind(), ExpressionKind::Intercept { .. }));
    }

    #[test]
    fn clones_share_identity() {
        let a = Expression::absent(TypeInfo::of::<u8>());
        let b = a.clone();
        let c = Expression::absent(TypeInfo::of::<u8>());
        assert!(Expression::ptr_eq(&a, &b));
        assert!(!Expression::ptr_eq(&a, &c));
    }

    #[test]
    fn contains_walks_children() {
        let leaf = Expression::value::<u8>(Arc::new(1));
        let wrapped = leaf.map::<u8, _>(|v| v);
        assert!(wrapped.contains(&leaf));
        assert!(!leaf.contains(&wrapped));
        assert_eq!(wrapped.children().len(), 1);
    }

    #[test]
    fn debug_names_the_node() {
        let expression = Expression::value::<String>(Arc::new(String::new()));
        assert_eq!(format!("{expression:?}"), "Constant(String)");
    }
}
