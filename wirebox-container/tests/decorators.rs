use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use wirebox_container::expression::Expression;
use wirebox_container::generic::GenericService;
use wirebox_container::prelude::*;
use wirebox_container::{implements, service};

trait CommandHandler: Send + Sync {
    fn handle(&self) -> String;
}
service!(dyn CommandHandler);

struct SaveHandler;
impl CommandHandler for SaveHandler {
    fn handle(&self) -> String {
        "save".into()
    }
}
implements!(SaveHandler => dyn CommandHandler);
impl Component for SaveHandler {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![Constructor::new(|_| Ok(SaveHandler))]
    }
}

struct Logging {
    inner: Arc<dyn CommandHandler>,
}
impl CommandHandler for Logging {
    fn handle(&self) -> String {
        format!("log({})", self.inner.handle())
    }
}
implements!(Logging => dyn CommandHandler);
impl Component for Logging {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![Constructor::new(|args| Ok(Logging { inner: args.get(0)? })).param::<dyn CommandHandler>("inner")]
    }
}

struct Retry {
    inner: Arc<dyn CommandHandler>,
    attempts: Arc<u8>,
}
impl CommandHandler for Retry {
    fn handle(&self) -> String {
        format!("retry{}({})", self.attempts, self.inner.handle())
    }
}
implements!(Retry => dyn CommandHandler);
impl Component for Retry {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![
            Constructor::new(|args| {
                Ok(Retry {
                    attempts: args.get(0)?,
                    inner: args.get(1)?,
                })
            })
            .param::<u8>("attempts")
            .param::<dyn CommandHandler>("inner"),
        ]
    }
}

fn handlers() -> Container {
    let container = Container::new();
    container.register_instance::<u8>(Arc::new(3)).unwrap();
    container
        .register_transient::<dyn CommandHandler, SaveHandler>()
        .unwrap();
    container
}

#[test]
fn last_registered_decorator_is_outermost() {
    let container = handlers();
    container.register_decorator::<dyn CommandHandler, Logging>().unwrap();
    container.register_decorator::<dyn CommandHandler, Retry>().unwrap();

    let handler = container.get_instance::<dyn CommandHandler>().unwrap();
    assert_eq!(handler.handle(), "retry3(log(save))");

    let producer = container
        .get_registration(&ServiceType::of::<dyn CommandHandler>(), true)
        .unwrap()
        .unwrap();
    assert_eq!(
        producer.applied_decorators(),
        vec![TypeInfo::of::<Logging>(), TypeInfo::of::<Retry>()]
    );
}

#[test]
fn predicate_sees_the_decorators_applied_so_far() {
    let container = handlers();
    let seen: Arc<Mutex<Vec<Expression>>> = Arc::new(Mutex::new(Vec::new()));

    let first = seen.clone();
    container
        .register_decorator_when::<dyn CommandHandler, Logging>(Lifestyle::transient(), move |ctx| {
            first.lock().unwrap().push(ctx.expression().clone());
            ctx.applied_decorators().is_empty()
        })
        .unwrap();
    let second = seen.clone();
    container
        .register_decorator_when::<dyn CommandHandler, Retry>(Lifestyle::transient(), move |ctx| {
            second.lock().unwrap().push(ctx.expression().clone());
            ctx.implementation_type() == TypeInfo::of::<SaveHandler>()
                && ctx.applied_decorators() == [TypeInfo::of::<Logging>()]
        })
        .unwrap();

    let handler = container.get_instance::<dyn CommandHandler>().unwrap();
    assert_eq!(handler.handle(), "retry3(log(save))");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(!Expression::ptr_eq(&seen[0], &seen[1]));
}

#[test]
fn declined_decorator_is_skipped() {
    let container = handlers();
    container
        .register_decorator_when::<dyn CommandHandler, Logging>(Lifestyle::transient(), |_| false)
        .unwrap();

    let handler = container.get_instance::<dyn CommandHandler>().unwrap();
    assert_eq!(handler.handle(), "save");
}

#[test]
fn singleton_decorator_wraps_once() {
    let container = handlers();
    container
        .register_decorator_with::<dyn CommandHandler, Logging>(Lifestyle::singleton())
        .unwrap();

    let a = container.get_instance::<dyn CommandHandler>().unwrap();
    let b = container.get_instance::<dyn CommandHandler>().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn decorator_without_decoratee_is_rejected() {
    let container = Container::new();
    assert!(matches!(
        container.register_decorator::<dyn CommandHandler, SaveHandler>(),
        Err(WireboxError::InvalidDecorator { .. })
    ));
}

// ── Open decorators ──

trait Query<T>: Send + Sync {
    fn run(&self) -> String;
}

struct Fetch<T>(PhantomData<fn() -> T>);
impl<T: 'static> Query<T> for Fetch<T> {
    fn run(&self) -> String {
        "fetch".into()
    }
}
impl<T: 'static> Implements<dyn Query<T>> for Fetch<T> {
    fn upcast(self: Arc<Self>) -> Arc<dyn Query<T>> {
        self
    }
}
impl<T: 'static> Component for Fetch<T> {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![Constructor::new(|_| Ok(Fetch(PhantomData)))]
    }
}

struct Cached<T> {
    inner: Arc<dyn Query<T>>,
}
impl<T: 'static> Query<T> for Cached<T> {
    fn run(&self) -> String {
        format!("cached({})", self.inner.run())
    }
}
impl<T: 'static> Implements<dyn Query<T>> for Cached<T> {
    fn upcast(self: Arc<Self>) -> Arc<dyn Query<T>> {
        self
    }
}
impl<T: 'static> Component for Cached<T> {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![Constructor::new(|args| Ok(Cached { inner: args.get(0)? })).param::<dyn Query<T>>("inner")]
    }
}

impl<T: 'static> Service for dyn Query<T> {
    fn generic() -> Option<GenericService<Self>> {
        Some(
            GenericService::new()
                .argument::<T>()
                .component::<Fetch<T>>()
                .component::<Cached<T>>(),
        )
    }
}

fn queries() -> Container {
    let container = Container::new();
    container
        .register_open_generic(
            GenericDefinition::of::<dyn Query<()>>(),
            GenericDefinition::of::<Fetch<()>>(),
            Lifestyle::transient(),
        )
        .unwrap();
    container
}

#[test]
fn open_decorator_wraps_every_closed_service() {
    let container = queries();
    container
        .register_open_decorator(
            GenericDefinition::of::<dyn Query<()>>(),
            GenericDefinition::of::<Cached<()>>(),
            Lifestyle::transient(),
        )
        .unwrap();

    assert_eq!(container.get_instance::<dyn Query<u8>>().unwrap().run(), "cached(fetch)");
    assert_eq!(container.get_instance::<dyn Query<String>>().unwrap().run(), "cached(fetch)");
}

#[test]
fn open_decorator_predicate_picks_closed_services() {
    let container = queries();
    container
        .register_open_decorator_when(
            GenericDefinition::of::<dyn Query<()>>(),
            GenericDefinition::of::<Cached<()>>(),
            Lifestyle::transient(),
            |ctx| ctx.service_type().info() == TypeInfo::of::<dyn Query<u16>>(),
        )
        .unwrap();

    assert_eq!(container.get_instance::<dyn Query<u8>>().unwrap().run(), "fetch");
    assert_eq!(container.get_instance::<dyn Query<u16>>().unwrap().run(), "cached(fetch)");
}
