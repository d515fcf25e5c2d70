use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use wirebox_container::expression::ExpressionKind;
use wirebox_container::prelude::*;

struct Greeting;

impl Component for Greeting {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![Constructor::new(|_| Ok(Greeting))]
    }
}

#[test]
fn building_sees_the_raw_constructor_call() {
    let container = Container::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = seen.clone();
    container
        .on_expression_building(move |args| {
            let is_new = matches!(args.expression().kind(), ExpressionKind::New { .. });
            record.lock().unwrap().push((args.implementation_type(), is_new));
            Ok(())
        })
        .unwrap();
    container.register_singleton::<Greeting, Greeting>().unwrap();

    container.get_instance::<Greeting>().unwrap();
    container.get_instance::<Greeting>().unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![(TypeInfo::of::<Greeting>(), true)]);
}

#[test]
fn building_interception_runs_inside_the_lifestyle() {
    let container = Container::new();
    let wraps = Arc::new(AtomicUsize::new(0));
    let counter = wraps.clone();
    container
        .on_expression_building(move |args| {
            let counter = counter.clone();
            let wrapped = args.expression().map::<Greeting, _>(move |greeting| {
                counter.fetch_add(1, Ordering::SeqCst);
                greeting
            });
            args.set_expression(wrapped)
        })
        .unwrap();
    container.register_singleton::<Greeting, Greeting>().unwrap();

    container.get_instance::<Greeting>().unwrap();
    container.get_instance::<Greeting>().unwrap();
    assert_eq!(wraps.load(Ordering::SeqCst), 1);
}

#[test]
fn built_observer_can_replace_the_expression() {
    let container = Container::new();
    container
        .register_factory::<String, _>(Lifestyle::transient(), |_| Ok(Arc::new("hello".to_string())))
        .unwrap();
    container
        .on_expression_built(|args| {
            if args.service_type() != &ServiceType::of::<String>() {
                return Ok(());
            }
            let wrapped = args
                .expression()
                .map::<String, _>(|s| Arc::new(format!("{s}!")));
            args.set_expression(wrapped)
        })
        .unwrap();

    assert_eq!(*container.get_instance::<String>().unwrap(), "hello!");
}

#[test]
fn observers_after_lock_are_rejected() {
    let container = Container::new();
    container.verify().unwrap();

    assert!(matches!(
        container.on_expression_built(|_| Ok(())),
        Err(WireboxError::ContainerLocked { .. })
    ));
}
