//! Dependency graph diagnostics.
//!
//! Walks the relationships recorded while building registrations and
//! reports:
//! - lifestyle mismatches: a consumer that outlives one of its dependencies
//! - transient components with a disposal hook, which never runs
//!
//! Runs as part of [`Container::verify`](crate::container::Container::verify),
//! after every expression has been built. Cycles never reach this point;
//! they fail the build itself.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::error::LifestyleMismatchError;
use crate::key::TypeInfo;
use crate::producer::InstanceProducer;
use crate::registration::DiagnosticType;

/// What the validator found.
#[derive(Debug, Default)]
pub(crate) struct Diagnostics {
    pub mismatches: Vec<LifestyleMismatchError>,
    pub disposable_transients: Vec<TypeInfo>,
}

impl Diagnostics {
    pub fn is_empty(&self) -> bool {
        self.mismatches.is_empty() && self.disposable_transients.is_empty()
    }
}

/// Depth-first walk over built producers.
pub(crate) struct GraphValidator {
    /// Registrations already checked, by id
    visited: HashSet<u64>,
    diagnostics: Diagnostics,
}

impl GraphValidator {
    pub fn new() -> Self {
        Self {
            visited: HashSet::new(),
            diagnostics: Diagnostics::default(),
        }
    }

    /// Checks `roots` and everything reachable from them.
    #[instrument(skip_all, name = "graph_validation")]
    pub fn validate(mut self, roots: &[Arc<InstanceProducer>]) -> Diagnostics {
        debug!(roots = roots.len(), "Starting dependency graph validation");

        for producer in roots {
            self.visit(producer);
        }

        if self.diagnostics.is_empty() {
            debug!(registrations = self.visited.len(), "Dependency graph validation passed ✓");
        }
        self.diagnostics
    }

    fn visit(&mut self, producer: &Arc<InstanceProducer>) {
        let registration = producer.registration();
        if !self.visited.insert(registration.id()) {
            return;
        }

        if producer.lifestyle().is_transient()
            && registration.has_disposer()
            && !registration.is_suppressed(DiagnosticType::DisposableTransientComponent)
        {
            self.diagnostics
                .disposable_transients
                .push(registration.implementation_type());
        }

        let mismatch_suppressed = registration.is_suppressed(DiagnosticType::LifestyleMismatch);
        for relationship in registration.relationships() {
            let dependency = relationship.dependency();

            // Singleton > Scoped > Transient
            if !mismatch_suppressed && relationship.lifestyle().length() > dependency.lifestyle().length() {
                warn!(
                    consumer = %relationship.implementation_type(),
                    dependency = %dependency.service_type(),
                    "Lifestyle mismatch detected"
                );
                self.diagnostics.mismatches.push(LifestyleMismatchError {
                    consumer: relationship.implementation_type(),
                    consumer_lifestyle: relationship.lifestyle().to_string(),
                    dependency: dependency.service_type().info(),
                    dependency_lifestyle: dependency.lifestyle().to_string(),
                });
            }

            self.visit(dependency);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, Constructor};
    use crate::container::Container;
    use crate::lifestyle::Lifestyle;

    struct Database;

    impl Component for Database {
        fn constructors() -> Vec<Constructor<Self>> {
            vec![Constructor::new(|_| Ok(Database))]
        }
    }

    struct UserService {
        _db: Arc<Database>,
    }

    impl Component for UserService {
        fn constructors() -> Vec<Constructor<Self>> {
            vec![Constructor::new(|args| Ok(UserService { _db: args.get(0)? })).param::<Database>("db")]
        }
    }

    struct Connection;

    impl Component for Connection {
        fn constructors() -> Vec<Constructor<Self>> {
            vec![Constructor::new(|_| Ok(Connection))]
        }

        fn disposal() -> Option<fn(&Self)> {
            Some(|_| {})
        }
    }

    fn built(container: &Container) -> Vec<Arc<InstanceProducer>> {
        let producers = container.get_current_registrations();
        for producer in &producers {
            producer.build_expression().unwrap();
        }
        producers
    }

    #[test]
    fn singleton_on_transient_is_a_mismatch() {
        let container = Container::new();
        container.register_transient::<Database, Database>().unwrap();
        container.register_singleton::<UserService, UserService>().unwrap();

        let diagnostics = GraphValidator::new().validate(&built(&container));
        assert_eq!(diagnostics.mismatches.len(), 1);
        let mismatch = &diagnostics.mismatches[0];
        assert_eq!(mismatch.consumer, TypeInfo::of::<UserService>());
        assert_eq!(mismatch.consumer_lifestyle, "Singleton");
        assert_eq!(mismatch.dependency_lifestyle, "Transient");
    }

    #[test]
    fn transient_on_singleton_is_fine() {
        let container = Container::new();
        container.register_singleton::<Database, Database>().unwrap();
        container.register_transient::<UserService, UserService>().unwrap();

        assert!(GraphValidator::new().validate(&built(&container)).is_empty());
    }

    #[test]
    fn suppressed_mismatch_is_not_reported() {
        let container = Container::new();
        container.register_transient::<Database, Database>().unwrap();
        let registration = Lifestyle::singleton().create_registration::<UserService>(&container);
        registration
            .suppress_diagnostic_warning(DiagnosticType::LifestyleMismatch, "the database handle is stateless")
            .unwrap();
        container
            .add_registration::<UserService, UserService>(registration)
            .unwrap();

        assert!(GraphValidator::new().validate(&built(&container)).mismatches.is_empty());
    }

    #[test]
    fn disposable_transient_is_reported() {
        let container = Container::new();
        container.register_transient::<Connection, Connection>().unwrap();
        container.register_scoped::<Database, Database>().unwrap();

        let diagnostics = GraphValidator::new().validate(&built(&container));
        assert_eq!(diagnostics.disposable_transients, vec![TypeInfo::of::<Connection>()]);
    }

    #[test]
    fn shared_dependency_is_visited_once() {
        let container = Container::new();
        container.register_transient::<Database, Database>().unwrap();
        container.register_singleton::<UserService, UserService>().unwrap();

        let mut producers = built(&container);
        producers.extend(producers.clone());
        let diagnostics = GraphValidator::new().validate(&producers);
        assert_eq!(diagnostics.mismatches.len(), 1);
    }
}
