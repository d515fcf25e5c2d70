//! Basic example of the Wirebox DI container.

use std::sync::Arc;

use wirebox::prelude::*;
use wirebox::{implements, service};

// === Define your traits and types ===

trait Logger: Send + Sync {
    fn log(&self, msg: &str);
}
service!(dyn Logger);

struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn log(&self, msg: &str) {
        println!("[LOG] {msg}");
    }
}
implements!(ConsoleLogger => dyn Logger);

impl Component for ConsoleLogger {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![Constructor::new(|_| Ok(ConsoleLogger))]
    }
}

/// Prefixes every message with a timestamp-like counter.
struct NumberedLogger {
    inner: Arc<dyn Logger>,
    next: std::sync::atomic::AtomicUsize,
}

impl Logger for NumberedLogger {
    fn log(&self, msg: &str) {
        let n = self.next.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.inner.log(&format!("#{n} {msg}"));
    }
}
implements!(NumberedLogger => dyn Logger);

impl Component for NumberedLogger {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![
            Constructor::new(|args| {
                Ok(NumberedLogger {
                    inner: args.get(0)?,
                    next: Default::default(),
                })
            })
            .param::<dyn Logger>("inner"),
        ]
    }
}

struct Config {
    database_url: String,
    debug: bool,
}

struct Database {
    url: String,
    logger: Arc<dyn Logger>,
}

impl Database {
    fn query(&self, sql: &str) -> String {
        self.logger.log(&format!("Executing: {sql}"));
        format!("Results from {}", self.url)
    }
}

struct UserRepository {
    db: Arc<Database>,
}

impl Component for UserRepository {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![Constructor::new(|args| Ok(UserRepository { db: args.get(0)? })).param::<Database>("db")]
    }

    fn disposal() -> Option<fn(&Self)> {
        Some(|_| println!("🧹 UserRepository released"))
    }
}

struct UserService {
    repo: Arc<UserRepository>,
    logger: Arc<dyn Logger>,
}

impl UserService {
    fn get_user(&self, id: u64) -> String {
        self.logger.log(&format!("Getting user {id}"));
        self.repo.db.query(&format!("SELECT * FROM users WHERE id = {id}"))
    }
}

impl Component for UserService {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![
            Constructor::new(|args| {
                Ok(UserService {
                    repo: args.get(0)?,
                    logger: args.get(1)?,
                })
            })
            .param::<UserRepository>("repo")
            .param::<dyn Logger>("logger"),
        ]
    }
}

fn main() -> Result<()> {
    // Initialize tracing (logging)
    tracing_subscriber::fmt()
        .with_env_filter("wirebox_container=debug")
        .init();

    let container = Container::new();

    // Config: singleton value (already created)
    container.register_instance(Arc::new(Config {
        database_url: "postgres://localhost/myapp".to_string(),
        debug: true,
    }))?;

    // Logger: singleton, decorated once
    container.register_singleton::<dyn Logger, ConsoleLogger>()?;
    container.register_decorator_with::<dyn Logger, NumberedLogger>(Lifestyle::singleton())?;

    // Database: singleton built by a factory
    container.register_factory::<Database, _>(Lifestyle::singleton(), |r| {
        let config = r.resolve::<Config>()?;
        Ok(Arc::new(Database {
            url: config.database_url.clone(),
            logger: r.resolve::<dyn Logger>()?,
        }))
    })?;

    // UserRepository: scoped (one per request)
    container.register_scoped::<UserRepository, UserRepository>()?;

    // UserService: transient (new each time)
    container.register_transient::<UserService, UserService>()?;

    container.verify()?;
    println!("✅ Container verified!");
    println!("{container:?}");

    let config = container.get_instance::<Config>()?;
    println!("📋 Config: database_url={}, debug={}", config.database_url, config.debug);

    // === Begin a scope (e.g., for an HTTP request) ===
    {
        let _scope = container.begin_scope();

        let service = container.get_instance::<UserService>()?;
        println!("👤 {}", service.get_user(42));

        // Resolve again in the same scope: UserRepository is reused
        let service2 = container.get_instance::<UserService>()?;
        println!("👤 {}", service2.get_user(7));
        println!("🔁 Same repository: {}", Arc::ptr_eq(&service.repo, &service2.repo));
    }
    // scope ended: scoped instances released

    println!("\n🎉 Everything works!");
    Ok(())
}
