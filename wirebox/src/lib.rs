//! # Wirebox: a dependency injection container for Rust
//!
//! Register components with a lifestyle, wrap them with decorators, map
//! open generic services, then resolve. The first resolution locks the
//! container.
//!
//! ```
//! use std::sync::Arc;
//! use wirebox::prelude::*;
//!
//! trait Greeter: Send + Sync {
//!     fn greet(&self, name: &str) -> String;
//! }
//! wirebox::service!(dyn Greeter);
//!
//! struct English;
//! impl Greeter for English {
//!     fn greet(&self, name: &str) -> String {
//!         format!("Hello, {name}")
//!     }
//! }
//! wirebox::implements!(English => dyn Greeter);
//!
//! impl Component for English {
//!     fn constructors() -> Vec<Constructor<Self>> {
//!         vec![Constructor::new(|_| Ok(English))]
//!     }
//! }
//!
//! let container = Container::new();
//! container.register_singleton::<dyn Greeter, English>()?;
//! container.verify()?;
//!
//! let greeter: Arc<dyn Greeter> = container.get_instance()?;
//! assert_eq!(greeter.greet("Ada"), "Hello, Ada");
//! # Ok::<(), WireboxError>(())
//! ```

pub use wirebox_container::*;
pub use wirebox_support::*;
