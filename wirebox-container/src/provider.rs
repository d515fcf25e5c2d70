//! Provider trait: a module of related registrations.
//!
//! # Examples
//! ```rust
//! use std::sync::Arc;
//! use wirebox_container::prelude::*;
//!
//! struct Settings {
//!     url: String,
//! }
//!
//! struct DatabaseProvider;
//!
//! impl Provider for DatabaseProvider {
//!     fn register(&self, container: &Container) -> Result<()> {
//!         container.register_instance(Arc::new(Settings { url: "postgres://localhost".into() }))?;
//!         container.register_factory::<String, _>(Lifestyle::singleton(), |r| {
//!             Ok(Arc::new(r.resolve::<Settings>()?.url.clone()))
//!         })
//!     }
//! }
//!
//! let container = Container::new();
//! container.add_provider(&DatabaseProvider).unwrap();
//! assert_eq!(*container.get_instance::<String>().unwrap(), "postgres://localhost");
//! ```

use crate::container::Container;
use crate::error::Result;

/// A module that registers related services into a container.
///
/// Split registrations by domain instead of one large block:
///
/// ```rust,ignore
/// container.add_provider(&DatabaseProvider)?;
/// container.add_provider(&AuthProvider)?;
/// container.add_provider(&EmailProvider)?;
/// ```
pub trait Provider: Send + Sync {
    /// Registers the provider's services.
    ///
    /// Runs with the container unlocked; the first failing registration
    /// aborts the provider.
    fn register(&self, container: &Container) -> Result<()>;

    /// Human-readable name for logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}
