//! Core container implementation for Wirebox DI.

pub mod behaviors;
mod circular;
pub mod collection;
pub mod component;
pub mod container;
pub mod decorator;
pub mod discovery;
pub mod error;
pub mod events;
pub mod expression;
pub mod generic;
mod graph;
pub mod key;
pub mod lifestyle;
pub mod lifestyles;
pub mod options;
pub mod producer;
pub mod provider;
pub mod registration;
pub mod registry;
pub mod scope;
pub mod service;

pub use container::{Container, VerificationOption, prelude};
pub use error::{Result, WireboxError};
pub use key::{GenericDefinition, ServiceType, TypeInfo};
pub use lifestyle::Lifestyle;
pub use scope::Scope;

#[doc(hidden)]
pub use inventory;
