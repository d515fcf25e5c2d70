//! Compile-time component discovery.
//!
//! Components submit a [`Discoverable`] entry with `inventory::submit!`;
//! [`Container::register_discovered`](crate::container::Container::register_discovered)
//! runs every entry of a tag. Entries of one tag run in link order, which is
//! unspecified.
//!
//! ```rust,ignore
//! fn register_clock(container: &Container) -> Result<()> {
//!     container.register_singleton::<dyn Clock, SystemClock>()
//! }
//!
//! inventory::submit! {
//!     Discoverable::new("infrastructure", "system clock", register_clock)
//! }
//!
//! container.register_discovered("infrastructure")?;
//! ```

use std::fmt;

use crate::container::Container;
use crate::error::Result;

/// A registration routine found at link time.
pub struct Discoverable {
    /// Group the entry belongs to
    tag: &'static str,
    /// Name used in logs
    name: &'static str,
    register: fn(&Container) -> Result<()>,
}

impl Discoverable {
    pub const fn new(tag: &'static str, name: &'static str, register: fn(&Container) -> Result<()>) -> Self {
        Self { tag, name, register }
    }

    #[inline]
    pub fn tag(&self) -> &'static str {
        self.tag
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn register(&self, container: &Container) -> Result<()> {
        (self.register)(container)
    }
}

impl fmt::Debug for Discoverable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Discoverable")
            .field("tag", &self.tag)
            .field("name", &self.name)
            .finish()
    }
}

inventory::collect!(Discoverable);

/// Every submitted entry with `tag`.
pub fn entries(tag: &str) -> impl Iterator<Item = &'static Discoverable> + '_ {
    inventory::iter::<Discoverable>
        .into_iter()
        .filter(move |entry| entry.tag == tag)
}

/// The distinct tags of all submitted entries.
pub fn tags() -> Vec<&'static str> {
    let mut tags: Vec<&'static str> = inventory::iter::<Discoverable>.into_iter().map(|e| e.tag).collect();
    tags.sort_unstable();
    tags.dedup();
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WireboxError;
    use std::sync::Arc;

    struct Clock(u64);

    fn register_clock(container: &Container) -> Result<()> {
        container.register_instance(Arc::new(Clock(7)))
    }

    fn register_name(container: &Container) -> Result<()> {
        container.register_instance::<String>(Arc::new("discovered".into()))
    }

    fn register_broken(_: &Container) -> Result<()> {
        Err(WireboxError::InvalidRegistration {
            service: "Broken".into(),
            reason: "always fails".into(),
        })
    }

    inventory::submit! {
        Discoverable::new("discovery-tests", "clock", register_clock)
    }

    inventory::submit! {
        Discoverable::new("discovery-tests", "name", register_name)
    }

    inventory::submit! {
        Discoverable::new("discovery-broken", "broken", register_broken)
    }

    #[test]
    fn entries_are_grouped_by_tag() {
        let mut names: Vec<&str> = entries("discovery-tests").map(Discoverable::name).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["clock", "name"]);
        assert_eq!(entries("no-such-tag").count(), 0);
        assert!(tags().contains(&"discovery-broken"));
    }

    #[test]
    fn register_discovered_runs_every_entry() {
        let container = Container::new();
        assert_eq!(container.register_discovered("discovery-tests").unwrap(), 2);
        assert_eq!(container.get_instance::<Clock>().unwrap().0, 7);
        assert_eq!(*container.get_instance::<String>().unwrap(), "discovered");
    }

    #[test]
    fn failing_entry_stops_registration() {
        let container = Container::new();
        assert!(matches!(
            container.register_discovered("discovery-broken"),
            Err(WireboxError::InvalidRegistration { .. })
        ));
    }
}
