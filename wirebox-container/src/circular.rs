//! Circular dependency detection.
//!
//! A thread-local stack records the registrations and producers currently
//! being built, the factory closures currently running and the lifestyle
//! caches currently being filled. Entering an entry that is already on the
//! stack is a cycle.

use std::cell::RefCell;

use crate::error::{CircularDependencyError, Result, WireboxError};
use crate::key::TypeInfo;

const MAX_DEPTH: usize = 1024;

thread_local! {
    static BUILD_STACK: RefCell<Vec<(u64, TypeInfo)>> = const { RefCell::new(Vec::new()) };
}

/// Keeps an entry on the build stack until dropped.
pub(crate) struct CycleGuard {
    id: u64,
}

impl CycleGuard {
    /// Pushes `id` onto the stack, failing if it is already there.
    pub(crate) fn enter(id: u64, info: TypeInfo) -> Result<Self> {
        BUILD_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();

            if let Some(start) = stack.iter().position(|(entry, _)| *entry == id) {
                let mut chain: Vec<TypeInfo> = stack[start..].iter().map(|(_, info)| *info).collect();
                chain.push(info);
                chain.dedup();
                return Err(WireboxError::CircularDependency(CircularDependencyError { chain }));
            }

            if stack.len() >= MAX_DEPTH {
                return Err(WireboxError::DepthExceeded {
                    service: info,
                    depth: stack.len(),
                });
            }

            stack.push((id, info));
            Ok(Self { id })
        })
    }
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        BUILD_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(position) = stack.iter().rposition(|(entry, _)| *entry == self.id) {
                stack.truncate(position);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct A;
    struct B;

    #[test]
    fn nested_distinct_entries_pass() {
        let _a = CycleGuard::enter(1, TypeInfo::of::<A>()).unwrap();
        let _b = CycleGuard::enter(2, TypeInfo::of::<B>()).unwrap();
    }

    #[test]
    fn reentering_reports_the_chain() {
        let _a = CycleGuard::enter(10, TypeInfo::of::<A>()).unwrap();
        let _b = CycleGuard::enter(11, TypeInfo::of::<B>()).unwrap();

        match CycleGuard::enter(10, TypeInfo::of::<A>()) {
            Err(WireboxError::CircularDependency(e)) => {
                assert_eq!(
                    e.chain,
                    vec![TypeInfo::of::<A>(), TypeInfo::of::<B>(), TypeInfo::of::<A>()]
                );
            }
            _ => panic!("expected a cycle"),
        }
    }

    #[test]
    fn guards_pop_on_drop() {
        {
            let _a = CycleGuard::enter(20, TypeInfo::of::<A>()).unwrap();
        }
        assert!(CycleGuard::enter(20, TypeInfo::of::<A>()).is_ok());
    }
}
