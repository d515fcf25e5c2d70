//! Custom lifestyles built on [`Lifestyle::custom`].
//!
//! ```
//! use std::time::Duration;
//! use wirebox_container::lifestyles;
//!
//! let per_thread = lifestyles::per_thread();
//! let cached = lifestyles::expiring(Duration::from_secs(30), true);
//! assert!(per_thread.length() > cached.length());
//! ```

use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::expression::{Factory, factory_fn};
use crate::lifestyle::Lifestyle;
use crate::service::Instance;

/// Length of [`per_thread`]: between Scoped and Singleton.
pub const PER_THREAD_LENGTH: u32 = 700;

/// Length of [`expiring`]: shorter than a scope, since an instance may be
/// replaced in the middle of one.
pub const EXPIRING_LENGTH: u32 = 300;

/// One instance per registration and thread.
///
/// Instances are kept until the container is dropped, including those of
/// threads that have ended.
pub fn per_thread() -> Lifestyle {
    Lifestyle::custom("Per Thread", PER_THREAD_LENGTH, |create: Factory| {
        let instances: Arc<DashMap<ThreadId, Instance>> = Arc::new(DashMap::new());
        factory_fn(move |ctx| {
            let thread = thread::current().id();
            if let Some(instance) = instances.get(&thread) {
                return Ok(instance.value().clone());
            }
            // Only this thread writes its own entry, so creating outside the
            // map lock can't race.
            let instance = create(ctx)?;
            instances.insert(thread, instance.clone());
            Ok(instance)
        })
    })
}

/// One instance per registration, replaced once `timeout` has passed.
///
/// With `sliding`, every request restarts the timeout; otherwise it runs
/// from creation.
pub fn expiring(timeout: Duration, sliding: bool) -> Lifestyle {
    let name = if sliding { "Sliding Expiration" } else { "Absolute Expiration" };
    Lifestyle::custom(name, EXPIRING_LENGTH, move |create: Factory| {
        let slot: Arc<Mutex<Option<(Instance, Instant)>>> = Arc::new(Mutex::new(None));
        factory_fn(move |ctx| {
            let mut slot = slot.lock();
            let now = Instant::now();
            if let Some((instance, stamp)) = slot.as_mut() {
                if now.duration_since(*stamp) < timeout {
                    if sliding {
                        *stamp = now;
                    }
                    return Ok(instance.clone());
                }
            }

            let instance = create(ctx)?;
            *slot = Some((instance.clone(), now));
            Ok(instance)
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Session(usize);

    fn container_with(lifestyle: Lifestyle) -> (Container, Arc<AtomicUsize>) {
        let container = Container::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let calls = counter.clone();
        container
            .register_factory::<Session, _>(lifestyle, move |_| {
                Ok(Arc::new(Session(calls.fetch_add(1, Ordering::SeqCst))))
            })
            .unwrap();
        (container, counter)
    }

    #[test]
    fn per_thread_shares_within_a_thread() {
        let (container, counter) = container_with(per_thread());

        let a = container.get_instance::<Session>().unwrap();
        let b = container.get_instance::<Session>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let other = {
            let container = container.clone();
            thread::spawn(move || container.get_instance::<Session>().unwrap().0)
                .join()
                .unwrap()
        };
        assert_ne!(a.0, other);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn expiring_reuses_until_timeout() {
        let (container, counter) = container_with(expiring(Duration::from_secs(3600), false));

        let a = container.get_instance::<Session>().unwrap();
        let b = container.get_instance::<Session>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn expired_instance_is_replaced() {
        let (container, counter) = container_with(expiring(Duration::ZERO, true));

        let a = container.get_instance::<Session>().unwrap();
        let b = container.get_instance::<Session>().unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn names_and_lengths() {
        assert_eq!(per_thread().name(), "Per Thread");
        assert_eq!(expiring(Duration::ZERO, false).name(), "Absolute Expiration");
        assert!(per_thread().length() < Lifestyle::singleton().length());
        assert!(expiring(Duration::ZERO, true).length() < Lifestyle::scoped().length());
    }
}
