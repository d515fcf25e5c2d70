//! Scopes: the unit of caching for [`Lifestyle::scoped`](crate::lifestyle::Lifestyle::scoped).
//!
//! A scope is either explicit (created with
//! [`Container::create_scope`](crate::container::Container::create_scope) and
//! passed to `get_instance_in`) or ambient: bound to the current thread by a
//! [`ScopeGuard`] from
//! [`Container::begin_scope`](crate::container::Container::begin_scope).
//! Ambient scopes nest; the innermost one of a container wins.
//!
//! Ending a scope disposes the instances it created, in reverse creation
//! order, after running its end-of-scope actions.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{Result, WireboxError};
use crate::key::TypeInfo;
use crate::service::Instance;

/// Disposal hook for an instance cached in a scope.
pub type Disposer = Arc<dyn Fn(&Instance) + Send + Sync>;

type EndAction = Box<dyn FnOnce() + Send>;

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static ACTIVE_SCOPES: RefCell<Vec<Arc<Scope>>> = const { RefCell::new(Vec::new()) };
}

/// A cache of scoped instances with a disposal list.
pub struct Scope {
    id: u64,
    container_id: u64,
    parent: Option<Arc<Scope>>,
    instances: Mutex<HashMap<u64, Arc<OnceCell<Instance>>>>,
    disposables: Mutex<Vec<(Instance, Disposer)>>,
    end_actions: Mutex<Vec<EndAction>>,
    disposed: AtomicBool,
}

impl Scope {
    pub(crate) fn new(container_id: u64, parent: Option<Arc<Scope>>) -> Arc<Self> {
        let scope = Arc::new(Self {
            id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
            container_id,
            parent,
            instances: Mutex::new(HashMap::new()),
            disposables: Mutex::new(Vec::new()),
            end_actions: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        });
        debug!(scope = scope.id, "Scope started");
        scope
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The ambient scope that was active when this one began.
    pub fn parent(&self) -> Option<&Arc<Scope>> {
        self.parent.as_ref()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Number of instances cached so far.
    pub fn len(&self) -> usize {
        self.instances.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers an action to run when the scope ends, before instances are
    /// disposed.
    pub fn when_scope_ends(&self, action: impl FnOnce() + Send + 'static) -> Result<()> {
        if self.is_disposed() {
            return Err(WireboxError::ScopeDisposed {
                service: TypeInfo::of::<Scope>(),
            });
        }
        self.end_actions.lock().push(Box::new(action));
        Ok(())
    }

    /// Returns the instance cached under `key`, creating it on first use.
    ///
    /// Creation for one key runs at most once; concurrent callers for the
    /// same key wait for it.
    pub(crate) fn get_or_create(
        &self,
        key: u64,
        service: TypeInfo,
        disposer: Option<&Disposer>,
        create: impl FnOnce() -> Result<Instance>,
    ) -> Result<Instance> {
        if self.is_disposed() {
            return Err(WireboxError::ScopeDisposed { service });
        }

        let cell = self.instances.lock().entry(key).or_default().clone();

        let mut created = false;
        let instance = cell
            .get_or_try_init(|| {
                created = true;
                create()
            })?
            .clone();

        if created {
            // The scope may have ended while `create` ran. Checked under the
            // disposables lock so `dispose` either drains this entry or we
            // release the instance here.
            let mut disposables = self.disposables.lock();
            if self.is_disposed() {
                drop(disposables);
                if let Some(disposer) = disposer {
                    disposer(&instance);
                }
                debug!(scope = self.id, service = %service, "Scope ended during creation");
                return Err(WireboxError::ScopeDisposed { service });
            }
            if let Some(disposer) = disposer {
                disposables.push((instance.clone(), disposer.clone()));
            }
            trace!(scope = self.id, service = %service, "Cached scoped instance");
        }
        Ok(instance)
    }

    /// Ends the scope. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let actions = std::mem::take(&mut *self.end_actions.lock());
        for action in actions {
            action();
        }

        let disposables = std::mem::take(&mut *self.disposables.lock());
        for (instance, disposer) in disposables.iter().rev() {
            disposer(instance);
        }

        self.instances.lock().clear();
        debug!(scope = self.id, disposed = disposables.len(), "Scope ended");
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("instances", &self.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// The innermost ambient scope of `container_id` on this thread.
pub(crate) fn current(container_id: u64) -> Option<Arc<Scope>> {
    ACTIVE_SCOPES.with(|scopes| {
        scopes
            .borrow()
            .iter()
            .rev()
            .find(|scope| scope.container_id == container_id)
            .cloned()
    })
}

/// Keeps an ambient scope active on the current thread. Dropping the guard
/// ends the scope.
#[must_use = "the scope ends when the guard is dropped"]
pub struct ScopeGuard {
    scope: Arc<Scope>,
    _not_send: PhantomData<*const ()>,
}

impl ScopeGuard {
    pub(crate) fn begin(container_id: u64) -> Self {
        let scope = Scope::new(container_id, current(container_id));
        ACTIVE_SCOPES.with(|scopes| scopes.borrow_mut().push(scope.clone()));
        Self {
            scope,
            _not_send: PhantomData,
        }
    }

    pub fn scope(&self) -> &Arc<Scope> {
        &self.scope
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        ACTIVE_SCOPES.with(|scopes| {
            let mut scopes = scopes.borrow_mut();
            if let Some(position) = scopes.iter().rposition(|s| Arc::ptr_eq(s, &self.scope)) {
                scopes.remove(position);
            }
        });
        self.scope.dispose();
    }
}

impl fmt::Debug for ScopeGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ScopeGuard").field(&self.scope).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counted(counter: Arc<AtomicUsize>) -> impl FnOnce() -> Result<Instance> {
        move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Arc::new(n)) as Instance)
        }
    }

    #[test]
    fn same_key_is_created_once() {
        let scope = Scope::new(1, None);
        let counter = Arc::new(AtomicUsize::new(0));
        let service = TypeInfo::of::<usize>();

        let a = scope.get_or_create(7, service, None, counted(counter.clone())).unwrap();
        let b = scope.get_or_create(7, service, None, counted(counter.clone())).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(scope.len(), 1);
    }

    #[test]
    fn dispose_runs_in_reverse_order() {
        let scope = Scope::new(1, None);
        let order = Arc::new(Mutex::new(Vec::new()));
        let service = TypeInfo::of::<usize>();

        for key in 0..3u64 {
            let order = order.clone();
            let disposer: Disposer = Arc::new(move |_| order.lock().push(key));
            scope
                .get_or_create(key, service, Some(&disposer), || Ok(Arc::new(Arc::new(key)) as Instance))
                .unwrap();
        }

        let ended = order.clone();
        scope.when_scope_ends(move || ended.lock().push(99)).unwrap();

        scope.dispose();
        assert_eq!(*order.lock(), vec![99, 2, 1, 0]);

        scope.dispose();
        assert_eq!(order.lock().len(), 4);
    }

    #[test]
    fn disposed_scope_rejects_requests() {
        let scope = Scope::new(1, None);
        scope.dispose();
        let counter = Arc::new(AtomicUsize::new(0));
        let err = scope
            .get_or_create(1, TypeInfo::of::<usize>(), None, counted(counter.clone()))
            .err()
            .unwrap();
        assert!(matches!(err, WireboxError::ScopeDisposed { .. }));
        assert!(scope.when_scope_ends(|| {}).is_err());
    }

    #[test]
    fn ambient_scopes_nest_per_container() {
        assert!(current(42).is_none());
        let outer = ScopeGuard::begin(42);
        {
            let inner = ScopeGuard::begin(42);
            let _other = ScopeGuard::begin(43);
            let active = current(42).unwrap();
            assert!(Arc::ptr_eq(&active, inner.scope()));
            assert!(Arc::ptr_eq(inner.scope().parent().unwrap(), outer.scope()));
        }
        assert!(Arc::ptr_eq(&current(42).unwrap(), outer.scope()));
        drop(outer);
        assert!(current(42).is_none());
    }

    #[test]
    fn dropping_the_guard_disposes() {
        let guard = ScopeGuard::begin(7);
        let scope = guard.scope().clone();
        drop(guard);
        assert!(scope.is_disposed());
    }
}
