//! Widget lifecycle events and listener registry
//!
//! Each event is a marker type implementing [`WidgetEvent`], which ties the
//! event name to its payload type. The registry keeps one typed listener set
//! per event, so a listener for `Init` can only ever receive a
//! [`SessionContext`].

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::context::SessionContext;

type Callback<T> = dyn Fn(&T) -> anyhow::Result<()> + Send + Sync;

/// A registered callback.
///
/// Listeners compare by reference: clones of one `Listener` are the same
/// listener, while two listeners built from identical closures are distinct.
pub struct Listener<T>(Arc<Callback<T>>);

impl<T> Listener<T> {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self(Arc::new(callback))
    }

    /// Whether both handles refer to the same callback
    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn call(&self, payload: &T) -> anyhow::Result<()> {
        (self.0)(payload)
    }
}

impl<T> Clone for Listener<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> fmt::Debug for Listener<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener({:p})", Arc::as_ptr(&self.0))
    }
}

/// Set of listeners for one event
pub struct ListenerSet<T> {
    listeners: Mutex<Vec<Listener<T>>>,
}

impl<T> ListenerSet<T> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Add a listener. Adding the same listener twice has no effect.
    pub fn add(&self, listener: Listener<T>) {
        let mut listeners = self.lock();
        if !listeners.iter().any(|l| l.same(&listener)) {
            listeners.push(listener);
        }
    }

    /// Remove a listener if present
    pub fn remove(&self, listener: &Listener<T>) {
        self.lock().retain(|l| !l.same(listener));
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Invoke every listener once.
    ///
    /// Listeners run on a snapshot, so a listener may add or remove listeners
    /// without affecting the current dispatch. Errors and panics are logged
    /// and contained.
    pub fn dispatch(&self, event: &'static str, payload: &T) {
        if self.is_empty() {
            tracing::trace!(event, "No listeners registered");
            return;
        }
        let snapshot: Vec<Listener<T>> = self.lock().clone();

        for listener in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| listener.call(payload))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(event, error = %e, "Error in '{}' listener", event);
                }
                Err(panic) => {
                    let reason = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    tracing::error!(event, error = %reason, "Listener for '{}' panicked", event);
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Listener<T>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for ListenerSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A widget lifecycle event
pub trait WidgetEvent: Copy + Send + Sync + 'static {
    /// Data handed to listeners
    type Payload: Send + Sync + 'static;

    /// Event name used in logs
    const NAME: &'static str;

    /// The registry slot holding this event's listeners
    fn listeners(registry: &ListenerRegistry) -> &ListenerSet<Self::Payload>;
}

/// Fired when the widget obtains a session context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Init;

impl WidgetEvent for Init {
    type Payload = SessionContext;
    const NAME: &'static str = "init";

    fn listeners(registry: &ListenerRegistry) -> &ListenerSet<SessionContext> {
        &registry.init
    }
}

/// Listener table for all widget events
#[derive(Default)]
pub struct ListenerRegistry {
    init: ListenerSet<SessionContext>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<E: WidgetEvent>(&self, _event: E, listener: Listener<E::Payload>) {
        E::listeners(self).add(listener);
    }

    pub fn off<E: WidgetEvent>(&self, _event: E, listener: &Listener<E::Payload>) {
        E::listeners(self).remove(listener);
    }

    pub fn emit<E: WidgetEvent>(&self, _event: E, payload: &E::Payload) {
        E::listeners(self).dispatch(E::NAME, payload);
    }

    pub fn listener_count<E: WidgetEvent>(&self, _event: E) -> usize {
        E::listeners(self).len()
    }

    /// Drop every listener of every event
    pub fn clear(&self) {
        self.init.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn context(user_id: &str) -> SessionContext {
        SessionContext {
            event_id: "e1".into(),
            user_id: user_id.into(),
            user_name: String::new(),
            user_email: String::new(),
            user_avatar: None,
            is_admin: false,
            registration: None,
            token: "a.b.c".into(),
        }
    }

    fn counting(counter: &Arc<AtomicUsize>) -> Listener<SessionContext> {
        let counter = Arc::clone(counter);
        Listener::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn test_duplicate_add_is_ignored() {
        let registry = ListenerRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let listener = counting(&calls);

        registry.on(Init, listener.clone());
        registry.on(Init, listener.clone());
        assert_eq!(registry.listener_count(Init), 1);

        registry.emit(Init, &context("u1"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_off_removes_only_that_reference() {
        let registry = ListenerRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let first = counting(&calls);
        let twin = counting(&calls);

        registry.on(Init, first.clone());
        registry.on(Init, twin.clone());
        registry.off(Init, &first);
        registry.emit(Init, &context("u1"));

        assert_eq!(registry.listener_count(Init), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_off_unknown_listener_is_noop() {
        let registry = ListenerRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        registry.off(Init, &counting(&calls));
        assert_eq!(registry.listener_count(Init), 0);
    }

    #[test]
    fn test_failing_listeners_are_contained() {
        let registry = ListenerRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        registry.on(Init, Listener::new(|_| Err(anyhow::anyhow!("listener exploded"))));
        registry.on(Init, Listener::new(|_| panic!("listener panicked")));
        let sink = Arc::clone(&seen);
        registry.on(
            Init,
            Listener::new(move |ctx: &SessionContext| {
                sink.lock().unwrap().push(ctx.user_id.clone());
                Ok(())
            }),
        );

        registry.emit(Init, &context("u7"));

        assert_eq!(*seen.lock().unwrap(), vec!["u7".to_string()]);
    }

    #[test]
    fn test_listener_may_unregister_during_dispatch() {
        let registry = Arc::new(ListenerRegistry::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<Listener<SessionContext>>>> = Arc::new(Mutex::new(None));

        let once = {
            let registry = Arc::clone(&registry);
            let slot = Arc::clone(&slot);
            let calls = Arc::clone(&calls);
            Listener::new(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                if let Some(me) = slot.lock().unwrap().take() {
                    registry.off(Init, &me);
                }
                Ok(())
            })
        };
        *slot.lock().unwrap() = Some(once.clone());
        registry.on(Init, once);

        registry.emit(Init, &context("u1"));
        registry.emit(Init, &context("u1"));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.listener_count(Init), 0);
    }

    #[test]
    fn test_clear() {
        let registry = ListenerRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        registry.on(Init, counting(&calls));

        registry.clear();
        registry.emit(Init, &context("u1"));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
