//! Widget facade
//!
//! [`Widget`] is the object embedding code holds. It owns the handshake
//! lifecycle, the session derived from it, the listener table and the post
//! transport.
//!
//! # Modes
//!
//! - **Embedded**: runs the host handshake over an injected [`HostChannel`]
//!   and posts to the API endpoint the host supplies.
//! - **Mock**: builds the session from a local [`MockConfig`], never touches
//!   the host or the network.
//!
//! # Example
//!
//! ```rust,ignore
//! use happenow_widget::{CreatePostOptions, Init, Listener, SessionContext, Widget, WidgetConfig, WidgetMode};
//!
//! let widget = Widget::new(WidgetMode::embedded(channel), WidgetConfig::default())?;
//!
//! widget.on(Init, Listener::new(|ctx: &SessionContext| {
//!     println!("hello {}", ctx.user_name);
//!     Ok(())
//! }));
//!
//! let ctx = widget.init().await?;
//! let post = widget.create_post(CreatePostOptions::new("Great talk!")).await?;
//! widget.resize(640);
//! widget.destroy();
//! ```

mod handshake;

pub use handshake::DEFAULT_INIT_TIMEOUT;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;

use crate::channel::{HostChannel, HostMessage};
use crate::context::SessionContext;
use crate::error::{Result, WidgetError};
use crate::events::{Init, Listener, ListenerRegistry, WidgetEvent};
use crate::mock::{MockConfig, MockPostTransport};
use crate::post::{CreatePostOptions, HttpPostTransport, Post, PostTarget, PostTransport};
use handshake::{Established, Handshake};

/// How the widget obtains its session
#[derive(Clone)]
pub enum WidgetMode {
    /// Embedded in a host page reachable through the channel
    Embedded(Arc<dyn HostChannel>),
    /// Standalone, with a locally authored identity
    Mock(MockConfig),
}

impl WidgetMode {
    pub fn embedded(channel: impl HostChannel + 'static) -> Self {
        Self::Embedded(Arc::new(channel))
    }

    pub fn mock(config: MockConfig) -> Self {
        Self::Mock(config)
    }

    pub fn is_mock(&self) -> bool {
        matches!(self, Self::Mock(_))
    }
}

impl std::fmt::Debug for WidgetMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Embedded(_) => f.write_str("Embedded"),
            Self::Mock(config) => f.debug_tuple("Mock").field(config).finish(),
        }
    }
}

/// Widget configuration
#[derive(Debug, Clone)]
pub struct WidgetConfig {
    /// Bounded wait for the host's init message (default: 10s)
    pub init_timeout: Duration,
    /// HTTP request timeout in seconds (default: 30)
    pub request_timeout_secs: u64,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            init_timeout: DEFAULT_INIT_TIMEOUT,
            request_timeout_secs: 30,
        }
    }
}

/// Lifecycle state of the widget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeState {
    Idle,
    AwaitingInit,
    Initialized,
    Failed,
    Destroyed,
}

#[derive(Debug, Clone)]
struct Session {
    context: SessionContext,
    endpoint: Option<String>,
}

#[derive(Debug)]
struct WidgetState {
    phase: HandshakeState,
    session: Option<Session>,
    mock_config: Option<MockConfig>,
    /// `init()` calls that have started but not yet settled or been dropped
    pending: usize,
}

/// The embeddable widget client
pub struct Widget {
    channel: Option<Arc<dyn HostChannel>>,
    config: WidgetConfig,
    state: Mutex<WidgetState>,
    listeners: ListenerRegistry,
    transport: Box<dyn PostTransport>,
    shutdown: watch::Sender<bool>,
}

impl Widget {
    /// Create a widget with the default transport for its mode
    pub fn new(mode: WidgetMode, config: WidgetConfig) -> Result<Self> {
        let transport: Box<dyn PostTransport> = match &mode {
            WidgetMode::Embedded(_) => Box::new(HttpPostTransport::new(Duration::from_secs(
                config.request_timeout_secs,
            ))?),
            WidgetMode::Mock(_) => Box::new(MockPostTransport),
        };

        Ok(Self::with_transport(mode, config, transport))
    }

    /// Create a widget that sends posts through the given transport
    pub fn with_transport(mode: WidgetMode, config: WidgetConfig, transport: Box<dyn PostTransport>) -> Self {
        let (channel, mock_config) = match mode {
            WidgetMode::Embedded(channel) => (Some(channel), None),
            WidgetMode::Mock(config) => (None, Some(config)),
        };
        let (shutdown, _) = watch::channel(false);

        Self {
            channel,
            config,
            state: Mutex::new(WidgetState {
                phase: HandshakeState::Idle,
                session: None,
                mock_config,
                pending: 0,
            }),
            listeners: ListenerRegistry::new(),
            transport,
            shutdown,
        }
    }

    /// Initialize the widget.
    ///
    /// **Embedded**: sends `happenow:ready` to the host, then waits for
    /// `happenow:init` carrying the credential. Fails with
    /// [`WidgetError::InitTimeout`] when nothing arrives within the configured
    /// wait.
    ///
    /// **Mock**: resolves immediately with the context built from the mock
    /// config.
    ///
    /// Every call runs a fresh attempt. Calls that overlap are not guarded:
    /// whichever finishes last determines the stored session. Dropping the
    /// returned future abandons the attempt; once no attempt is left the
    /// state falls back to `Initialized` or `Idle`.
    pub async fn init(&self) -> Result<SessionContext> {
        let mock_config = {
            let mut state = self.lock_state();
            if state.phase == HandshakeState::Destroyed {
                return Err(WidgetError::AlreadyDestroyed);
            }
            if state.pending > 0 {
                tracing::warn!("init() called while another handshake is pending; the last to finish wins");
            }
            state.pending += 1;
            state.phase = HandshakeState::AwaitingInit;
            state.mock_config.clone()
        };
        let attempt = PendingAttempt {
            widget: self,
            settled: false,
        };

        let outcome = match (&self.channel, mock_config) {
            (_, Some(config)) => config.build_context().map(|context| Established {
                context,
                endpoint: None,
            }),
            (Some(channel), None) => {
                Handshake::new(channel.as_ref(), self.config.init_timeout)
                    .run(self.shutdown.subscribe())
                    .await
            }
            (None, None) => Err(WidgetError::Config("widget has neither a host channel nor a mock config".into())),
        };

        attempt.settle(outcome)
    }

    /// Create a post on the event's community feed.
    ///
    /// Requires a session from [`Widget::init`]. A single request is made;
    /// retrying is up to the caller.
    pub async fn create_post(&self, options: CreatePostOptions) -> Result<Post> {
        let session = self
            .lock_state()
            .session
            .clone()
            .ok_or(WidgetError::NotInitialized)?;

        let target = PostTarget {
            endpoint: session.endpoint.as_deref(),
            credential: &session.context.token,
        };
        self.transport.create_post(target, &options).await
    }

    /// Ask the host page to resize the widget frame. Fire-and-forget.
    pub fn resize(&self, height: u32) {
        match &self.channel {
            None => tracing::info!("[HappeNow Dev] resize({})", height),
            Some(channel) => {
                if let Err(e) = channel.send(HostMessage::resize(height)) {
                    tracing::warn!(height, error = %e, "Failed to send resize request");
                }
            }
        }
    }

    /// Register a listener. Registering the same listener twice has no effect.
    pub fn on<E: WidgetEvent>(&self, event: E, listener: Listener<E::Payload>) {
        self.listeners.on(event, listener);
    }

    /// Remove a listener. Unknown listeners are ignored.
    pub fn off<E: WidgetEvent>(&self, event: E, listener: &Listener<E::Payload>) {
        self.listeners.off(event, listener);
    }

    /// Tear down the widget.
    ///
    /// Abandons pending handshakes, which then fail with
    /// [`WidgetError::AlreadyDestroyed`], drops all listeners and forgets the
    /// session. Calling it again does nothing.
    pub fn destroy(&self) {
        {
            let mut state = self.lock_state();
            if state.phase == HandshakeState::Destroyed {
                return;
            }
            state.phase = HandshakeState::Destroyed;
            state.session = None;
            state.mock_config = None;
        }

        self.shutdown.send_replace(true);
        self.listeners.clear();
        tracing::debug!("Widget destroyed");
    }

    /// Replace the mock identity and re-initialize from it.
    ///
    /// Only valid in mock mode.
    pub fn apply_mock_config(&self, config: MockConfig) -> Result<SessionContext> {
        {
            let mut state = self.lock_state();
            if state.phase == HandshakeState::Destroyed {
                return Err(WidgetError::AlreadyDestroyed);
            }
            if state.mock_config.is_none() {
                return Err(WidgetError::Config("mock config can only be applied in mock mode".into()));
            }
            state.mock_config = Some(config.clone());
        }

        let outcome = config.build_context().map(|context| Established {
            context,
            endpoint: None,
        });
        self.settle(outcome)
    }

    /// Current session context, if initialized
    pub fn context(&self) -> Option<SessionContext> {
        self.lock_state().session.as_ref().map(|s| s.context.clone())
    }

    /// API endpoint supplied by the host, if any
    pub fn endpoint(&self) -> Option<String> {
        self.lock_state().session.as_ref().and_then(|s| s.endpoint.clone())
    }

    pub fn state(&self) -> HandshakeState {
        self.lock_state().phase
    }

    pub fn is_destroyed(&self) -> bool {
        self.state() == HandshakeState::Destroyed
    }

    pub fn is_mock(&self) -> bool {
        self.channel.is_none()
    }

    /// Record the outcome of an attempt and notify listeners on success
    fn settle(&self, outcome: Result<Established>) -> Result<SessionContext> {
        let context = {
            let mut state = self.lock_state();
            if state.phase == HandshakeState::Destroyed {
                return Err(WidgetError::AlreadyDestroyed);
            }

            match outcome {
                Ok(Established { context, endpoint }) => {
                    state.phase = HandshakeState::Initialized;
                    state.session = Some(Session {
                        context: context.clone(),
                        endpoint,
                    });
                    context
                }
                Err(e) => {
                    state.phase = HandshakeState::Failed;
                    if e.is_init_failure() {
                        tracing::debug!(error = %e, "Widget init failed");
                    } else {
                        tracing::warn!(error = %e, "Widget init failed unexpectedly");
                    }
                    return Err(e);
                }
            }
        };

        tracing::debug!(user_id = %context.user_id, event_id = %context.event_id, "Widget initialized");
        self.listeners.emit(Init, &context);
        Ok(context)
    }

    fn lock_state(&self) -> MutexGuard<'_, WidgetState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Bookkeeping for one running `init()` call
struct PendingAttempt<'a> {
    widget: &'a Widget,
    settled: bool,
}

impl PendingAttempt<'_> {
    fn settle(mut self, outcome: Result<Established>) -> Result<SessionContext> {
        self.settled = true;
        self.widget.settle(outcome)
    }
}

impl Drop for PendingAttempt<'_> {
    fn drop(&mut self) {
        let mut state = self.widget.lock_state();
        state.pending = state.pending.saturating_sub(1);

        if !self.settled && state.pending == 0 && state.phase == HandshakeState::AwaitingInit {
            state.phase = if state.session.is_some() {
                HandshakeState::Initialized
            } else {
                HandshakeState::Idle
            };
            tracing::debug!(phase = ?state.phase, "Init attempt abandoned");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::memory_channel;
    use crate::context::RegistrationStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn mock_config() -> MockConfig {
        MockConfig {
            event_id: "evt_dev".into(),
            user_id: "u_dev".into(),
            user_name: "Casey Kim".into(),
            user_email: "casey.kim@example.com".into(),
            user_avatar: String::new(),
            is_admin: false,
            has_registration: true,
            registration_status: RegistrationStatus::Approved,
            ticket_id: "tkt_dev".into(),
            ticket_name: "Early Bird".into(),
        }
    }

    fn mock_widget() -> Widget {
        Widget::new(WidgetMode::mock(mock_config()), WidgetConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_mock_init_resolves_immediately() {
        let widget = mock_widget();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        widget.on(
            Init,
            Listener::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        let ctx = widget.init().await.unwrap();

        assert_eq!(ctx.user_id, "u_dev");
        assert!(ctx.is_registered());
        assert_eq!(widget.state(), HandshakeState::Initialized);
        assert_eq!(widget.context(), Some(ctx));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mock_create_post() {
        let widget = mock_widget();
        assert!(matches!(
            widget.create_post(CreatePostOptions::new("early")).await,
            Err(WidgetError::NotInitialized)
        ));

        widget.init().await.unwrap();
        let post = widget.create_post(CreatePostOptions::new("hello")).await.unwrap();

        assert!(post.id.starts_with("post_dev_"));
        assert_eq!(post.content, "hello");
    }

    #[tokio::test]
    async fn test_apply_mock_config_replaces_context() {
        let widget = mock_widget();
        widget.init().await.unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        widget.on(
            Init,
            Listener::new(move |ctx: &SessionContext| {
                sink.lock().unwrap().push(ctx.is_admin);
                Ok(())
            }),
        );

        let mut config = mock_config();
        config.is_admin = true;
        let ctx = widget.apply_mock_config(config).unwrap();

        assert!(ctx.is_admin);
        assert_eq!(widget.context().map(|c| c.is_admin), Some(true));
        assert_eq!(*seen.lock().unwrap(), vec![true]);
    }

    #[tokio::test]
    async fn test_apply_mock_config_requires_mock_mode() {
        let (channel, _host) = memory_channel();
        let widget = Widget::new(WidgetMode::embedded(channel), WidgetConfig::default()).unwrap();

        assert!(matches!(
            widget.apply_mock_config(mock_config()),
            Err(WidgetError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let widget = mock_widget();
        widget.init().await.unwrap();

        widget.destroy();
        widget.destroy();

        assert!(widget.is_destroyed());
        assert_eq!(widget.context(), None);
        assert!(matches!(widget.init().await, Err(WidgetError::AlreadyDestroyed)));
        assert!(matches!(
            widget.apply_mock_config(mock_config()),
            Err(WidgetError::AlreadyDestroyed)
        ));
    }

    #[test]
    fn test_resize_in_mock_mode_is_local() {
        mock_widget().resize(320);
    }

    #[tokio::test]
    async fn test_resize_posts_to_host() {
        let (channel, mut host) = memory_channel();
        let widget = Widget::new(WidgetMode::embedded(channel), WidgetConfig::default()).unwrap();

        widget.resize(720);
        widget.resize(360);

        assert_eq!(host.recv().await, Some(HostMessage::resize(720)));
        assert_eq!(host.recv().await, Some(HostMessage::resize(360)));
    }

    #[tokio::test]
    async fn test_dropped_reinit_keeps_session_state() {
        let (channel, mut host) = memory_channel();
        let widget = Widget::new(WidgetMode::embedded(channel), WidgetConfig::default()).unwrap();
        let token = mock_config().token().unwrap();

        let answer = async {
            assert_eq!(host.recv().await, Some(HostMessage::ready()));
            host.deliver(HostMessage::init(token, None));
        };
        let (first, ()) = tokio::join!(widget.init(), answer);
        assert_eq!(first.unwrap().user_id, "u_dev");

        let mut retry = tokio_test::task::spawn(widget.init());
        tokio_test::assert_pending!(retry.poll());
        assert_eq!(widget.state(), HandshakeState::AwaitingInit);
        drop(retry);

        assert_eq!(widget.state(), HandshakeState::Initialized);
        assert_eq!(widget.context().map(|c| c.user_id), Some("u_dev".to_string()));
        assert_eq!(host.subscriber_count(), 0);
    }
}
