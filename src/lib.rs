//! HappeNow Widget SDK
//!
//! Client library for widgets embedded in a HappeNow event page.
//!
//! # Architecture
//!
//! A widget lives inside a host page and learns who it is serving through a
//! handshake:
//! - The widget announces itself with `happenow:ready`
//! - The host answers with `happenow:init`, carrying a signed credential and
//!   the API endpoint
//! - The widget decodes the credential into a [`SessionContext`] and notifies
//!   `init` listeners
//!
//! Outside a host page the widget runs in mock mode, where a [`MockConfig`]
//! stands in for the host and posts are answered locally.
//!
//! The host transport is injected through [`HostChannel`]. [`memory_channel`]
//! provides an in-process pair for tests and tooling.
//!
//! # Example
//!
//! ```rust,ignore
//! use happenow_widget::{memory_channel, CreatePostOptions, Widget, WidgetConfig, WidgetMode};
//!
//! let (channel, host) = memory_channel();
//! let widget = Widget::new(WidgetMode::embedded(channel), WidgetConfig::default())?;
//!
//! let ctx = widget.init().await?;
//! if ctx.is_registered() {
//!     widget.create_post(CreatePostOptions::new("See you there!")).await?;
//! }
//! ```

// Host messaging
pub mod channel;

// Credential decoding
pub mod credential;

// Session context derived from the credential
pub mod context;

// Listener registry
pub mod events;

// Feed actions
pub mod post;

// Mock mode
pub mod mock;

// Widget facade and handshake
pub mod widget;

// Error types
pub mod error;

// Re-export the facade
pub use widget::{HandshakeState, Widget, WidgetConfig, WidgetMode, DEFAULT_INIT_TIMEOUT};

// Re-export session types
pub use context::{Registration, RegistrationStatus, SessionContext};
pub use credential::{decode_claims, Claims};

// Re-export events
pub use events::{Init, Listener, WidgetEvent};

// Re-export host messaging
pub use channel::{memory_channel, HostChannel, HostMessage, MemoryChannel, MemoryHost, Subscription};

// Re-export feed actions
pub use post::{CreatePostOptions, HttpPostTransport, Post, PostTarget, PostTransport};

// Re-export mock mode
pub use mock::{MockConfig, MockPostTransport};

// Re-export error types
pub use error::{Result, WidgetError};
