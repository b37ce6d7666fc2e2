//! Messaging with the embedding host page
//!
//! The widget talks to its host through one-way `{type, payload?}` messages.
//! [`HostChannel`] abstracts the transport so the handshake can run against a
//! browser bridge, a test double, or the in-memory [`MemoryChannel`].

mod memory;

pub use memory::{memory_channel, MemoryChannel, MemoryHost};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::Result;

/// Outbound: the widget is listening and wants its credential
pub const READY: &str = "happenow:ready";
/// Inbound: the host delivers the credential
pub const INIT: &str = "happenow:init";
/// Outbound: the widget asks the host to resize its frame
pub const RESIZE: &str = "happenow:resize";

/// A message exchanged with the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl HostMessage {
    pub fn new(kind: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    pub fn ready() -> Self {
        Self::new(READY, None)
    }

    pub fn resize(height: u32) -> Self {
        Self::new(RESIZE, Some(serde_json::json!({ "height": height })))
    }

    /// The message a host sends to initialize the widget
    pub fn init(token: impl Into<String>, api_url: Option<String>) -> Self {
        let payload = InitPayload {
            token: Some(token.into()),
            api_url,
        };
        Self::new(INIT, serde_json::to_value(payload).ok())
    }

    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }
}

/// Payload of an init message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InitPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

const TOKEN_KEYS: &[&str] = &["token", "credential"];
const ENDPOINT_KEYS: &[&str] = &["api_url", "endpointUrl"];

impl InitPayload {
    /// Read the payload of an init message.
    ///
    /// Each field is read on its own, taking the first non-empty string among
    /// its accepted keys. A badly typed endpoint only loses the endpoint; a
    /// missing or non-object payload reads as empty, which the handshake
    /// reports as a missing credential.
    pub fn from_message(message: &HostMessage) -> Self {
        let payload = message.payload.as_ref();
        let field = |keys: &[&str]| {
            payload.and_then(|p| {
                keys.iter()
                    .filter_map(|key| p.get(*key).and_then(Value::as_str))
                    .find(|value| !value.is_empty())
                    .map(str::to_string)
            })
        };

        Self {
            token: field(TOKEN_KEYS),
            api_url: field(ENDPOINT_KEYS),
        }
    }

    /// The credential, if present and non-empty
    pub fn credential(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }

    /// The API endpoint, if present and non-empty
    pub fn endpoint(&self) -> Option<&str> {
        self.api_url.as_deref().filter(|u| !u.is_empty())
    }
}

/// Bidirectional message capability with the host page
pub trait HostChannel: Send + Sync {
    /// Post a one-way message to the host
    fn send(&self, message: HostMessage) -> Result<()>;

    /// Start receiving inbound messages.
    ///
    /// Messages arrive on the returned subscription until it is dropped.
    fn subscribe(&self) -> Subscription;
}

/// Inbound message subscription.
///
/// Unsubscribes exactly once, when dropped.
pub struct Subscription {
    receiver: mpsc::UnboundedReceiver<HostMessage>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wrap a receiver with the action that detaches it from its channel
    pub fn new<F>(receiver: mpsc::UnboundedReceiver<HostMessage>, release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            receiver,
            release: Some(Box::new(release)),
        }
    }

    /// Next inbound message, or `None` once the channel is gone
    pub async fn recv(&mut self) -> Option<HostMessage> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        assert_eq!(
            serde_json::to_value(HostMessage::ready()).unwrap(),
            json!({"type": "happenow:ready"})
        );
        assert_eq!(
            serde_json::to_value(HostMessage::resize(480)).unwrap(),
            json!({"type": "happenow:resize", "payload": {"height": 480}})
        );
    }

    #[test]
    fn test_init_payload_accepts_both_key_styles() {
        let host_style: HostMessage = serde_json::from_value(json!({
            "type": "happenow:init",
            "payload": {"token": "a.b.c", "api_url": "https://api.example.com"}
        }))
        .unwrap();
        let long_style: HostMessage = serde_json::from_value(json!({
            "type": "happenow:init",
            "payload": {"credential": "a.b.c", "endpointUrl": "https://api.example.com"}
        }))
        .unwrap();

        for message in [host_style, long_style] {
            let payload = InitPayload::from_message(&message);
            assert_eq!(payload.credential(), Some("a.b.c"));
            assert_eq!(payload.endpoint(), Some("https://api.example.com"));
        }
    }

    #[test]
    fn test_init_payload_blank_fields() {
        let missing = HostMessage::new(INIT, None);
        let empty = HostMessage::new(INIT, Some(json!({"token": "", "api_url": ""})));
        let garbage = HostMessage::new(INIT, Some(json!("nope")));

        for message in [missing, empty, garbage] {
            let payload = InitPayload::from_message(&message);
            assert_eq!(payload.credential(), None);
            assert_eq!(payload.endpoint(), None);
        }
    }

    #[test]
    fn test_init_payload_fields_read_independently() {
        let bad_endpoint = HostMessage::new(INIT, Some(json!({"token": "a.b.c", "api_url": 42})));
        let both_keys = HostMessage::new(
            INIT,
            Some(json!({"token": "a.b.c", "credential": "x.y.z", "endpointUrl": "https://api.example.com"})),
        );
        let fallback = HostMessage::new(INIT, Some(json!({"token": 7, "credential": "x.y.z"})));

        let payload = InitPayload::from_message(&bad_endpoint);
        assert_eq!(payload.credential(), Some("a.b.c"));
        assert_eq!(payload.endpoint(), None);

        let payload = InitPayload::from_message(&both_keys);
        assert_eq!(payload.credential(), Some("a.b.c"));
        assert_eq!(payload.endpoint(), Some("https://api.example.com"));

        assert_eq!(InitPayload::from_message(&fallback).credential(), Some("x.y.z"));
    }

    #[test]
    fn test_subscription_releases_once_on_drop() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let released = Arc::new(AtomicUsize::new(0));
        let (_tx, rx) = mpsc::unbounded_channel();
        let counter = Arc::clone(&released);
        let subscription = Subscription::new(rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        drop(subscription);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
