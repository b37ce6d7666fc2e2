//! Host handshake
//!
//! One attempt: subscribe to inbound messages, arm the bounded wait, announce
//! readiness, then wait for the first `init` message. The subscription and
//! the timer live in this attempt's scope and are released together on every
//! exit path: init received, timeout, or destroy.

use std::time::Duration;

use tokio::sync::watch;

use crate::channel::{HostChannel, HostMessage, InitPayload, Subscription, INIT};
use crate::context::SessionContext;
use crate::credential::decode_claims;
use crate::error::{Result, WidgetError};

/// Default bounded wait for the host's init message
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of a completed handshake
#[derive(Debug, Clone)]
pub(crate) struct Established {
    pub context: SessionContext,
    pub endpoint: Option<String>,
}

pub(crate) struct Handshake<'a> {
    channel: &'a dyn HostChannel,
    timeout: Duration,
}

impl<'a> Handshake<'a> {
    pub fn new(channel: &'a dyn HostChannel, timeout: Duration) -> Self {
        Self { channel, timeout }
    }

    /// Run one attempt. `shutdown` flips to `true` when the widget is destroyed.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<Established> {
        let mut subscription = self.channel.subscribe();
        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        self.channel.send(HostMessage::ready())?;
        tracing::debug!(timeout_secs = self.timeout.as_secs(), "Sent ready, awaiting init");

        let message = tokio::select! {
            biased;
            _ = destroyed(shutdown) => {
                tracing::debug!("Handshake abandoned, widget destroyed");
                return Err(WidgetError::AlreadyDestroyed);
            }
            message = next_init(&mut subscription) => message,
            _ = &mut deadline => {
                tracing::warn!(timeout_secs = self.timeout.as_secs(), "No init message from host");
                return Err(WidgetError::InitTimeout(self.timeout));
            }
        };
        drop(subscription);

        establish(&message)
    }
}

/// Turn an init message into a session
pub(crate) fn establish(message: &HostMessage) -> Result<Established> {
    let payload = InitPayload::from_message(message);
    let token = payload.credential().ok_or(WidgetError::MissingCredential)?;
    let claims = decode_claims(token)?;

    Ok(Established {
        context: SessionContext::from_claims(&claims, token),
        endpoint: payload.endpoint().map(str::to_string),
    })
}

async fn next_init(subscription: &mut Subscription) -> HostMessage {
    loop {
        match subscription.recv().await {
            Some(message) if message.is(INIT) => return message,
            Some(message) => {
                tracing::trace!(kind = %message.kind, "Ignoring host message during handshake");
            }
            // Channel gone: only the deadline or destroy can end the wait now.
            None => std::future::pending::<()>().await,
        }
    }
}

async fn destroyed(mut shutdown: watch::Receiver<bool>) {
    if shutdown.wait_for(|destroyed| *destroyed).await.is_err() {
        std::future::pending::<()>().await;
    }
}
