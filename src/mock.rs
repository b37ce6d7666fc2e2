//! Mock mode
//!
//! Outside an embedding host the widget runs on a locally authored
//! [`MockConfig`] instead of a handshake. The config synthesizes a session
//! context and a matching unsigned token, and posts are answered locally.

use async_trait::async_trait;
use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::context::{RegistrationStatus, SessionContext};
use crate::credential::{encode_unsigned_token, Claims};
use crate::error::Result;
use crate::post::{CreatePostOptions, Post, PostTarget, PostTransport};

/// Signature segment of synthesized tokens
pub const MOCK_SIGNATURE: &str = "dev-mock-signature";

/// Lifetime of synthesized tokens in seconds
pub const MOCK_TOKEN_TTL_SECS: i64 = 3600;

const FIRST_NAMES: &[&str] = &[
    "Alex", "Jordan", "Sam", "Taylor", "Morgan", "Casey", "Riley", "Quinn", "Avery", "Dakota",
];
const LAST_NAMES: &[&str] = &[
    "Chen", "Smith", "Kim", "Garcia", "Patel", "Johnson", "Lee", "Wilson", "Zhang", "Brown",
];
const TICKET_NAMES: &[&str] = &[
    "General Admission",
    "VIP Pass",
    "Early Bird",
    "Student Ticket",
    "Speaker Pass",
    "Workshop",
];

/// Locally authored identity for mock mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockConfig {
    pub event_id: String,
    pub user_id: String,
    pub user_name: String,
    pub user_email: String,
    /// Empty means no avatar
    #[serde(default)]
    pub user_avatar: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub has_registration: bool,
    #[serde(default = "default_status")]
    pub registration_status: RegistrationStatus,
    #[serde(default)]
    pub ticket_id: String,
    #[serde(default)]
    pub ticket_name: String,
}

fn default_status() -> RegistrationStatus {
    RegistrationStatus::Approved
}

impl MockConfig {
    /// A plausible random identity
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        let first = FIRST_NAMES.choose(&mut rng).copied().unwrap_or("Alex");
        let last = LAST_NAMES.choose(&mut rng).copied().unwrap_or("Chen");
        let statuses = [
            RegistrationStatus::Approved,
            RegistrationStatus::Approved,
            RegistrationStatus::Approved,
            RegistrationStatus::Pending,
        ];

        Self {
            event_id: format!("evt_{}", random_alphanumeric(&mut rng, 20)),
            user_id: random_hex(&mut rng, 64),
            user_name: format!("{} {}", first, last),
            user_email: format!("{}.{}@example.com", first.to_lowercase(), last.to_lowercase()),
            user_avatar: String::new(),
            is_admin: rng.gen_bool(0.3),
            has_registration: rng.gen_bool(0.8),
            registration_status: statuses
                .choose(&mut rng)
                .copied()
                .unwrap_or(RegistrationStatus::Approved),
            ticket_id: format!("tkt_{}", random_alphanumeric(&mut rng, 16)),
            ticket_name: TICKET_NAMES
                .choose(&mut rng)
                .copied()
                .unwrap_or("General Admission")
                .to_string(),
        }
    }

    /// Claims a host would put in this user's credential
    pub fn claims(&self) -> Claims {
        let now = Utc::now().timestamp();
        let registration = if self.has_registration {
            json!({
                "status": self.registration_status,
                "ticket_id": self.ticket_id,
                "ticket_name": self.ticket_name,
            })
        } else {
            Value::Null
        };

        let claims = json!({
            "sub": self.user_id,
            "app_id": "dev_app",
            "client_id": "dev_client",
            "event_id": self.event_id,
            "name": self.user_name,
            "email": self.user_email,
            "picture": if self.user_avatar.is_empty() { Value::Null } else { json!(self.user_avatar) },
            "type": "widget",
            "role": if self.is_admin { json!("admin") } else { Value::Null },
            "registration": registration,
            "iat": now,
            "exp": now + MOCK_TOKEN_TTL_SECS,
        });

        match claims {
            Value::Object(map) => Claims::new(map),
            _ => Claims::default(),
        }
    }

    /// Unsigned token carrying [`MockConfig::claims`]
    pub fn token(&self) -> Result<String> {
        mock_token(&self.claims())
    }

    /// Session context for this identity
    pub fn build_context(&self) -> Result<SessionContext> {
        let claims = self.claims();
        let token = mock_token(&claims)?;
        Ok(SessionContext::from_claims(&claims, token))
    }
}

fn mock_token(claims: &Claims) -> Result<String> {
    encode_unsigned_token(&json!({"alg": "HS256", "typ": "JWT"}), claims, MOCK_SIGNATURE)
}

fn random_hex(rng: &mut impl Rng, len: usize) -> String {
    (0..len)
        .map(|_| std::char::from_digit(rng.gen_range(0..16), 16).unwrap_or('0'))
        .collect()
}

fn random_alphanumeric(rng: &mut impl Rng, len: usize) -> String {
    const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    (0..len)
        .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
        .collect()
}

/// Answers post requests locally without touching the network
#[derive(Debug, Default)]
pub struct MockPostTransport;

#[async_trait]
impl PostTransport for MockPostTransport {
    async fn create_post(&self, _target: PostTarget<'_>, options: &CreatePostOptions) -> Result<Post> {
        tracing::info!(content = %options.content, images = options.images.len(), "[HappeNow Dev] createPost");

        let now = Utc::now();
        Ok(Post {
            id: format!("post_dev_{}", now.timestamp_millis()),
            content: options.content.clone(),
            created_at: now.to_rfc3339(),
            extra: Default::default(),
        })
    }
}
