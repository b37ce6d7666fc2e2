//! Session context derived from credential claims

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::credential::Claims;
use crate::error::WidgetError;

/// Claim value that marks an administrator
pub const ADMIN_ROLE: &str = "admin";

/// Registration status of the user for the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    Pending,
    Approved,
    Cancelled,
    Rejected,
}

impl std::str::FromStr for RegistrationStatus {
    type Err = WidgetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "cancelled" => Ok(Self::Cancelled),
            "rejected" => Ok(Self::Rejected),
            other => Err(WidgetError::Serialization(format!(
                "unknown registration status '{}'",
                other
            ))),
        }
    }
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The user's registration for the event.
///
/// Sub-fields missing from the claims stay `None`; they are not defaulted.
/// Values the widget cannot represent also read as `None`: a `status` outside
/// the four known states, or a non-string `ticket_id`/`ticket_name`. The
/// untouched claim is still available by decoding [`SessionContext::token`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RegistrationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_name: Option<String>,
}

/// Identity and session snapshot for the embedded widget.
///
/// Built once per successful initialization and replaced wholesale on the
/// next one. Serializes to the camelCase shape the host page expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub event_id: String,
    pub user_id: String,
    pub user_name: String,
    pub user_email: String,
    pub user_avatar: Option<String>,
    pub is_admin: bool,
    pub registration: Option<Registration>,
    /// The credential this context was derived from
    pub token: String,
}

impl SessionContext {
    /// Build a context from decoded claims. Never fails.
    pub fn from_claims(claims: &Claims, token: impl Into<String>) -> Self {
        let text = |key: &str| claims.str_claim(key).unwrap_or_default().to_string();

        Self {
            event_id: text("event_id"),
            user_id: text("sub"),
            user_name: text("name"),
            user_email: text("email"),
            user_avatar: claims.str_claim("picture").map(str::to_string),
            is_admin: claims.get("role").and_then(Value::as_str) == Some(ADMIN_ROLE),
            registration: claims
                .get("registration")
                .filter(|v| is_truthy(v))
                .map(registration_from_claim),
            token: token.into(),
        }
    }

    /// Whether the user holds an approved registration
    pub fn is_registered(&self) -> bool {
        matches!(
            self.registration,
            Some(Registration {
                status: Some(RegistrationStatus::Approved),
                ..
            })
        )
    }
}

fn registration_from_claim(value: &Value) -> Registration {
    let field = |key: &str| value.get(key).and_then(Value::as_str);

    let status = field("status").and_then(|s| match s.parse::<RegistrationStatus>() {
        Ok(status) => Some(status),
        Err(e) => {
            tracing::debug!(error = %e, "Dropping registration status from claims");
            None
        }
    });

    Registration {
        status,
        ticket_id: field("ticket_id").map(str::to_string),
        ticket_name: field("ticket_name").map(str::to_string),
    }
}

/// Truthiness of a claim value as the host page's scripts see it
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
