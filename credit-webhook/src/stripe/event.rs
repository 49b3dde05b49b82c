//! Stripe event envelope and the typed events the handler dispatches on.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

/// Event type that grants credit.
pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";

/// Metadata key the checkout page stores the user identifier under.
pub const USER_ID_METADATA_KEY: &str = "userId";

/// Raw event envelope as delivered by Stripe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(default)]
    pub data: EventData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventData {
    #[serde(default)]
    pub object: serde_json::Value,
}

/// The subset of a Checkout Session this service reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSession {
    /// The user this checkout pays for. Missing and empty both read as `None`.
    pub fn user_id(&self) -> Option<&str> {
        self.metadata
            .get(USER_ID_METADATA_KEY)
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }
}

/// Events after decoding, one variant per branch of the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    CheckoutSessionCompleted {
        event_id: Option<String>,
        session: CheckoutSession,
    },
    Unhandled {
        event_id: Option<String>,
        event_type: String,
    },
}

impl WebhookEvent {
    pub fn event_type(&self) -> &str {
        match self {
            WebhookEvent::CheckoutSessionCompleted { .. } => CHECKOUT_SESSION_COMPLETED,
            WebhookEvent::Unhandled { event_type, .. } => event_type.as_str(),
        }
    }

    pub fn event_id(&self) -> Option<&str> {
        match self {
            WebhookEvent::CheckoutSessionCompleted { event_id, .. }
            | WebhookEvent::Unhandled { event_id, .. } => event_id.as_deref(),
        }
    }
}

impl From<Event> for WebhookEvent {
    fn from(event: Event) -> Self {
        if event.event_type != CHECKOUT_SESSION_COMPLETED {
            return WebhookEvent::Unhandled {
                event_id: event.id,
                event_type: event.event_type,
            };
        }

        // A session object we cannot read yields an empty session, which the
        // handler rejects as missing its user id.
        let session = serde_json::from_value(event.data.object).unwrap_or_else(|e| {
            warn!(event_id = ?event.id, error = %e, "checkout_session_decode_failed");
            CheckoutSession::default()
        });

        WebhookEvent::CheckoutSessionCompleted {
            event_id: event.id,
            session,
        }
    }
}

/// Stripe sends `"metadata": null` on some objects.
fn null_as_empty<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<HashMap<String, String>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(value: serde_json::Value) -> WebhookEvent {
        let event: Event = serde_json::from_value(value).unwrap();
        WebhookEvent::from(event)
    }

    #[test]
    fn test_checkout_completed_with_user() {
        let event = decode(json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {"object": {"id": "cs_1", "object": "checkout.session", "metadata": {"userId": "u1"}}}
        }));

        match &event {
            WebhookEvent::CheckoutSessionCompleted { event_id, session } => {
                assert_eq!(event_id.as_deref(), Some("evt_1"));
                assert_eq!(session.id.as_deref(), Some("cs_1"));
                assert_eq!(session.user_id(), Some("u1"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(event.event_type(), CHECKOUT_SESSION_COMPLETED);
    }

    #[test]
    fn test_checkout_completed_metadata_variants() {
        for metadata in [json!(null), json!({}), json!({"userId": ""}), json!({"other": "x"})] {
            let event = decode(json!({
                "type": "checkout.session.completed",
                "data": {"object": {"metadata": metadata}}
            }));

            match event {
                WebhookEvent::CheckoutSessionCompleted { session, .. } => {
                    assert_eq!(session.user_id(), None)
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[test]
    fn test_checkout_completed_unreadable_object() {
        let event = decode(json!({
            "type": "checkout.session.completed",
            "data": {"object": "not-an-object"}
        }));

        assert_eq!(
            event,
            WebhookEvent::CheckoutSessionCompleted {
                event_id: None,
                session: CheckoutSession::default(),
            }
        );
    }

    #[test]
    fn test_other_event_types_are_unhandled() {
        let event = decode(json!({
            "id": "evt_2",
            "type": "payment_intent.created",
            "data": {"object": {"metadata": {"userId": "u1"}}}
        }));

        assert_eq!(event.event_type(), "payment_intent.created");
        assert_eq!(event.event_id(), Some("evt_2"));
        assert!(matches!(event, WebhookEvent::Unhandled { .. }));
    }

    #[test]
    fn test_envelope_requires_type() {
        let result: Result<Event, _> = serde_json::from_value(json!({"id": "evt_3"}));
        assert!(result.is_err());
    }
}
