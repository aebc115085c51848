use anyhow::{Error, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEvent {
    #[serde(deserialize_with = "deserialize_order_id")]
    pub order_id: String,

    #[serde(
        default,
        deserialize_with = "deserialize_lenient_email",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_email: Option<String>,

    #[serde(
        default,
        deserialize_with = "deserialize_lenient_amount",
        skip_serializing_if = "Option::is_none"
    )]
    pub amount: Option<f64>,

    #[serde(
        default,
        deserialize_with = "deserialize_lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<String>,

    #[serde(
        default,
        deserialize_with = "deserialize_lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

impl PaymentEvent {
    /// Parses a broker payload. An event without a usable `orderId` is
    /// malformed and can never be processed.
    pub fn parse(payload: &[u8]) -> Result<Self, Error> {
        let event = serde_json::from_slice::<Self>(payload)?;

        if event.order_id.trim().is_empty() {
            return Err(anyhow!("Payment event has a blank orderId"));
        }

        Ok(event)
    }

    /// The event-carried recipient, if it holds anything.
    pub fn recipient_hint(&self) -> Option<&str> {
        self.user_email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawOrderId {
    Text(String),
    Number(serde_json::Number),
}

impl From<RawOrderId> for String {
    fn from(raw: RawOrderId) -> Self {
        match raw {
            RawOrderId::Text(text) => text,
            RawOrderId::Number(number) => number.to_string(),
        }
    }
}

/// Order ids arrive both as JSON strings and as numbers.
pub fn deserialize_order_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    RawOrderId::deserialize(deserializer).map(String::from)
}

pub fn deserialize_optional_order_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<RawOrderId>::deserialize(deserializer).map(|raw| raw.map(String::from))
}

// Informational fields only: a value of the wrong shape becomes `None` rather
// than failing the whole event.

fn deserialize_lenient_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let amount = match Option::<JsonValue>::deserialize(deserializer)? {
        Some(JsonValue::Number(number)) => number.as_f64(),
        Some(JsonValue::String(text)) => text.trim().parse::<f64>().ok(),
        _ => None,
    };

    Ok(amount.filter(|amount| amount.is_finite()))
}

fn deserialize_lenient_email<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<JsonValue>::deserialize(deserializer)? {
        Some(JsonValue::String(text)) => Some(text),
        _ => None,
    })
}

fn deserialize_lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<JsonValue>::deserialize(deserializer)? {
        Some(JsonValue::String(text)) => Some(text),
        Some(JsonValue::Number(number)) => Some(number.to_string()),
        Some(JsonValue::Bool(flag)) => Some(flag.to_string()),
        _ => None,
    })
}

/// RFC 3339 strings, or epoch milliseconds as a number or numeric string.
fn deserialize_lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<JsonValue>::deserialize(deserializer)? {
        Some(JsonValue::Number(number)) => number.as_i64().and_then(DateTime::from_timestamp_millis),
        Some(JsonValue::String(text)) => DateTime::parse_from_rfc3339(text.trim())
            .map(|parsed| parsed.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                text.trim()
                    .parse::<i64>()
                    .ok()
                    .and_then(DateTime::from_timestamp_millis)
            }),
        _ => None,
    })
}
