use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

#[derive(Debug, Clone, PartialEq)]
pub enum OrderStatusUpdateResult {
    Updated {
        response_data: JsonValue,
    },
    Failed {
        status_code: Option<u16>,
        error_detail: String,
    },
}

impl OrderStatusUpdateResult {
    pub fn is_success(&self) -> bool {
        matches!(self, OrderStatusUpdateResult::Updated { .. })
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            OrderStatusUpdateResult::Failed {
                status_code: Some(401),
                ..
            }
        )
    }

    pub fn error_detail(&self) -> Option<&str> {
        match self {
            OrderStatusUpdateResult::Updated { .. } => None,
            OrderStatusUpdateResult::Failed { error_detail, .. } => Some(error_detail),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,

    #[serde(flatten)]
    pub fields: Map<String, JsonValue>,
}

impl OrderDetails {
    pub fn recipient(&self) -> Option<&str> {
        self.user_email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
    }
}
