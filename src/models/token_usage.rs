use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One chargeable call, recorded after the upstream provider responds (or
/// after the final chunk of a stream). Append-only, like [`crate::models::AuditLog`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsage {
    pub id: Uuid,
    pub user_id: Uuid,
    pub model: String,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub timestamp: DateTime<Utc>,
    pub request_id: Uuid,
    pub endpoint: String,
}

impl TokenUsage {
    pub fn new(
        user_id: Uuid,
        model: impl Into<String>,
        prompt_tokens: i64,
        completion_tokens: i64,
        request_id: Uuid,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            model: model.into(),
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            timestamp: Utc::now(),
            request_id,
            endpoint: endpoint.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_is_sum_of_prompt_and_completion() {
        let usage = TokenUsage::new(Uuid::new_v4(), "gpt-4", 10, 20, Uuid::new_v4(), "/v1/chat/completions");
        assert_eq!(usage.total_tokens, 30);
    }
}
