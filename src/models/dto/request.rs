use serde::Deserialize;
use validator::Validate;

/// Inbound message delivered by the transport adapter webhook.
#[derive(Debug, Deserialize, Validate)]
pub struct InboundMessageRequest {
    #[validate(length(min = 1, max = 64))]
    pub user_id: String,
    #[validate(length(min = 1, max = 64))]
    pub channel_address: String,
    #[validate(length(min = 1, max = 4096))]
    pub text: String,
}
