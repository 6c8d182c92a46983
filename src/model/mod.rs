mod http;
mod mock;

use async_trait::async_trait;

use crate::error::HookError;

pub use http::HttpComplianceModel;
pub use mock::StaticComplianceModel;

#[derive(Debug, Clone)]
pub struct ComplianceRequest {
    pub system_prompt: String,
    pub user_message: String,
}

/// The secondary model that classifies a single message.
#[async_trait]
pub trait ComplianceModel: Send + Sync {
    /// Raw text reply of the compliance model.
    async fn complete(&self, request: ComplianceRequest) -> Result<String, HookError>;
}
