use async_trait::async_trait;

use crate::error::HookError;

use super::{ComplianceModel, ComplianceRequest};

/// Answers every request with the same reply.
#[derive(Debug, Clone)]
pub struct StaticComplianceModel {
    reply: String,
}

impl StaticComplianceModel {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }

    pub fn conform() -> Self {
        Self::new("conform")
    }

    pub fn violation() -> Self {
        Self::new("compliance violation")
    }
}

#[async_trait]
impl ComplianceModel for StaticComplianceModel {
    async fn complete(&self, _request: ComplianceRequest) -> Result<String, HookError> {
        Ok(self.reply.clone())
    }
}
