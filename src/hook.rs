use std::{fmt, str::FromStr, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::{
    cache::HookCache,
    config::ComplianceConfig,
    error::HookError,
    model::{ComplianceModel, ComplianceRequest, HttpComplianceModel},
    types::{CallType, CallerIdentity, ChatMessage, Lenient, PreCallRequest},
};

pub const COMPLIANCE_SYSTEM_PROMPT: &str = "You are a strict compliance assistant that rejects any message that involves personal information \
or confidential information about the company medialine. When you find the user message should be rejected, \
answer exactly with the words: 'compliance violation'. If the user message is ok, always simply reply with: 'conform'.";

/// Replaces the whole conversation once a message is flagged.
pub const REFUSAL_PROMPT: &str = "Simply return exactly the following: Please ensure you use a compliant language model \
in accordance with our company's regulations. Thank you for your cooperation.";

const CONFORM_MARKER: &str = "conform";
const VIOLATION_MARKER: &str = "compliance violation";

/// Callback the host proxy runs before forwarding a request.
#[async_trait]
pub trait PreCallHook: Send + Sync {
    async fn pre_call_hook(
        &self,
        caller: &CallerIdentity,
        cache: &dyn HookCache,
        request: PreCallRequest,
        call_type: CallType,
    ) -> Result<PreCallRequest, HookError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplianceVerdict {
    Conform,
    Violation,
}

impl ComplianceVerdict {
    /// A reply naming both markers counts as a violation.
    pub fn from_reply(reply: &str) -> Self {
        let reply = reply.to_lowercase();
        if reply.contains(CONFORM_MARKER) && !reply.contains(VIOLATION_MARKER) {
            ComplianceVerdict::Conform
        } else {
            ComplianceVerdict::Violation
        }
    }

    pub fn is_conformant(self) -> bool {
        self == ComplianceVerdict::Conform
    }
}

pub struct ComplianceHook {
    model: Arc<dyn ComplianceModel>,
    compliance_model_id: String,
}

impl ComplianceHook {
    pub fn new(model: Arc<dyn ComplianceModel>, compliance_model_id: impl Into<String>) -> Self {
        Self {
            model,
            compliance_model_id: compliance_model_id.into(),
        }
    }

    pub fn from_config(config: &ComplianceConfig) -> Result<Self, HookError> {
        let model = HttpComplianceModel::new(config)?;
        Ok(Self::new(Arc::new(model), config.model.clone()))
    }

    pub fn compliance_model_id(&self) -> &str {
        &self.compliance_model_id
    }

    pub async fn assess(&self, message: &str) -> Result<ComplianceVerdict, HookError> {
        let reply = self
            .model
            .complete(ComplianceRequest {
                system_prompt: COMPLIANCE_SYSTEM_PROMPT.to_owned(),
                user_message: message.to_owned(),
            })
            .await?;

        let verdict = ComplianceVerdict::from_reply(&reply);
        debug!(?verdict, reply = %reply.trim(), "compliance assessment");
        Ok(verdict)
    }
}

#[async_trait]
impl PreCallHook for ComplianceHook {
    async fn pre_call_hook(
        &self,
        caller: &CallerIdentity,
        _cache: &dyn HookCache,
        mut request: PreCallRequest,
        call_type: CallType,
    ) -> Result<PreCallRequest, HookError> {
        debug!(%call_type, user_id = ?caller.user_id, "inside compliance checker pre-call hook");

        if call_type != CallType::Completion {
            return Ok(request);
        }
        let Some(messages) = request.messages.as_ref() else {
            return Ok(request);
        };
        if request.model_name() == Some(self.compliance_model_id.as_str()) {
            return Ok(request);
        }

        let Lenient::Valid(entries) = messages else {
            return Err(HookError::InvalidRequest("`messages` is not a list".to_owned()));
        };

        let mut flagged = None;
        for (index, entry) in entries.iter().enumerate() {
            let Lenient::Valid(message) = entry else {
                return Err(HookError::InvalidRequest(format!(
                    "messages[{index}] is not an object"
                )));
            };
            let Some(text) = message.text() else {
                continue;
            };
            if !self.assess(text).await?.is_conformant() {
                flagged = Some(index);
                break;
            }
        }

        if let Some(index) = flagged {
            info!(
                model = ?request.model_name(),
                message_index = index,
                user_id = ?caller.user_id,
                team_id = ?caller.team_id,
                "compliance violation; replacing request messages"
            );
            request.set_messages(vec![ChatMessage::user(REFUSAL_PROMPT)]);
        }

        Ok(request)
    }
}

/// What the host does with a hook error that is not a surfaced service
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log and forward the original request unmodified.
    #[default]
    Open,
    /// Reject the request.
    Closed,
}

impl FailurePolicy {
    /// Decides what the host forwards. Works on the raw request body so a
    /// body that never parsed can still pass through untouched.
    pub fn resolve(
        self,
        original: Value,
        result: Result<Value, HookError>,
        compliance_model_id: &str,
    ) -> Result<Value, HookError> {
        let error = match result {
            Ok(request) => return Ok(request),
            Err(error) if error.is_surfaced() => return Err(error),
            Err(error) => error,
        };

        match self {
            FailurePolicy::Open => {
                let roles = original
                    .get("messages")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                    .map(|message| message.get("role").cloned().unwrap_or(Value::Null))
                    .collect::<Vec<_>>();
                error!(
                    %error,
                    model = ?original.get("model"),
                    compliance_model = %compliance_model_id,
                    ?roles,
                    "error in compliance check; forwarding request unchecked"
                );
                Ok(original)
            }
            FailurePolicy::Closed => Err(error),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = HookError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(FailurePolicy::Open),
            "closed" => Ok(FailurePolicy::Closed),
            other => Err(HookError::Config(format!(
                "COMPLIANCE_FAILURE_POLICY must be `open` or `closed`, got `{other}`"
            ))),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::Open => f.write_str("open"),
            FailurePolicy::Closed => f.write_str("closed"),
        }
    }
}
