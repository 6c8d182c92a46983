use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Request body handed to a pre-call hook. Fields the hook does not care
/// about are kept in `extra` and written back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreCallRequest {
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub model: Option<Lenient<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub messages: Option<Lenient<Vec<Lenient<ChatMessage>>>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PreCallRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        let mut request = Self {
            model: Some(Lenient::Valid(model.into())),
            messages: None,
            extra: Map::new(),
        };
        request.set_messages(messages);
        request
    }

    pub fn model_name(&self) -> Option<&str> {
        self.model.as_ref().and_then(Lenient::valid).map(String::as_str)
    }

    pub fn set_messages(&mut self, messages: Vec<ChatMessage>) {
        self.messages = Some(Lenient::Valid(
            messages.into_iter().map(Lenient::Valid).collect(),
        ));
    }
}

/// A value of the expected shape, or whatever the caller actually sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Lenient<T> {
    Valid(T),
    Invalid(Value),
}

impl<T> Lenient<T> {
    pub fn valid(&self) -> Option<&T> {
        match self {
            Lenient::Valid(value) => Some(value),
            Lenient::Invalid(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub role: Option<Lenient<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub content: Option<MessageContent>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Some(Lenient::Valid(role.into())),
            content: Some(MessageContent::Text(content.into())),
            extra: Map::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn role_name(&self) -> Option<&str> {
        self.role.as_ref().and_then(Lenient::valid).map(String::as_str)
    }

    /// Plain-text content, if the message has any.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            Some(MessageContent::Text(text)) => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    /// Content parts, `null` and anything else that is not a plain string.
    Structured(Value),
}

// A key that is present, even as `null`, must survive a round trip, so it
// always becomes `Some`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CallType {
    Completion,
    TextCompletion,
    Embeddings,
    ImageGeneration,
    Moderation,
    AudioTranscription,
    Rerank,
    PassThroughEndpoint,
    Other(String),
}

impl CallType {
    pub fn as_str(&self) -> &str {
        match self {
            CallType::Completion => "completion",
            CallType::TextCompletion => "text_completion",
            CallType::Embeddings => "embeddings",
            CallType::ImageGeneration => "image_generation",
            CallType::Moderation => "moderation",
            CallType::AudioTranscription => "audio_transcription",
            CallType::Rerank => "rerank",
            CallType::PassThroughEndpoint => "pass_through_endpoint",
            CallType::Other(raw) => raw,
        }
    }
}

impl From<String> for CallType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "completion" => CallType::Completion,
            "text_completion" => CallType::TextCompletion,
            "embeddings" => CallType::Embeddings,
            "image_generation" => CallType::ImageGeneration,
            "moderation" => CallType::Moderation,
            "audio_transcription" => CallType::AudioTranscription,
            "rerank" => CallType::Rerank,
            "pass_through_endpoint" => CallType::PassThroughEndpoint,
            _ => CallType::Other(raw),
        }
    }
}

impl From<CallType> for String {
    fn from(call_type: CallType) -> Self {
        call_type.as_str().to_owned()
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is calling, as resolved by the host's key validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallerIdentity {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub key_alias: Option<String>,
}
