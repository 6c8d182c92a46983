use thiserror::Error;

/// Errors crossing the compliance hook boundary.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("invalid compliance configuration: {0}")]
    Config(String),

    /// Transport failure or non-2xx reply from the compliance endpoint.
    #[error("error in compliance check: {0}")]
    Upstream(#[source] reqwest::Error),

    /// The inbound request body does not have the shape a chat request needs.
    #[error("invalid request body: {0}")]
    InvalidRequest(String),

    #[error("unexpected compliance model response: {0}")]
    MalformedResponse(String),

    #[error("failed to build compliance http client: {0}")]
    Client(#[source] reqwest::Error),
}

impl HookError {
    /// Surfaced errors reach the caller as a service error whatever the
    /// failure policy says.
    pub fn is_surfaced(&self) -> bool {
        matches!(self, HookError::Upstream(_))
    }

    pub fn status(&self) -> u16 {
        500
    }
}

#[cfg(test)]
mod tests {
    use super::HookError;

    #[test]
    fn only_upstream_errors_are_surfaced() {
        assert!(!HookError::Config("empty url".into()).is_surfaced());
        assert!(!HookError::MalformedResponse("no choices".into()).is_surfaced());
        assert!(!HookError::InvalidRequest("messages[1] is not an object".into()).is_surfaced());
        assert_eq!(HookError::Config("x".into()).status(), 500);
    }
}
