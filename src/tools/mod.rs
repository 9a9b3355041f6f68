//! Typed tool surface.
//!
//! The four call operations as they are exposed to the stdio tool server
//! (an external collaborator). Inputs deserialize straight from the tool
//! call arguments; outputs are the human-readable blocks the agent reads.
//! Failures collapse to a single `Error: <kind>[: <detail>]` line plus an
//! error flag.

use std::sync::Arc;

use serde::Deserialize;

use crate::core::orchestrator::CallOrchestrator;
use crate::errors::call_error::CallError;

#[derive(Debug, Clone, Deserialize)]
pub struct InitiateCallInput {
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContinueCallInput {
    pub call_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeakToUserInput {
    pub call_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndCallInput {
    pub call_id: String,
    pub message: String,
}

/// Tool call outcome handed back to the tool server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResponse {
    pub text: String,
    pub is_error: bool,
}

impl ToolResponse {
    fn ok(text: String) -> Self {
        Self {
            text,
            is_error: false,
        }
    }

    fn error(err: &CallError) -> Self {
        Self {
            text: err.tool_line(),
            is_error: true,
        }
    }
}

/// Binds the four tools to the orchestrator.
pub struct ToolSurface {
    orchestrator: Arc<CallOrchestrator>,
}

impl ToolSurface {
    pub fn new(orchestrator: Arc<CallOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// `initiate_call {message}`
    pub async fn initiate_call(&self, input: InitiateCallInput) -> ToolResponse {
        match self.orchestrator.initiate(&input.message).await {
            Ok((call_id, reply)) => ToolResponse::ok(format!(
                "Call initiated successfully.\n\nCall ID: {call_id}\n\nUser's response:\n{reply}\n\nUse continue_call to ask follow-ups or end_call to hang up."
            )),
            Err(e) => ToolResponse::error(&e),
        }
    }

    /// `continue_call {call_id, message}`
    pub async fn continue_call(&self, input: ContinueCallInput) -> ToolResponse {
        match self
            .orchestrator
            .continue_call(&input.call_id, &input.message)
            .await
        {
            Ok(reply) => ToolResponse::ok(format!("User's response:\n{reply}")),
            Err(e) => ToolResponse::error(&e),
        }
    }

    /// `speak_to_user {call_id, message}`
    pub async fn speak_to_user(&self, input: SpeakToUserInput) -> ToolResponse {
        match self
            .orchestrator
            .speak(&input.call_id, &input.message)
            .await
        {
            Ok(()) => ToolResponse::ok(format!("Message spoken: \"{}\"", input.message)),
            Err(e) => ToolResponse::error(&e),
        }
    }

    /// `end_call {call_id, message}`
    pub async fn end_call(&self, input: EndCallInput) -> ToolResponse {
        match self.orchestrator.end(&input.call_id, &input.message).await {
            Ok(duration) => ToolResponse::ok(format!("Call ended. Duration: {duration}s")),
            Err(e) => ToolResponse::error(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_schemas_deserialize() {
        let initiate: InitiateCallInput =
            serde_json::from_str(r#"{"message":"Hello."}"#).unwrap();
        assert_eq!(initiate.message, "Hello.");

        let cont: ContinueCallInput =
            serde_json::from_str(r#"{"call_id":"call-0-1700000000","message":"Still there?"}"#)
                .unwrap();
        assert_eq!(cont.call_id, "call-0-1700000000");

        // Missing required fields are rejected
        assert!(serde_json::from_str::<ContinueCallInput>(r#"{"message":"hi"}"#).is_err());
        assert!(serde_json::from_str::<EndCallInput>(r#"{"call_id":"x"}"#).is_err());
    }

    #[test]
    fn test_error_response_formatting() {
        let resp = ToolResponse::error(&CallError::CallHungUp);
        assert!(resp.is_error);
        assert_eq!(resp.text, "Error: CallHungUp");

        let resp = ToolResponse::error(&CallError::ProviderError(
            "one active call at a time".to_string(),
        ));
        assert_eq!(resp.text, "Error: ProviderError: one active call at a time");
    }
}
