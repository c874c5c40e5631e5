//! HTTP completion client for an Anthropic-style messages API.

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use tome_core::Role;

use crate::error::CompletionError;
use crate::service::CompletionService;
use crate::types::{CompletionOutput, CompletionRequest};

const API_VERSION: &str = "2023-06-01";

/// Completion service backed by a messages-API endpoint over HTTPS.
///
/// Structured choice is expressed through the API's tool mechanism: each
/// [`ToolSpec`](crate::types::ToolSpec) becomes a parameterless tool and
/// `tool_choice: any` forces the model to pick one.
pub struct HttpCompletion {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl HttpCompletion {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Build the JSON request body for the messages endpoint.
    ///
    /// System-role messages are folded into the top-level `system` field,
    /// which is where this API expects them.
    fn build_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let mut system_parts: Vec<&str> = Vec::new();
        if let Some(ref s) = request.system {
            system_parts.push(s);
        }

        let mut messages = Vec::new();
        for msg in &request.messages {
            match msg.role {
                Role::System => system_parts.push(&msg.content),
                Role::User | Role::Assistant => messages.push(json!({
                    "role": msg.role.as_str(),
                    "content": msg.content,
                })),
            }
        }

        let mut body = json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "messages": messages,
        });

        if !system_parts.is_empty() {
            body["system"] = json!(system_parts.join("\n\n"));
        }

        if request.is_choice() {
            let tools: Vec<serde_json::Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": {"type": "object", "properties": {}},
                    })
                })
                .collect();
            body["tools"] = json!(tools);
            body["tool_choice"] = json!({"type": "any"});
        }

        body
    }

    /// Parse a messages-API response body into a [`CompletionOutput`].
    ///
    /// A `tool_use` block wins over text blocks; multiple text blocks are
    /// concatenated.
    fn parse_response(body: &str) -> Result<CompletionOutput, CompletionError> {
        let response: WireResponse = serde_json::from_str(body)
            .map_err(|e| CompletionError::InvalidResponse(e.to_string()))?;

        let mut text = String::new();
        for block in response.content {
            match block {
                WireContent::ToolUse { name } => {
                    return Ok(CompletionOutput::ToolChoice { name });
                }
                WireContent::Text { text: t } => text.push_str(&t),
                WireContent::Unknown => {}
            }
        }

        if text.is_empty() {
            return Err(CompletionError::InvalidResponse(
                "response carried no text or tool_use content".to_string(),
            ));
        }
        Ok(CompletionOutput::Text(text))
    }
}

impl CompletionService for HttpCompletion {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionOutput, CompletionError> {
        let body = self.build_body(&request);
        debug!(model = %self.model, choice = request.is_choice(), "Sending completion request");

        let response = self
            .client
            .post(format!("{}/v1/messages", self.api_base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionError::Http(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CompletionError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(CompletionError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        Self::parse_response(&text)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Deserialize)]
struct WireResponse {
    content: Vec<WireContent>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireContent {
    Text { text: String },
    ToolUse { name: String },
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolSpec;
    use tome_core::Message;

    fn client() -> HttpCompletion {
        HttpCompletion::new("https://api.example.com/", "test-key", "test-model")
    }

    // ---- Request body construction ----

    #[test]
    fn test_build_body_text_request() {
        let req = CompletionRequest::text(
            vec![Message::user("hello"), Message::assistant("hi")],
            256,
        );
        let body = client().build_body(&req);

        assert_eq!(body["model"], "test-model");
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][1]["role"], "assistant");
        assert!(body.get("tools").is_none());
        assert!(body.get("system").is_none());
    }

    #[test]
    fn test_build_body_folds_system_messages() {
        let req = CompletionRequest::text(
            vec![Message::system("inline rules"), Message::user("go")],
            64,
        )
        .with_system("outer rules");
        let body = client().build_body(&req);

        let system = body["system"].as_str().unwrap();
        assert!(system.contains("outer rules"));
        assert!(system.contains("inline rules"));
        // System messages never appear in the message list.
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_build_body_choice_request_forces_tool() {
        let req = CompletionRequest::choice(
            vec![Message::user("route")],
            vec![
                ToolSpec::new("answer_question", "default"),
                ToolSpec::new("explore_overview", "exploration"),
            ],
            64,
        );
        let body = client().build_body(&req);

        let tools = body["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0]["name"], "answer_question");
        assert_eq!(tools[0]["input_schema"]["type"], "object");
        assert_eq!(body["tool_choice"]["type"], "any");
    }

    #[test]
    fn test_api_base_trailing_slash_trimmed() {
        let c = HttpCompletion::new("https://api.example.com///", "k", "m");
        assert_eq!(c.api_base, "https://api.example.com");
    }

    // ---- Response parsing ----

    #[test]
    fn test_parse_text_response() {
        let body = r#"{"content": [{"type": "text", "text": "an answer"}]}"#;
        let out = HttpCompletion::parse_response(body).unwrap();
        assert_eq!(out.as_text(), Some("an answer"));
    }

    #[test]
    fn test_parse_multiple_text_blocks_concatenated() {
        let body = r#"{"content": [
            {"type": "text", "text": "part one "},
            {"type": "text", "text": "part two"}
        ]}"#;
        let out = HttpCompletion::parse_response(body).unwrap();
        assert_eq!(out.as_text(), Some("part one part two"));
    }

    #[test]
    fn test_parse_tool_use_wins_over_text() {
        let body = r#"{"content": [
            {"type": "text", "text": "thinking..."},
            {"type": "tool_use", "id": "t1", "name": "explore_overview", "input": {}}
        ]}"#;
        let out = HttpCompletion::parse_response(body).unwrap();
        assert_eq!(out.as_choice(), Some("explore_overview"));
    }

    #[test]
    fn test_parse_unknown_block_types_skipped() {
        let body = r#"{"content": [
            {"type": "thinking", "thinking": "..."},
            {"type": "text", "text": "done"}
        ]}"#;
        let out = HttpCompletion::parse_response(body).unwrap();
        assert_eq!(out.as_text(), Some("done"));
    }

    #[test]
    fn test_parse_empty_content_is_error() {
        let body = r#"{"content": []}"#;
        let err = HttpCompletion::parse_response(body).unwrap_err();
        assert!(matches!(err, CompletionError::InvalidResponse(_)));
    }

    #[test]
    fn test_parse_malformed_json_is_error() {
        let err = HttpCompletion::parse_response("not json").unwrap_err();
        assert!(matches!(err, CompletionError::InvalidResponse(_)));
    }
}
