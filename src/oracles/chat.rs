//! OpenAI-compatible chat completions client

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use super::{ChatRequest, ConversationOracle, check_status, http_client, require_key};
use crate::config::ChatConfig;
use crate::models::Role;
use crate::{CompanionError, Result};

pub struct ChatCompletionsClient {
    client: ClientWithMiddleware,
    endpoint: String,
    api_key: String,
    model: String,
    structured_output: bool,
}

impl ChatCompletionsClient {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let api_key = require_key(config.api_key.as_deref(), "chat.api_key")?;
        Ok(Self {
            client: http_client(config.timeout(), config.max_retries)?,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            structured_output: config.structured_output,
        })
    }

    fn body(&self, request: &ChatRequest) -> CompletionBody {
        let mut messages = Vec::with_capacity(request.history.len() + 2);
        messages.push(json!({"role": "system", "content": request.instructions}));
        for message in &request.history {
            let role = match message.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            messages.push(json!({"role": role, "content": message.content}));
        }

        let user = match &request.attachment {
            Some(attachment) => json!({
                "role": "user",
                "content": [
                    {"type": "text", "text": request.message},
                    {"type": "image_url", "image_url": {
                        "url": format!("data:{};base64,{}", attachment.mime_type, attachment.data)
                    }}
                ]
            }),
            None => json!({"role": "user", "content": request.message}),
        };
        messages.push(user);

        CompletionBody {
            model: self.model.clone(),
            messages,
            response_format: self
                .structured_output
                .then(|| json!({"type": "json_object"})),
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionBody {
    model: String,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn first_content(response: CompletionResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| CompanionError::oracle("chat completion returned no content"))
}

#[async_trait]
impl ConversationOracle for ChatCompletionsClient {
    fn structured_output(&self) -> bool {
        self.structured_output
    }

    #[instrument(skip_all, fields(model = %self.model, history = request.history.len()))]
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let body = serde_json::to_vec(&self.body(request))
            .map_err(|e| CompanionError::general(format!("Failed to encode chat request: {e}")))?;

        debug!("Calling the chat API");
        let response = self
            .client
            .post(&self.endpoint)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        let response = check_status(response, "Chat API").await?;
        let response: CompletionResponse = response.json().await?;

        first_content(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Attachment, ChatMessage};

    fn client(structured_output: bool) -> ChatCompletionsClient {
        ChatCompletionsClient::new(&ChatConfig {
            api_key: Some("sk-test".to_string()),
            structured_output,
            ..ChatConfig::default()
        })
        .unwrap()
    }

    fn request() -> ChatRequest {
        ChatRequest {
            instructions: "be helpful".to_string(),
            history: vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")],
            message: "coffee?".to_string(),
            attachment: None,
        }
    }

    #[test]
    fn test_missing_key_is_config_error() {
        assert!(ChatCompletionsClient::new(&ChatConfig::default()).err().unwrap().is_config());
    }

    #[test]
    fn test_body_orders_system_history_then_message() {
        let body = serde_json::to_value(client(true).body(&request())).unwrap();

        let roles: Vec<_> = body["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(body["messages"][3]["content"], "coffee?");
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[test]
    fn test_unstructured_body_has_no_response_format() {
        let body = serde_json::to_value(client(false).body(&request())).unwrap();
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn test_attachment_becomes_image_part() {
        let mut request = request();
        request.attachment = Some(Attachment {
            mime_type: "image/jpeg".to_string(),
            data: "AAAA".to_string(),
        });

        let body = serde_json::to_value(client(true).body(&request)).unwrap();
        let parts = &body["messages"][3]["content"];
        assert_eq!(parts[1]["image_url"]["url"], "data:image/jpeg;base64,AAAA");
    }

    #[test]
    fn test_first_content() {
        let response: CompletionResponse = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"text\":\"hi\"}"}}]
        }))
        .unwrap();
        assert_eq!(first_content(response).unwrap(), "{\"text\":\"hi\"}");

        let empty: CompletionResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(first_content(empty).is_err());
    }
}
