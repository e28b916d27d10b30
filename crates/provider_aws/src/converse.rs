//! Bedrock Runtime `Converse` adapter.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use core_types::{
    ModelAdapter, ToolSpec, UnifiedEvent, UnifiedEventStream, UnifiedGenerateRequest,
    UnifiedMessage, UnifiedRole,
};
use reqwest::Method;
use serde_json::{Value, json};

use crate::client::{Endpoint, SignedClient, SignedRequest};

pub struct ConverseAdapter {
    client: SignedClient,
    endpoint: Endpoint,
}

impl ConverseAdapter {
    pub fn new(client: SignedClient, endpoint: Endpoint) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl ModelAdapter for ConverseAdapter {
    async fn generate(&self, request: UnifiedGenerateRequest) -> Result<UnifiedEventStream> {
        let model = request.model.trim();
        if model.is_empty() {
            bail!("converse model id is required");
        }

        let body = to_converse_body(&request);
        let signed = SignedRequest::new(Method::POST, &self.endpoint, &["model", model, "converse"])
            .json(&body);
        let payload: Value = self
            .client
            .send_json(signed)
            .await
            .context("converse request failed")?;

        let events = map_converse_response(&payload)?
            .into_iter()
            .map(Ok)
            .collect::<Vec<Result<UnifiedEvent>>>();
        Ok(Box::pin(futures::stream::iter(events)))
    }
}

fn to_converse_body(request: &UnifiedGenerateRequest) -> Value {
    let mut body = json!({
        "messages": to_converse_messages(&request.messages),
        "system": [{ "text": request.system }],
    });
    if let Some(max_tokens) = request.max_tokens {
        body["inferenceConfig"] = json!({ "maxTokens": max_tokens });
    }
    if !request.tools.is_empty() {
        body["toolConfig"] = json!({ "tools": to_converse_tools(&request.tools) });
    }
    body
}

/// Converse rejects consecutive turns from the same role, so adjacent
/// messages that map to the same role are folded into one turn.
fn to_converse_messages(messages: &[UnifiedMessage]) -> Vec<Value> {
    let mut turns: Vec<(&'static str, Vec<Value>)> = Vec::new();

    for msg in messages {
        let (role, block) = match msg.role {
            UnifiedRole::User => ("user", json!({ "text": msg.content })),
            UnifiedRole::Assistant => match (&msg.tool_call_id, &msg.tool_name) {
                (Some(call_id), Some(name)) => {
                    let input = msg
                        .tool_arguments_json
                        .as_deref()
                        .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
                        .unwrap_or_else(|| json!({}));
                    (
                        "assistant",
                        json!({ "toolUse": { "toolUseId": call_id, "name": name, "input": input } }),
                    )
                }
                _ if msg.content.is_empty() => continue,
                _ => ("assistant", json!({ "text": msg.content })),
            },
            UnifiedRole::Tool => (
                "user",
                json!({
                    "toolResult": {
                        "toolUseId": msg.tool_call_id.clone().unwrap_or_default(),
                        "content": [{ "text": msg.content }],
                        "status": if msg.is_error { "error" } else { "success" },
                    }
                }),
            ),
        };

        match turns.last_mut() {
            Some((last_role, blocks)) if *last_role == role => blocks.push(block),
            _ => turns.push((role, vec![block])),
        }
    }

    turns
        .into_iter()
        .map(|(role, content)| json!({ "role": role, "content": content }))
        .collect()
}

fn to_converse_tools(tools: &[ToolSpec]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "toolSpec": {
                    "name": tool.name,
                    "description": tool.description,
                    "inputSchema": { "json": tool.input_schema }
                }
            })
        })
        .collect()
}

fn map_converse_response(payload: &Value) -> Result<Vec<UnifiedEvent>> {
    let content = payload
        .pointer("/output/message/content")
        .and_then(Value::as_array)
        .context("converse response has no output message")?;

    let mut events = Vec::new();
    for block in content {
        if let Some(text) = block.get("text").and_then(Value::as_str) {
            if !text.is_empty() {
                events.push(UnifiedEvent::TextDelta {
                    text: text.to_string(),
                });
            }
        }
        if let Some(tool_use) = block.get("toolUse") {
            events.push(UnifiedEvent::ToolCallRequested {
                call_id: tool_use
                    .get("toolUseId")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                name: tool_use
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                arguments_json: tool_use
                    .get("input")
                    .cloned()
                    .unwrap_or_else(|| json!({}))
                    .to_string(),
            });
        }
    }

    if let Some(usage) = payload.get("usage") {
        events.push(UnifiedEvent::Usage {
            input_tokens: usage.get("inputTokens").and_then(Value::as_u64).unwrap_or(0),
            output_tokens: usage.get("outputTokens").and_then(Value::as_u64).unwrap_or(0),
            total_tokens: usage.get("totalTokens").and_then(Value::as_u64),
        });
    }

    match payload.get("stopReason").and_then(Value::as_str) {
        Some("guardrail_intervened") | Some("content_filtered") => {
            events.push(UnifiedEvent::Failed {
                code: "content_filtered".to_string(),
                message: "the model response was blocked by a content filter".to_string(),
                retriable: false,
            });
        }
        _ => events.push(UnifiedEvent::Completed),
    }

    Ok(events)
}
