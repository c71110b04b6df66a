use serde_json::{json, Map, Value};

use super::collapse_parts;
use super::json::to_arguments_text;
use crate::errors::{PomlError, PomlResult};
use crate::models::content::{ContentPart, Multimedia};
use crate::models::message::{Frame, Message, MessageContent, Speaker};
use crate::models::tool::ToolDefinition;
use crate::naming::to_snake_case;

/// Map a speaker onto its OpenAI chat role
pub fn role_for(speaker: Speaker) -> &'static str {
    match speaker {
        Speaker::Human => "user",
        Speaker::Ai => "assistant",
        Speaker::System => "system",
        Speaker::Tool => "tool",
    }
}

/// Convert a frame into keyword parameters for the OpenAI chat completion API
///
/// The result always holds `messages`; `tools` and `response_format` appear when
/// the markup declared them, and runtime parameters are merged in at the top
/// level with snake_case keys.
pub fn to_openai_chat(frame: &Frame) -> PomlResult<Value> {
    let mut result = Map::new();
    result.insert(
        "messages".to_string(),
        Value::Array(messages_to_openai_spec(&frame.messages)?),
    );

    if let Some(tools) = frame.tools.as_ref().filter(|tools| !tools.is_empty()) {
        result.insert(
            "tools".to_string(),
            Value::Array(tools_to_openai_spec(tools)),
        );
    }

    if let Some(schema) = frame.output_schema.as_ref().filter(|schema| !is_empty_object(schema)) {
        result.insert(
            "response_format".to_string(),
            json!({
                "type": "json_schema",
                "json_schema": {
                    "name": "schema",
                    "schema": schema,
                    "strict": true,
                }
            }),
        );
    }

    if let Some(runtime) = &frame.runtime {
        for (key, value) in runtime {
            result.insert(to_snake_case(key), value.clone());
        }
    }

    Ok(Value::Object(result))
}

/// Convert messages to OpenAI's API message specification
///
/// Each tool response becomes its own `tool` message. A message left with
/// neither content nor tool calls is dropped.
pub fn messages_to_openai_spec(messages: &[Message]) -> PomlResult<Vec<Value>> {
    let mut messages_spec = Vec::new();

    for message in messages {
        let role = role_for(message.speaker);

        if message.speaker == Speaker::Tool {
            messages_spec.extend(tool_message_to_openai(message)?);
            continue;
        }

        let parts = match &message.content {
            MessageContent::Text(text) => {
                messages_spec.push(json!({"role": role, "content": text}));
                continue;
            }
            MessageContent::Parts(parts) => parts,
        };

        let mut content = Vec::new();
        let mut tool_calls = Vec::new();

        for part in parts {
            match part {
                ContentPart::Text(text) => content.push(json!({"type": "text", "text": text})),
                ContentPart::Multimedia(media) => content.push(convert_image(media)),
                ContentPart::ToolRequest(request) => {
                    if message.speaker != Speaker::Ai {
                        return Err(PomlError::MisplacedToolCall(format!(
                            "tool request found in non-assistant message with speaker: {}",
                            message.speaker
                        )));
                    }
                    let arguments = match &request.arguments {
                        Value::String(text) => text.clone(),
                        other => to_arguments_text(other)?,
                    };
                    tool_calls.push(json!({
                        "id": request.id,
                        "type": "function",
                        "function": {
                            "name": request.name,
                            "arguments": arguments,
                        }
                    }));
                }
                ContentPart::ToolResponse(_) => {
                    return Err(PomlError::MisplacedToolCall(format!(
                        "tool response found in {} message; should be in tool message",
                        message.speaker
                    )));
                }
            }
        }

        let mut converted = Map::new();
        converted.insert("role".to_string(), json!(role));
        if let Some(content) = collapse_parts(content) {
            converted.insert("content".to_string(), content);
        }
        if !tool_calls.is_empty() {
            converted.insert("tool_calls".to_string(), Value::Array(tool_calls));
        }

        if converted.contains_key("content") || converted.contains_key("tool_calls") {
            messages_spec.push(Value::Object(converted));
        }
    }

    Ok(messages_spec)
}

fn tool_message_to_openai(message: &Message) -> PomlResult<Vec<Value>> {
    match &message.content {
        MessageContent::Text(text) => Ok(vec![json!({"role": "tool", "content": text})]),
        MessageContent::Parts(parts) => parts
            .iter()
            .map(|part| match part {
                ContentPart::ToolResponse(response) => Ok(json!({
                    "role": "tool",
                    "content": response.content.to_plain_text(),
                    "tool_call_id": response.id,
                })),
                ContentPart::ToolRequest(request) => Err(PomlError::MisplacedToolCall(format!(
                    "tool request `{}` found in tool message",
                    request.id
                ))),
                _ => Err(PomlError::MalformedMessage(
                    "tool message may only contain tool responses".to_string(),
                )),
            })
            .collect(),
    }
}

/// Convert multimedia content into an inline data-url image part
pub fn convert_image(media: &Multimedia) -> Value {
    json!({
        "type": "image_url",
        "image_url": {
            "url": format!("data:{};base64,{}", media.mime_type, media.base64)
        }
    })
}

/// Convert tool definitions to OpenAI's API tool specification
///
/// A missing name or description becomes `""` and missing parameters `{}`.
pub fn tools_to_openai_spec(tools: &[ToolDefinition]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.field_or("name", json!("")),
                    "description": tool.field_or("description", json!("")),
                    "parameters": tool.field_or("parameters", json!({})),
                }
            })
        })
        .collect()
}

fn is_empty_object(value: &Value) -> bool {
    value.as_object().is_some_and(Map::is_empty)
}
