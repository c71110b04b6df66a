use serde_json::{json, Map, Value};

use super::collapse_parts;
use crate::errors::PomlResult;
use crate::models::content::ContentPart;
use crate::models::message::{Frame, Message, MessageContent};

/// Convert a frame into a LangChain message history
///
/// Messages are converted; `schema`, `tools` and `runtime` are carried over
/// unchanged under their wire keys.
pub fn to_langchain(frame: &Frame) -> PomlResult<Value> {
    let mut result = Map::new();
    result.insert(
        "messages".to_string(),
        Value::Array(messages_to_langchain(&frame.messages)?),
    );
    if let Some(schema) = &frame.output_schema {
        result.insert("schema".to_string(), schema.clone());
    }
    if let Some(tools) = &frame.tools {
        result.insert("tools".to_string(), serde_json::to_value(tools)?);
    }
    if let Some(runtime) = &frame.runtime {
        result.insert("runtime".to_string(), Value::Object(runtime.clone()));
    }
    Ok(Value::Object(result))
}

/// Convert messages to LangChain's `{type, data}` message dicts
///
/// Tool responses are emitted as standalone `tool` entries carrying the call id
/// and tool name; tool requests keep their arguments as JSON values.
pub fn messages_to_langchain(messages: &[Message]) -> PomlResult<Vec<Value>> {
    let mut langchain_messages = Vec::new();

    for message in messages {
        message.validate()?;
        let kind = message.speaker.as_ref();

        let parts = match &message.content {
            MessageContent::Text(text) => {
                langchain_messages.push(json!({"type": kind, "data": {"content": text}}));
                continue;
            }
            MessageContent::Parts(parts) => parts,
        };

        let mut content = Vec::new();
        let mut tool_calls = Vec::new();

        for part in parts {
            match part {
                ContentPart::Text(text) => content.push(json!({"type": "text", "text": text})),
                ContentPart::Multimedia(media) => content.push(json!({
                    "type": "image",
                    "source_type": "base64",
                    "data": media.base64,
                    "mime_type": media.mime_type,
                })),
                ContentPart::ToolRequest(request) => tool_calls.push(json!({
                    "id": request.id,
                    "name": request.name,
                    "args": request.arguments,
                })),
                ContentPart::ToolResponse(response) => langchain_messages.push(json!({
                    "type": "tool",
                    "data": {
                        "content": response.content.to_plain_text(),
                        "tool_call_id": response.id,
                        "name": response.name,
                    }
                })),
            }
        }

        let mut data = Map::new();
        if let Some(content) = collapse_parts(content) {
            data.insert("content".to_string(), content);
        }
        if !tool_calls.is_empty() {
            data.insert("tool_calls".to_string(), Value::Array(tool_calls));
        }
        if !data.is_empty() {
            langchain_messages.push(json!({"type": kind, "data": data}));
        }
    }

    Ok(langchain_messages)
}
