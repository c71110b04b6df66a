use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::errors::{PomlError, PomlResult};

/// Wire `type` marking a tool-call request part.
pub const TOOL_REQUEST_TYPE: &str = "application/vnd.poml.toolrequest";
/// Wire `type` marking a tool-call response part.
pub const TOOL_RESPONSE_TYPE: &str = "application/vnd.poml.toolresponse";

/// An image or other media attachment, carried inline as base64.
#[derive(Debug, Clone, PartialEq)]
pub struct Multimedia {
    pub mime_type: String,
    pub base64: String,
    pub alt: Option<String>,
}

impl Multimedia {
    pub fn new<M: Into<String>, B: Into<String>>(mime_type: M, base64: B) -> Self {
        Self {
            mime_type: mime_type.into(),
            base64: base64.into(),
            alt: None,
        }
    }

    pub fn with_alt<S: Into<String>>(mut self, alt: S) -> Self {
        self.alt = Some(alt.into());
        self
    }

    /// Placeholder used wherever media has to be flattened into plain text.
    pub fn placeholder(&self) -> String {
        match &self.alt {
            Some(alt) => format!("[{}: {}]", self.mime_type, alt),
            None => format!("[{}]", self.mime_type),
        }
    }

    fn from_wire(object: &Map<String, Value>) -> PomlResult<Self> {
        let alt = match object.get("alt") {
            None | Some(Value::Null) => None,
            Some(Value::String(alt)) => Some(alt.clone()),
            Some(_) => {
                return Err(PomlError::UnrecognizedContentPart(
                    "multimedia `alt` must be a string".to_string(),
                ))
            }
        };
        Ok(Self {
            mime_type: required_str(object, "type", "multimedia")?,
            base64: required_str(object, "base64", "multimedia")?,
            alt,
        })
    }

    fn to_wire(&self) -> Value {
        let mut wire = json!({
            "type": self.mime_type,
            "base64": self.base64,
        });
        if let Some(alt) = &self.alt {
            wire["alt"] = json!(alt);
        }
        wire
    }
}

/// A request from the assistant to invoke a tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRequest {
    pub id: String,
    pub name: String,
    /// The parameters for the call, as produced by the markup.
    pub arguments: Value,
}

/// One element of a rich tool response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePart {
    Text(String),
    Multimedia(Multimedia),
}

/// The body of a tool response: a plain string or an ordered list of parts.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResponseContent {
    Text(String),
    Parts(Vec<ResponsePart>),
}

impl ToolResponseContent {
    /// Flatten to plain text. Media becomes a bracketed placeholder and parts
    /// are separated by a blank line.
    pub fn to_plain_text(&self) -> String {
        match self {
            ToolResponseContent::Text(text) => text.clone(),
            ToolResponseContent::Parts(parts) => parts
                .iter()
                .map(|part| match part {
                    ResponsePart::Text(text) => text.clone(),
                    ResponsePart::Multimedia(media) => media.placeholder(),
                })
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }

    fn from_wire(value: &Value) -> PomlResult<Self> {
        match value {
            Value::String(text) => Ok(ToolResponseContent::Text(text.clone())),
            Value::Array(items) => items
                .iter()
                .map(|item| match ContentPart::from_wire(item)? {
                    ContentPart::Text(text) => Ok(ResponsePart::Text(text)),
                    ContentPart::Multimedia(media) => Ok(ResponsePart::Multimedia(media)),
                    _ => Err(PomlError::UnrecognizedContentPart(
                        "tool response content may only hold text and multimedia".to_string(),
                    )),
                })
                .collect::<PomlResult<Vec<_>>>()
                .map(ToolResponseContent::Parts),
            other => Err(PomlError::UnrecognizedContentPart(format!(
                "tool response content must be a string or a list, got {}",
                describe(other)
            ))),
        }
    }

    fn to_wire(&self) -> Value {
        match self {
            ToolResponseContent::Text(text) => json!(text),
            ToolResponseContent::Parts(parts) => Value::Array(
                parts
                    .iter()
                    .map(|part| match part {
                        ResponsePart::Text(text) => json!(text),
                        ResponsePart::Multimedia(media) => media.to_wire(),
                    })
                    .collect(),
            ),
        }
    }
}

/// The output of a tool call, echoed back to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResponse {
    /// Identifier of the request this answers
    pub id: String,
    pub name: String,
    pub content: ToolResponseContent,
}

/// A single piece of message content, in document order.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text(String),
    Multimedia(Multimedia),
    ToolRequest(ToolRequest),
    ToolResponse(ToolResponse),
}

impl ContentPart {
    pub fn text<S: Into<String>>(text: S) -> Self {
        ContentPart::Text(text.into())
    }

    pub fn image<M: Into<String>, B: Into<String>>(mime_type: M, base64: B) -> Self {
        ContentPart::Multimedia(Multimedia::new(mime_type, base64))
    }

    pub fn tool_request<I: Into<String>, N: Into<String>>(id: I, name: N, arguments: Value) -> Self {
        ContentPart::ToolRequest(ToolRequest {
            id: id.into(),
            name: name.into(),
            arguments,
        })
    }

    pub fn tool_response<I: Into<String>, N: Into<String>>(
        id: I,
        name: N,
        content: ToolResponseContent,
    ) -> Self {
        ContentPart::ToolResponse(ToolResponse {
            id: id.into(),
            name: name.into(),
            content,
        })
    }

    /// Get the text if this is a Text part
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_tool_request(&self) -> Option<&ToolRequest> {
        match self {
            ContentPart::ToolRequest(request) => Some(request),
            _ => None,
        }
    }

    pub fn as_tool_response(&self) -> Option<&ToolResponse> {
        match self {
            ContentPart::ToolResponse(response) => Some(response),
            _ => None,
        }
    }

    /// Decode one element of a renderer content array.
    pub fn from_wire(value: &Value) -> PomlResult<Self> {
        let object = match value {
            Value::String(text) => return Ok(ContentPart::Text(text.clone())),
            Value::Object(object) => object,
            other => {
                return Err(PomlError::UnrecognizedContentPart(describe(other)));
            }
        };

        match object.get("type").and_then(Value::as_str) {
            Some(TOOL_REQUEST_TYPE) => {
                let arguments = object.get("content").cloned().ok_or_else(|| {
                    PomlError::UnrecognizedContentPart(
                        "tool request is missing field `content`".to_string(),
                    )
                })?;
                Ok(ContentPart::ToolRequest(ToolRequest {
                    id: required_str(object, "id", "tool request")?,
                    name: required_str(object, "name", "tool request")?,
                    arguments,
                }))
            }
            Some(TOOL_RESPONSE_TYPE) => {
                let content = object.get("content").ok_or_else(|| {
                    PomlError::UnrecognizedContentPart(
                        "tool response is missing field `content`".to_string(),
                    )
                })?;
                Ok(ContentPart::ToolResponse(ToolResponse {
                    id: required_str(object, "id", "tool response")?,
                    name: required_str(object, "name", "tool response")?,
                    content: ToolResponseContent::from_wire(content)?,
                }))
            }
            Some(_) if object.get("base64").is_some_and(Value::is_string) => {
                Multimedia::from_wire(object).map(ContentPart::Multimedia)
            }
            _ => Err(PomlError::UnrecognizedContentPart(describe(value))),
        }
    }

    /// Encode back into the renderer's wire shape.
    pub fn to_wire(&self) -> Value {
        match self {
            ContentPart::Text(text) => json!(text),
            ContentPart::Multimedia(media) => media.to_wire(),
            ContentPart::ToolRequest(request) => json!({
                "type": TOOL_REQUEST_TYPE,
                "id": request.id,
                "name": request.name,
                "content": request.arguments,
            }),
            ContentPart::ToolResponse(response) => json!({
                "type": TOOL_RESPONSE_TYPE,
                "id": response.id,
                "name": response.name,
                "content": response.content.to_wire(),
            }),
        }
    }
}

impl From<Multimedia> for ContentPart {
    fn from(media: Multimedia) -> Self {
        ContentPart::Multimedia(media)
    }
}

impl Serialize for ContentPart {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ContentPart {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        ContentPart::from_wire(&value).map_err(serde::de::Error::custom)
    }
}

fn required_str(object: &Map<String, Value>, key: &str, what: &str) -> PomlResult<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            PomlError::UnrecognizedContentPart(format!("{} is missing string field `{}`", what, key))
        })
}

/// Short description of a JSON value for error messages; never echoes
/// payloads, which may be large base64 blobs.
pub(crate) fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "a boolean".to_string(),
        Value::Number(_) => "a number".to_string(),
        Value::String(_) => "a string".to_string(),
        Value::Array(_) => "a list".to_string(),
        Value::Object(object) => format!(
            "an object with keys [{}]",
            object.keys().cloned().collect::<Vec<_>>().join(", ")
        ),
    }
}
