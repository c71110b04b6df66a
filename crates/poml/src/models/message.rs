use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use strum_macros::{AsRefStr, Display, EnumString};

use super::content::{describe, ContentPart, Multimedia, ToolResponseContent};
use super::tool::ToolDefinition;
use crate::errors::{PomlError, PomlResult};

/// Whose turn a message represents.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Speaker {
    Human,
    Ai,
    System,
    Tool,
}

impl Speaker {
    pub fn parse(name: &str) -> PomlResult<Self> {
        Speaker::from_str(name).map_err(|_| PomlError::UnknownSpeaker(name.to_string()))
    }
}

/// Content of a message: a bare string, or an ordered list of parts.
///
/// The scalar form is shorthand for a single text part. Converters collapse a
/// part list back to a bare string only when it holds exactly one text part
/// and nothing else.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    pub fn from_wire(value: &Value) -> PomlResult<Self> {
        match value {
            Value::String(text) => Ok(MessageContent::Text(text.clone())),
            Value::Array(items) => items
                .iter()
                .map(ContentPart::from_wire)
                .collect::<PomlResult<Vec<_>>>()
                .map(MessageContent::Parts),
            other => Err(PomlError::MalformedMessage(format!(
                "message content must be a string or a list, got {}",
                describe(other)
            ))),
        }
    }

    pub fn to_wire(&self) -> Value {
        match self {
            MessageContent::Text(text) => Value::String(text.clone()),
            MessageContent::Parts(parts) => {
                Value::Array(parts.iter().map(ContentPart::to_wire).collect())
            }
        }
    }

    /// Iterate the content as parts; scalar text yields a single text part.
    pub fn parts(&self) -> Vec<ContentPart> {
        match self {
            MessageContent::Text(text) => vec![ContentPart::text(text.clone())],
            MessageContent::Parts(parts) => parts.clone(),
        }
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::Text(text.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Text(text)
    }
}

impl From<Vec<ContentPart>> for MessageContent {
    fn from(parts: Vec<ContentPart>) -> Self {
        MessageContent::Parts(parts)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// One speaker turn of a rendered prompt
pub struct Message {
    pub speaker: Speaker,
    pub content: MessageContent,
}

impl Message {
    /// Create a message, checking that tool parts sit with the right speaker
    pub fn new<C: Into<MessageContent>>(speaker: Speaker, content: C) -> PomlResult<Self> {
        let message = Message {
            speaker,
            content: content.into(),
        };
        message.validate()?;
        Ok(message)
    }

    /// Create an empty human message
    pub fn human() -> Self {
        Self::empty(Speaker::Human)
    }

    /// Create an empty ai message
    pub fn ai() -> Self {
        Self::empty(Speaker::Ai)
    }

    /// Create an empty system message
    pub fn system() -> Self {
        Self::empty(Speaker::System)
    }

    /// Create an empty tool message
    pub fn tool() -> Self {
        Self::empty(Speaker::Tool)
    }

    fn empty(speaker: Speaker) -> Self {
        Message {
            speaker,
            content: MessageContent::Parts(Vec::new()),
        }
    }

    /// Add any ContentPart to the message
    pub fn with_content(mut self, part: ContentPart) -> Self {
        self.content = match self.content {
            MessageContent::Text(text) => MessageContent::Parts(vec![ContentPart::Text(text), part]),
            MessageContent::Parts(mut parts) => {
                parts.push(part);
                MessageContent::Parts(parts)
            }
        };
        self
    }

    /// Add a text part to the message
    pub fn with_text<S: Into<String>>(self, text: S) -> Self {
        self.with_content(ContentPart::text(text))
    }

    /// Add a multimedia part to the message
    pub fn with_media(self, media: Multimedia) -> Self {
        self.with_content(ContentPart::Multimedia(media))
    }

    /// Add a tool request to the message
    pub fn with_tool_request<I: Into<String>, N: Into<String>>(
        self,
        id: I,
        name: N,
        arguments: Value,
    ) -> Self {
        self.with_content(ContentPart::tool_request(id, name, arguments))
    }

    /// Add a tool response to the message
    pub fn with_tool_response<I: Into<String>, N: Into<String>>(
        self,
        id: I,
        name: N,
        content: ToolResponseContent,
    ) -> Self {
        self.with_content(ContentPart::tool_response(id, name, content))
    }

    /// Replace the content with a bare string
    pub fn with_plain<S: Into<String>>(mut self, text: S) -> Self {
        self.content = MessageContent::Text(text.into());
        self
    }

    pub fn validate(&self) -> PomlResult<()> {
        let parts = match &self.content {
            // A bare string is fine for every speaker, tool included.
            MessageContent::Text(_) => return Ok(()),
            MessageContent::Parts(parts) => parts,
        };

        for part in parts {
            match part {
                ContentPart::ToolRequest(request) if self.speaker != Speaker::Ai => {
                    return Err(PomlError::MisplacedToolCall(format!(
                        "tool request `{}` found in {} message; tool requests belong in ai messages",
                        request.id, self.speaker
                    )));
                }
                ContentPart::ToolResponse(response) if self.speaker != Speaker::Tool => {
                    return Err(PomlError::MisplacedToolCall(format!(
                        "tool response `{}` found in {} message; tool responses belong in tool messages",
                        response.id, self.speaker
                    )));
                }
                ContentPart::Text(_) | ContentPart::Multimedia(_)
                    if self.speaker == Speaker::Tool =>
                {
                    return Err(PomlError::MalformedMessage(
                        "tool message may only contain tool responses".to_string(),
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn from_wire(value: &Value) -> PomlResult<Self> {
        let object = value.as_object().ok_or_else(|| {
            PomlError::MalformedMessage(format!("message must be an object, got {}", describe(value)))
        })?;
        let speaker = match object.get("speaker") {
            Some(Value::String(name)) => Speaker::parse(name)?,
            _ => {
                return Err(PomlError::MalformedMessage(
                    "message is missing string field `speaker`".to_string(),
                ))
            }
        };
        let content = object.get("content").ok_or_else(|| {
            PomlError::MalformedMessage("message is missing field `content`".to_string())
        })?;
        Message::new(speaker, MessageContent::from_wire(content)?)
    }
}

/// Everything a render produced: messages plus optional output schema, tool
/// definitions and runtime parameters. Serializes to the `dict` format.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Frame {
    pub messages: Vec<Message>,
    #[serde(rename = "schema", skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<Map<String, Value>>,
}

impl Frame {
    pub fn new(messages: Vec<Message>) -> PomlResult<Self> {
        messages.iter().try_for_each(Message::validate)?;
        Ok(Frame {
            messages,
            ..Default::default()
        })
    }

    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_runtime(mut self, runtime: Map<String, Value>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Build a frame from chat-mode renderer output.
    ///
    /// Accepts the full result object as well as the older bare array of
    /// messages.
    pub fn from_value(value: &Value) -> PomlResult<Self> {
        let object = match value {
            Value::Array(_) => {
                return Ok(Frame {
                    messages: decode_messages(value)?,
                    ..Default::default()
                })
            }
            Value::Object(object) if object.contains_key("messages") => object,
            other => {
                return Err(PomlError::MalformedMessage(format!(
                    "renderer output must hold `messages`, got {}",
                    describe(other)
                )))
            }
        };

        let messages = decode_messages(&object["messages"])?;

        let output_schema = match object.get("schema") {
            None | Some(Value::Null) => None,
            Some(schema @ Value::Object(_)) => Some(schema.clone()),
            Some(other) => {
                return Err(PomlError::MalformedMessage(format!(
                    "`schema` must be an object, got {}",
                    describe(other)
                )))
            }
        };

        let tools = match object.get("tools") {
            None | Some(Value::Null) => None,
            Some(Value::Array(items)) => Some(
                items
                    .iter()
                    .map(|item| match item {
                        Value::Object(tool) => Ok(ToolDefinition::from_object(tool.clone())),
                        other => Err(PomlError::MalformedMessage(format!(
                            "tool definition must be an object, got {}",
                            describe(other)
                        ))),
                    })
                    .collect::<PomlResult<Vec<_>>>()?,
            ),
            Some(other) => {
                return Err(PomlError::MalformedMessage(format!(
                    "`tools` must be a list, got {}",
                    describe(other)
                )))
            }
        };

        let runtime = match object.get("runtime") {
            None | Some(Value::Null) => None,
            Some(Value::Object(runtime)) => Some(runtime.clone()),
            Some(other) => {
                return Err(PomlError::MalformedMessage(format!(
                    "`runtime` must be an object, got {}",
                    describe(other)
                )))
            }
        };

        Ok(Frame {
            messages,
            output_schema,
            tools,
            runtime,
        })
    }

    /// Build a frame from non-chat renderer output: the whole output is the
    /// content of one human message.
    pub fn from_prompt(value: &Value) -> PomlResult<Self> {
        let message = Message::new(Speaker::Human, MessageContent::from_wire(value)?)?;
        Ok(Frame {
            messages: vec![message],
            ..Default::default()
        })
    }

    /// Build a frame from renderer output rendered with `chat` on or off.
    pub fn from_output(value: &Value, chat: bool) -> PomlResult<Self> {
        if chat {
            Self::from_value(value)
        } else {
            Self::from_prompt(value)
        }
    }

    pub fn to_value(&self) -> PomlResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

// Serde decoding validates exactly like `from_wire` and `from_value`.
impl<'de> Deserialize<'de> for MessageContent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        MessageContent::from_wire(&value).map_err(serde::de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Message::from_wire(&value).map_err(serde::de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for Frame {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Frame::from_value(&value).map_err(serde::de::Error::custom)
    }
}

fn decode_messages(value: &Value) -> PomlResult<Vec<Message>> {
    match value {
        Value::Array(items) => items.iter().map(Message::from_wire).collect(),
        other => Err(PomlError::MalformedMessage(format!(
            "`messages` must be a list, got {}",
            describe(other)
        ))),
    }
}
