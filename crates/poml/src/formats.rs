//! Projections of a rendered [`Frame`] into the shapes callers consume.
//!
//! Every converter is a pure function of its input: nothing here performs
//! I/O or keeps state between calls.
pub mod json;
pub mod langchain;
pub mod openai;

use serde_json::{json, Value};
use std::str::FromStr;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

use crate::errors::{PomlError, PomlResult};
use crate::models::message::{Frame, Message};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, EnumIter, AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum OutputFormat {
    /// The renderer output string, untouched
    Raw,
    /// Just the messages array, in the renderer's shape
    #[default]
    MessageDict,
    /// Messages plus schema, tools and runtime, in the renderer's shape
    Dict,
    /// Keyword parameters for an OpenAI chat completion call
    OpenaiChat,
    /// LangChain message history plus metadata
    Langchain,
    /// The validated [`Frame`] itself
    Frame,
}

impl OutputFormat {
    pub fn parse(name: &str) -> PomlResult<Self> {
        OutputFormat::from_str(name).map_err(|_| PomlError::UnknownFormat(name.to_string()))
    }
}

/// The result of a conversion
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    Raw(String),
    Json(Value),
    Frame(Frame),
}

impl Rendered {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Rendered::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_frame(&self) -> Option<&Frame> {
        match self {
            Rendered::Frame(frame) => Some(frame),
            _ => None,
        }
    }

    /// Text form: raw output as-is, everything else as pretty JSON.
    pub fn to_text(&self) -> PomlResult<String> {
        match self {
            Rendered::Raw(text) => Ok(text.clone()),
            Rendered::Json(value) => Ok(serde_json::to_string_pretty(value)?),
            Rendered::Frame(frame) => Ok(serde_json::to_string_pretty(frame)?),
        }
    }
}

/// Convert renderer output into `format`.
///
/// `raw` returns the output untouched. Every other format goes through
/// [`convert_value`].
pub fn convert(output: &str, chat: bool, format: OutputFormat) -> PomlResult<Rendered> {
    if format == OutputFormat::Raw {
        return Ok(Rendered::Raw(output.to_string()));
    }
    let value: Value = serde_json::from_str(output)?;
    convert_value(&value, chat, format)
}

/// Convert parsed renderer output into `format`.
///
/// A validated [`Frame`] is always built first, so structural errors surface
/// before any conversion. With `chat` off the output is one human message's
/// content: `message_dict` returns it as rendered, `dict` wraps it as
/// `{"messages": output}`, and the other formats see a one-message frame.
pub fn convert_value(value: &Value, chat: bool, format: OutputFormat) -> PomlResult<Rendered> {
    let frame = Frame::from_output(value, chat)?;
    if !chat {
        match format {
            OutputFormat::MessageDict => return Ok(Rendered::Json(value.clone())),
            OutputFormat::Dict => return Ok(Rendered::Json(json!({ "messages": value }))),
            _ => {}
        }
    }
    convert_frame(frame, format)
}

/// Project an already built frame into `format`. For `raw` the frame is
/// written out in the renderer's own JSON shape.
pub fn convert_frame(frame: Frame, format: OutputFormat) -> PomlResult<Rendered> {
    Ok(match format {
        OutputFormat::Raw => Rendered::Raw(serde_json::to_string(&frame)?),
        OutputFormat::MessageDict => Rendered::Json(to_message_list(&frame.messages)?),
        OutputFormat::Dict => Rendered::Json(to_dict(&frame)?),
        OutputFormat::OpenaiChat => Rendered::Json(openai::to_openai_chat(&frame)?),
        OutputFormat::Langchain => Rendered::Json(langchain::to_langchain(&frame)?),
        OutputFormat::Frame => Rendered::Frame(frame),
    })
}

/// The messages array, each as `{speaker, content}`
pub fn to_message_list(messages: &[Message]) -> PomlResult<Value> {
    Ok(serde_json::to_value(messages)?)
}

/// The full frame: `messages`, plus `schema`, `tools` and `runtime` when present
pub fn to_dict(frame: &Frame) -> PomlResult<Value> {
    frame.to_value()
}

/// Collapse converted content parts: none at all is `None`, a lone text part
/// becomes its bare string, anything else stays a list.
pub(crate) fn collapse_parts(mut parts: Vec<Value>) -> Option<Value> {
    match parts.len() {
        0 => None,
        1 if parts[0]["type"] == "text" => parts.pop().map(|mut part| part["text"].take()),
        _ => Some(Value::Array(parts)),
    }
}
