//! Programmatic construction of POML markup.
//!
//! A [`Prompt`] builds a tree of tags and text, then hands the serialized
//! markup to [`Poml::render`]. Elements are attached to their parent as soon as
//! they are opened, so a partial tree can still be dumped for inspection.
use base64::{engine::general_purpose::STANDARD, Engine as _};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde_json::{Number, Value};
use std::fmt::Display;
use std::io;
use tracing::warn;

use crate::api::{Markup, Poml, RenderRequest};
use crate::errors::{PomlError, PomlResult};
use crate::formats::json::to_arguments_text;
use crate::formats::Rendered;

/// An attribute value before it is written into markup
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// Written as `true` / `false`
    Bool(bool),
    /// Written base64 encoded; a `buffer` attribute is renamed to `base64`
    Bytes(Vec<u8>),
    Number(Number),
    Text(String),
    /// Anything else, written as JSON text
    Json(Value),
    /// Left out of the element
    Absent,
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Text(value)
    }
}

macro_rules! integer_attr {
    ($($ty:ty),*) => {
        $(impl From<$ty> for AttrValue {
            fn from(value: $ty) -> Self {
                AttrValue::Number(Number::from(value))
            }
        })*
    };
}

integer_attr!(i32, i64, u32, u64, usize);

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        match Number::from_f64(value) {
            Some(number) => AttrValue::Number(number),
            None => AttrValue::Text(value.to_string()),
        }
    }
}

impl From<Vec<u8>> for AttrValue {
    fn from(value: Vec<u8>) -> Self {
        AttrValue::Bytes(value)
    }
}

impl From<&[u8]> for AttrValue {
    fn from(value: &[u8]) -> Self {
        AttrValue::Bytes(value.to_vec())
    }
}

impl From<Value> for AttrValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => AttrValue::Absent,
            Value::Bool(flag) => AttrValue::Bool(flag),
            Value::Number(number) => AttrValue::Number(number),
            Value::String(text) => AttrValue::Text(text),
            other => AttrValue::Json(other),
        }
    }
}

impl<T: Into<AttrValue>> From<Option<T>> for AttrValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(AttrValue::Absent, Into::into)
    }
}

/// Ordered tag attributes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attrs(Vec<(String, AttrValue)>);

impl Attrs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<AttrValue>,
    {
        self.0.push((key.into(), value.into()));
        self
    }

    /// Attribute strings in insertion order. A later key replaces an earlier one.
    fn prepare(&self) -> PomlResult<Vec<(String, String)>> {
        let mut prepared: Vec<(String, String)> = Vec::new();
        for (key, value) in &self.0 {
            let (key, text) = match value {
                AttrValue::Absent => continue,
                AttrValue::Bool(flag) => (key.as_str(), flag.to_string()),
                AttrValue::Bytes(bytes) if key == "buffer" => ("base64", STANDARD.encode(bytes)),
                AttrValue::Bytes(bytes) => (key.as_str(), STANDARD.encode(bytes)),
                AttrValue::Number(number) => (key.as_str(), number.to_string()),
                AttrValue::Text(text) => (key.as_str(), text.clone()),
                AttrValue::Json(value) => (key.as_str(), to_arguments_text(value)?),
            };
            match prepared.iter_mut().find(|(existing, _)| existing == key) {
                Some(slot) => slot.1 = text,
                None => prepared.push((key.to_string(), text)),
            }
        }
        Ok(prepared)
    }
}

#[derive(Debug, Clone)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    text: Option<String>,
    children: Vec<usize>,
    tail: Option<String>,
}

/// Builder for POML markup
#[derive(Debug, Clone, Default)]
pub struct Prompt {
    nodes: Vec<Element>,
    roots: Vec<usize>,
    open: Vec<usize>,
}

impl Prompt {
    pub fn new() -> Self {
        Self::default()
    }

    fn attach<N: Into<String>>(&mut self, name: N, attrs: &Attrs) -> PomlResult<usize> {
        let index = self.nodes.len();
        self.nodes.push(Element {
            name: name.into(),
            attributes: attrs.prepare()?,
            text: None,
            children: Vec::new(),
            tail: None,
        });
        match self.open.last() {
            Some(&parent) => self.nodes[parent].children.push(index),
            None => self.roots.push(index),
        }
        Ok(index)
    }

    /// Add a tag with no content inside the innermost open tag.
    pub fn tag<N: Into<String>>(&mut self, name: N, attrs: Attrs) -> PomlResult<&mut Self> {
        self.attach(name, &attrs)?;
        Ok(self)
    }

    /// Add a tag and make it the target of following tags and text.
    pub fn open_tag<N: Into<String>>(&mut self, name: N, attrs: Attrs) -> PomlResult<&mut Self> {
        let index = self.attach(name, &attrs)?;
        self.open.push(index);
        Ok(self)
    }

    /// Close the innermost open tag.
    pub fn close_tag(&mut self) -> PomlResult<&mut Self> {
        match self.open.pop() {
            Some(_) => Ok(self),
            None => Err(PomlError::InvalidPrompt("No tag is open".to_string())),
        }
    }

    /// Open a tag, fill it with `body`, then close it.
    ///
    /// `body` must leave the tag as the innermost open one.
    pub fn with_tag<N, F>(&mut self, name: N, attrs: Attrs, body: F) -> PomlResult<&mut Self>
    where
        N: Into<String>,
        F: FnOnce(&mut Prompt) -> PomlResult<()>,
    {
        self.open_tag(name, attrs)?;
        let depth = self.open.len();
        let index = self.open[depth - 1];
        body(self)?;
        if self.open.len() != depth || self.open.last() != Some(&index) {
            return Err(PomlError::InvalidPrompt(format!(
                "Mismatched tags: expected to close '{}', open tags are {:?}",
                self.nodes[index].name,
                self.open_tags()
            )));
        }
        self.close_tag()
    }

    /// Append text to the innermost open tag, after its last child if it has any.
    pub fn text<S: AsRef<str>>(&mut self, content: S) -> PomlResult<&mut Self> {
        let Some(&current) = self.open.last() else {
            return Err(PomlError::InvalidPrompt(
                "Cannot add text: no tag is currently open".to_string(),
            ));
        };
        let last_child = self.nodes[current].children.last().copied();
        let slot = match last_child {
            Some(child) => &mut self.nodes[child].tail,
            None => &mut self.nodes[current].text,
        };
        slot.get_or_insert_with(String::new).push_str(content.as_ref());
        Ok(self)
    }

    /// Names of the tags still open, outermost first
    pub fn open_tags(&self) -> Vec<&str> {
        self.open
            .iter()
            .map(|&index| self.nodes[index].name.as_str())
            .collect()
    }

    /// Compact markup, root elements written back to back.
    pub fn to_xml(&self) -> PomlResult<String> {
        self.serialize(false)
    }

    /// Indented markup (two spaces), one root element per line group.
    pub fn dump_xml(&self) -> PomlResult<String> {
        self.serialize(true)
    }

    /// A render request for the finished markup.
    pub fn to_request(&self) -> PomlResult<RenderRequest> {
        if !self.open.is_empty() {
            return Err(PomlError::InvalidPrompt(format!(
                "Cannot render: Open tags remaining: {:?}",
                self.open_tags()
            )));
        }
        Ok(RenderRequest::new(Markup::Source(self.to_xml()?)))
    }

    pub fn render(&self, poml: &Poml, chat: bool) -> PomlResult<Rendered> {
        poml.render(&self.to_request()?.with_chat(chat))
    }

    fn serialize(&self, pretty: bool) -> PomlResult<String> {
        if !self.open.is_empty() {
            warn!(open_tags = ?self.open_tags(), "serializing prompt with open tags");
        }
        let mut parts = Vec::with_capacity(self.roots.len());
        for &root in &self.roots {
            let mut writer = if pretty {
                Writer::new_with_indent(Vec::new(), b' ', 2)
            } else {
                Writer::new(Vec::new())
            };
            self.write_element(&mut writer, root)?;
            parts.push(String::from_utf8_lossy(&writer.into_inner()).into_owned());
        }
        Ok(parts.join(if pretty { "\n" } else { "" }))
    }

    fn write_element<W: io::Write>(&self, writer: &mut Writer<W>, index: usize) -> PomlResult<()> {
        let element = &self.nodes[index];
        let mut start = BytesStart::new(element.name.as_str());
        for (key, value) in &element.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if element.text.is_none() && element.children.is_empty() {
            writer.write_event(Event::Empty(start)).map_err(xml_error)?;
        } else {
            writer.write_event(Event::Start(start)).map_err(xml_error)?;
            if let Some(text) = &element.text {
                writer
                    .write_event(Event::Text(BytesText::new(text)))
                    .map_err(xml_error)?;
            }
            for &child in &element.children {
                self.write_element(writer, child)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new(element.name.as_str())))
                .map_err(xml_error)?;
        }

        if let Some(tail) = &element.tail {
            writer
                .write_event(Event::Text(BytesText::new(tail)))
                .map_err(xml_error)?;
        }
        Ok(())
    }
}

fn xml_error<E: Display>(err: E) -> PomlError {
    PomlError::InvalidPrompt(format!("failed to write markup: {}", err))
}
