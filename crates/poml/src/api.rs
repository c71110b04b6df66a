//! Rendering markup through the external renderer.
//!
//! [`Poml::render`] stages inline inputs as temporary files, runs the
//! renderer, reads what it wrote and converts it into the requested
//! [`OutputFormat`]. [`Poml::render_traced`] does the same while recording
//! the call on a [`Tracer`].
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, error, warn};

use crate::config::Settings;
use crate::errors::{PomlError, PomlResult};
use crate::formats::json::to_arguments_text;
use crate::formats::{convert_value, OutputFormat, Rendered};
use crate::renderer::{NodeRenderer, Renderer};
use crate::trace::{TraceRecord, Tracer};

lazy_static! {
    static ref PATH_LIKE: Regex = Regex::new(r"^[\w\-./]+$").unwrap();
}

/// The markup to render: inline source or a file on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Markup {
    Source(String),
    File(PathBuf),
}

impl Markup {
    /// Treat `text` as a path when such a file exists, and as markup source
    /// otherwise.
    pub fn resolve(text: &str) -> Self {
        let path = Path::new(text);
        if path.exists() {
            return Markup::File(path.to_path_buf());
        }
        if PATH_LIKE.is_match(text) {
            warn!(
                "The markup '{}' looks like a file path, but it does not exist. Assuming it is a POML string.",
                text
            );
        }
        Markup::Source(text.to_string())
    }

    fn describe(&self) -> String {
        match self {
            Markup::Source(source) => source.clone(),
            Markup::File(path) => path.display().to_string(),
        }
    }
}

impl From<&str> for Markup {
    fn from(text: &str) -> Self {
        Markup::resolve(text)
    }
}

impl From<String> for Markup {
    fn from(text: String) -> Self {
        Markup::resolve(&text)
    }
}

impl From<PathBuf> for Markup {
    fn from(path: PathBuf) -> Self {
        Markup::File(path)
    }
}

impl From<&Path> for Markup {
    fn from(path: &Path) -> Self {
        Markup::File(path.to_path_buf())
    }
}

/// Context or stylesheet data: inline JSON or a JSON file
#[derive(Debug, Clone, PartialEq)]
pub enum InputData {
    Json(Value),
    File(PathBuf),
}

impl From<Value> for InputData {
    fn from(value: Value) -> Self {
        InputData::Json(value)
    }
}

impl From<PathBuf> for InputData {
    fn from(path: PathBuf) -> Self {
        InputData::File(path)
    }
}

impl From<&Path> for InputData {
    fn from(path: &Path) -> Self {
        InputData::File(path.to_path_buf())
    }
}

#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub markup: Markup,
    pub context: Option<InputData>,
    pub stylesheet: Option<InputData>,
    /// Render as a conversation; off renders a single prompt
    pub chat: bool,
    /// Where the renderer writes its output. A temporary file when unset.
    pub output_file: Option<PathBuf>,
    pub format: OutputFormat,
    /// Passed to the renderer after all other arguments
    pub extra_args: Vec<OsString>,
}

impl RenderRequest {
    pub fn new<M: Into<Markup>>(markup: M) -> Self {
        Self {
            markup: markup.into(),
            context: None,
            stylesheet: None,
            chat: true,
            output_file: None,
            format: OutputFormat::default(),
            extra_args: Vec::new(),
        }
    }

    pub fn with_context<I: Into<InputData>>(mut self, context: I) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_stylesheet<I: Into<InputData>>(mut self, stylesheet: I) -> Self {
        self.stylesheet = Some(stylesheet.into());
        self
    }

    pub fn with_chat(mut self, chat: bool) -> Self {
        self.chat = chat;
        self
    }

    pub fn with_output_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.output_file = Some(path.into());
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }
}

pub struct Poml {
    renderer: Box<dyn Renderer>,
}

impl Poml {
    pub fn new(renderer: Box<dyn Renderer>) -> Self {
        Self { renderer }
    }

    /// Use the Node renderer configured through `POML_RENDERER__*`.
    pub fn from_settings(settings: &Settings) -> PomlResult<Self> {
        Ok(Self::new(Box::new(NodeRenderer::from_settings(settings)?)))
    }

    pub fn render(&self, request: &RenderRequest) -> PomlResult<Rendered> {
        self.invoke(request, None).map(|(rendered, _)| rendered)
    }

    /// Render and record the call on `tracer`.
    ///
    /// The record is appended whether or not the render succeeds; its
    /// `result` is only filled in on success.
    pub fn render_traced(
        &self,
        request: &RenderRequest,
        tracer: Option<&Tracer>,
    ) -> PomlResult<Rendered> {
        let Some(tracer) = tracer else {
            return self.render(request);
        };

        let mut record = TraceRecord::default();
        let result = capture_inputs(request, &mut record)
            .and_then(|()| self.invoke(request, Some(tracer)));
        if let Ok((_, trace_result)) = &result {
            record.result = Some(trace_result.clone());
        }
        tracer.push(record);
        result.map(|(rendered, _)| rendered)
    }

    /// Run the renderer and convert its output. Also returns the value kept in
    /// the trace: the parsed output, or the raw string for `raw`.
    fn invoke(
        &self,
        request: &RenderRequest,
        tracer: Option<&Tracer>,
    ) -> PomlResult<(Rendered, Value)> {
        // Staged files are deleted when dropped, so they live until the end of the call.
        let mut staged: Vec<NamedTempFile> = Vec::new();

        let markup_path = match &request.markup {
            Markup::File(path) if !path.exists() => {
                return Err(PomlError::FileNotFound(path.clone()))
            }
            Markup::File(path) => path.clone(),
            Markup::Source(source) => stage(&mut staged, ".poml", source)?,
        };

        let output_path = match &request.output_file {
            Some(path) => path.clone(),
            None => stage(&mut staged, ".json", "")?,
        };

        let mut args: Vec<OsString> = vec![
            "-f".into(),
            markup_path.into_os_string(),
            "-o".into(),
            output_path.clone().into_os_string(),
        ];
        if let Some(context) = &request.context {
            args.push("--context-file".into());
            args.push(stage_input(&mut staged, context)?.into_os_string());
        }
        if let Some(stylesheet) = &request.stylesheet {
            args.push("--stylesheet-file".into());
            args.push(stage_input(&mut staged, stylesheet)?.into_os_string());
        }
        args.push("--chat".into());
        args.push(OsString::from(if request.chat { "true" } else { "false" }));
        if let Some(dir) = tracer.and_then(Tracer::trace_dir) {
            args.push("--traceDir".into());
            args.push(dir.as_os_str().to_owned());
        }
        args.extend(request.extra_args.iter().cloned());

        let run = self.renderer.run(&args)?;
        if !run.success() {
            error!(code = run.code, stderr = %run.stderr, "renderer failed");
            return Err(PomlError::RendererFailed { code: run.code });
        }
        if !run.stderr.is_empty() {
            debug!(stderr = %run.stderr, "renderer stderr");
        }

        let output = fs::read_to_string(&output_path)?;
        let (rendered, trace_result) = if request.format == OutputFormat::Raw {
            (Rendered::Raw(output.clone()), Value::String(output))
        } else {
            let value: Value = serde_json::from_str(&output)?;
            (convert_value(&value, request.chat, request.format)?, value)
        };

        if let Some(tracer) = tracer {
            tracer.forward(&request.markup.describe(), &trace_result)?;
        }
        Ok((rendered, trace_result))
    }
}

/// Write `contents` to a temporary file that lives as long as `staged`.
fn stage(staged: &mut Vec<NamedTempFile>, suffix: &str, contents: &str) -> PomlResult<PathBuf> {
    let mut file = tempfile::Builder::new()
        .prefix("poml-")
        .suffix(suffix)
        .tempfile()?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    let path = file.path().to_path_buf();
    staged.push(file);
    Ok(path)
}

fn stage_input(staged: &mut Vec<NamedTempFile>, input: &InputData) -> PomlResult<PathBuf> {
    match input {
        InputData::Json(value) => stage(staged, ".json", &to_arguments_text(value)?),
        InputData::File(path) if path.exists() => Ok(path.clone()),
        InputData::File(path) => Err(PomlError::FileNotFound(path.clone())),
    }
}

fn capture_inputs(request: &RenderRequest, record: &mut TraceRecord) -> PomlResult<()> {
    match &request.markup {
        Markup::Source(source) => record.markup = Some(source.clone()),
        Markup::File(path) => {
            record.markup_path = Some(path.clone());
            if path.exists() {
                record.markup = Some(fs::read_to_string(path)?);
            }
        }
    }
    (record.context, record.context_path) = capture_input(request.context.as_ref())?;
    (record.stylesheet, record.stylesheet_path) = capture_input(request.stylesheet.as_ref())?;
    Ok(())
}

fn capture_input(input: Option<&InputData>) -> PomlResult<(Option<String>, Option<PathBuf>)> {
    match input {
        None => Ok((None, None)),
        Some(InputData::Json(value)) => Ok((Some(to_arguments_text(value)?), None)),
        Some(InputData::File(path)) if path.exists() => {
            Ok((Some(fs::read_to_string(path)?), Some(path.clone())))
        }
        Some(InputData::File(_)) => Ok((None, None)),
    }
}
