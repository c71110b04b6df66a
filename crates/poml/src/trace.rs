//! Call tracing.
//!
//! A [`Tracer`] is owned by the caller and handed to each render by reference.
//! It keeps an in-memory log of [`TraceRecord`]s and, when it has a trace
//! directory, passes that directory to the renderer, which writes one
//! numbered set of files per call (`0001.name.poml`, `0001.name.context.json`, ...).
//! Registered [`TraceSink`]s receive a [`CallRecord`] assembled from the most
//! recent of those files after every successful render.
use chrono::Local;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use crate::config::Settings;
use crate::errors::{PomlError, PomlResult};

lazy_static! {
    static ref TRACE_FILE: Regex = Regex::new(r"^(\d{4}.*?)(?:\.source)?\.poml$").unwrap();
}

/// Inputs and result of one render, as kept in the trace log
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TraceRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markup: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markup_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stylesheet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stylesheet_path: Option<PathBuf>,
    /// Parsed renderer output, or the raw string for the `raw` format. Absent
    /// when the call failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

/// A completed call, as handed to an external logging backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallRecord {
    /// Name of the trace prefix, e.g. `0003.greeting`
    pub name: String,
    /// The markup the renderer saw
    pub prompt: String,
    pub context: Option<Value>,
    pub stylesheet: Option<Value>,
    pub result: Value,
}

/// An external logging backend (weave, mlflow, agentops, ...)
pub trait TraceSink: Send + Sync {
    /// Backend name used in error messages
    fn name(&self) -> &str;

    /// Record one completed call
    fn log_call(&self, call: &CallRecord) -> PomlResult<()>;
}

/// Sink that writes each call to the `tracing` log
#[derive(Debug, Default)]
pub struct LogSink;

impl TraceSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn log_call(&self, call: &CallRecord) -> PomlResult<()> {
        info!(
            name = %call.name,
            prompt_len = call.prompt.len(),
            has_context = call.context.is_some(),
            has_stylesheet = call.stylesheet.is_some(),
            result = %call.result,
            "poml call"
        );
        Ok(())
    }
}

pub struct Tracer {
    trace_dir: Option<PathBuf>,
    log: Mutex<Vec<TraceRecord>>,
    sinks: Vec<Box<dyn TraceSink>>,
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracer {
    /// Trace into memory only; the renderer is not asked to write files.
    pub fn new() -> Self {
        Self {
            trace_dir: None,
            log: Mutex::new(Vec::new()),
            sinks: Vec::new(),
        }
    }

    /// Trace into a fresh run directory under `base`, named by the current
    /// local time as `YYYYMMDDHHMMSSffffff`.
    pub fn with_run_dir<P: AsRef<Path>>(base: P) -> PomlResult<Self> {
        let run_dir = base
            .as_ref()
            .join(Local::now().format("%Y%m%d%H%M%S%6f").to_string());
        Self::with_dir(run_dir)
    }

    /// Trace into `dir` as-is, creating it if needed.
    pub fn with_dir<P: Into<PathBuf>>(dir: P) -> PomlResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        debug!(trace_dir = %dir.display(), "local tracing enabled");
        Ok(Self {
            trace_dir: Some(dir),
            ..Self::new()
        })
    }

    /// A tracer for the directory configured through `POML_TRACE`, if any.
    pub fn from_settings(settings: &Settings) -> PomlResult<Option<Self>> {
        settings.trace.clone().map(Self::with_dir).transpose()
    }

    pub fn with_sink(mut self, sink: Box<dyn TraceSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn trace_dir(&self) -> Option<&Path> {
        self.trace_dir.as_deref()
    }

    /// The trace version: the name of the trace directory.
    pub fn version(&self) -> Option<String> {
        self.trace_dir
            .as_ref()
            .and_then(|dir| dir.file_name())
            .map(|name| name.to_string_lossy().into_owned())
    }

    /// A copy of the trace log
    pub fn records(&self) -> Vec<TraceRecord> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub(crate) fn push(&self, record: TraceRecord) {
        self.lock().push(record);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TraceRecord>> {
        // Records are plain data, so a poisoned log is still consistent.
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Prefix of the highest-numbered trace written by the renderer, e.g.
    /// `<dir>/0003.greeting`.
    pub fn latest_prefix(&self) -> PomlResult<Option<PathBuf>> {
        let dir = match &self.trace_dir {
            Some(dir) => dir,
            None => return Ok(None),
        };

        let mut latest: Option<(u64, PathBuf)> = None;
        for entry in fs::read_dir(dir)? {
            let file_name = entry?.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let Some(captures) = TRACE_FILE.captures(file_name) else {
                continue;
            };
            let prefix = &captures[1];
            if prefix.ends_with(".source") {
                continue;
            }
            let Ok(index) = prefix.split('.').next().unwrap_or_default().parse::<u64>() else {
                continue;
            };
            if latest.as_ref().map_or(true, |(best, _)| index > *best) {
                latest = Some((index, dir.join(prefix)));
            }
        }
        Ok(latest.map(|(_, prefix)| prefix))
    }

    /// Contents of the latest trace file with the given suffix, if it exists.
    pub fn read_latest(&self, suffix: &str) -> PomlResult<Option<String>> {
        let Some(prefix) = self.latest_prefix()? else {
            return Ok(None);
        };
        let path = with_suffix(&prefix, suffix);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    /// Write an extra artifact next to the latest trace, e.g. the LLM reply
    /// for that prompt. Returns `None` when there is no trace to attach to.
    pub fn write_artifact<C: AsRef<[u8]>>(
        &self,
        suffix: &str,
        contents: C,
    ) -> PomlResult<Option<PathBuf>> {
        let Some(prefix) = self.latest_prefix()? else {
            return Ok(None);
        };
        let suffix = if suffix.starts_with('.') {
            suffix.to_string()
        } else {
            format!(".{}", suffix)
        };
        let path = with_suffix(&prefix, &suffix);
        fs::write(&path, contents)?;
        Ok(Some(path))
    }

    /// Hand the latest traced call to every registered sink.
    pub(crate) fn forward(&self, markup: &str, result: &Value) -> PomlResult<()> {
        let Some(first) = self.sinks.first() else {
            return Ok(());
        };
        let (Some(prefix), Some(_)) = (self.latest_prefix()?, self.version()) else {
            return Err(PomlError::TracingRequired {
                sink: first.name().to_string(),
            });
        };

        let call = CallRecord {
            name: prefix
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            prompt: self
                .read_latest(".poml")?
                .unwrap_or_else(|| markup.to_string()),
            context: self.read_latest_json(".context.json")?,
            stylesheet: self.read_latest_json(".stylesheet.json")?,
            result: result.clone(),
        };

        for sink in &self.sinks {
            debug!(sink = sink.name(), name = %call.name, "forwarding trace");
            sink.log_call(&call)?;
        }
        Ok(())
    }

    fn read_latest_json(&self, suffix: &str) -> PomlResult<Option<Value>> {
        match self.read_latest(suffix)? {
            Some(text) if !text.trim().is_empty() => Ok(Some(serde_json::from_str(&text)?)),
            _ => Ok(None),
        }
    }
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut path = prefix.as_os_str().to_owned();
    path.push(suffix);
    PathBuf::from(path)
}
