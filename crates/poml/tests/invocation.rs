use anyhow::Result;
use poml::renderer::{NodeRenderer, RunOutput, Renderer};
use poml::trace::LogSink;
use poml::{OutputFormat, Poml, PomlError, PomlResult, RenderRequest, Rendered, Tracer};
use serde_json::json;
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Writes a fixed result to the `-o` path and remembers every argument list.
struct ScriptedRenderer {
    output: String,
    calls: Arc<Mutex<Vec<Vec<OsString>>>>,
}

impl Renderer for ScriptedRenderer {
    fn run(&self, args: &[OsString]) -> PomlResult<RunOutput> {
        self.calls.lock().unwrap().push(args.to_vec());
        let out = args
            .iter()
            .position(|arg| arg == "-o")
            .map(|i| PathBuf::from(&args[i + 1]))
            .unwrap();
        fs::write(out, &self.output)?;
        Ok(RunOutput::default())
    }
}

fn scripted(output: serde_json::Value) -> (Poml, Arc<Mutex<Vec<Vec<OsString>>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let renderer = ScriptedRenderer {
        output: output.to_string(),
        calls: calls.clone(),
    };
    (Poml::new(Box::new(renderer)), calls)
}

#[test]
fn renders_markup_file_into_openai_chat() -> Result<()> {
    let dir = TempDir::new()?;
    let markup = dir.path().join("ask.poml");
    fs::write(&markup, "<poml><p>What is the capital of France?</p></poml>")?;

    let (poml, calls) = scripted(json!({
        "messages": [{"speaker": "human", "content": "What is the capital of France?"}],
        "schema": {"type": "object", "properties": {"city": {"type": "string"}}},
        "runtime": {"temperature": 0.1}
    }));
    let request = RenderRequest::new(markup.to_str().unwrap()).with_format(OutputFormat::OpenaiChat);
    let rendered = poml.render(&request)?;

    assert_eq!(
        rendered,
        Rendered::Json(json!({
            "messages": [{"role": "user", "content": "What is the capital of France?"}],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "schema",
                    "schema": {"type": "object", "properties": {"city": {"type": "string"}}},
                    "strict": true
                }
            },
            "temperature": 0.1
        }))
    );

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0][0], "-f");
    assert_eq!(calls[0][1], markup.as_os_str());
    Ok(())
}

#[test]
fn frame_format_returns_validated_frame() -> Result<()> {
    let (poml, _) = scripted(json!([{"speaker": "ai", "content": "Paris"}]));
    let rendered = poml.render(&RenderRequest::new("<ai>Paris</ai>").with_format(OutputFormat::Frame))?;
    let frame = rendered.as_frame().unwrap();
    assert_eq!(frame.messages.len(), 1);
    assert_eq!(frame.messages[0].speaker, poml::Speaker::Ai);
    Ok(())
}

#[test]
fn malformed_output_leaves_failed_trace_record() {
    let (poml, _) = scripted(json!({"messages": "not a list"}));
    let tracer = Tracer::new();
    let result = poml.render_traced(&RenderRequest::new("<p/>"), Some(&tracer));
    assert!(matches!(result, Err(PomlError::MalformedMessage(_))));

    let records = tracer.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].markup.as_deref(), Some("<p/>"));
    assert!(records[0].result.is_none());
}

#[test]
fn log_sink_requires_trace_directory() {
    let (poml, calls) = scripted(json!({"messages": []}));
    let tracer = Tracer::new().with_sink(Box::new(LogSink));
    match poml.render_traced(&RenderRequest::new("<p/>"), Some(&tracer)) {
        Err(PomlError::TracingRequired { sink }) => assert_eq!(sink, "log"),
        other => panic!("Expected TracingRequired, got {:?}", other),
    }
    assert_eq!(calls.lock().unwrap().len(), 1);
}

#[test]
fn trace_artifact_lands_next_to_latest_trace() -> Result<()> {
    let base = TempDir::new()?;
    let tracer = Tracer::with_run_dir(base.path())?;
    let trace_dir = tracer.trace_dir().unwrap().to_path_buf();
    fs::write(trace_dir.join("0001.first.poml"), "<p>1</p>")?;
    fs::write(trace_dir.join("0002.second.poml"), "<p>2</p>")?;
    fs::write(trace_dir.join("0002.second.source.poml"), "<p>2</p>")?;

    let path = tracer.write_artifact("reply.txt", "Paris")?.unwrap();
    assert_eq!(path, trace_dir.join("0002.second.reply.txt"));
    assert_eq!(fs::read_to_string(path)?, "Paris");
    Ok(())
}

#[cfg(unix)]
#[test]
fn node_renderer_runs_script_end_to_end() -> Result<()> {
    let dir = TempDir::new()?;
    let script = dir.path().join("cli.sh");
    fs::write(
        &script,
        r#"while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
printf '%s' '{"messages":[{"speaker":"human","content":"Hi"}]}' > "$out"
"#,
    )?;

    let poml = Poml::new(Box::new(NodeRenderer::new("sh", &script)));
    let rendered = poml.render(&RenderRequest::new("<p>Hi</p>").with_format(OutputFormat::Langchain))?;
    assert_eq!(
        rendered,
        Rendered::Json(json!({"messages": [{"type": "human", "data": {"content": "Hi"}}]}))
    );
    Ok(())
}
