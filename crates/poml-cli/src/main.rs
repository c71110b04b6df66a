use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use poml::config::Settings;
use poml::renderer::{NodeRenderer, Renderer};
use poml::trace::LogSink;
use poml::{InputData, OutputFormat, Poml, RenderRequest, Tracer};
use serde_json::Value;
use std::ffi::OsString;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "poml", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render markup and print it in the chosen format
    Render {
        /// Markup source, or the path of a markup file
        markup: String,

        /// JSON file with template context
        #[arg(long, value_name = "FILE", conflicts_with = "context_json")]
        context: Option<PathBuf>,

        /// Inline JSON template context
        #[arg(long, value_name = "JSON")]
        context_json: Option<String>,

        /// JSON stylesheet file
        #[arg(long, value_name = "FILE")]
        stylesheet: Option<PathBuf>,

        /// Render a single prompt instead of a conversation
        #[arg(long)]
        no_chat: bool,

        #[arg(short, long, default_value = "message_dict", value_parser = OutputFormat::parse)]
        format: OutputFormat,

        /// Keep the renderer output at this path
        #[arg(short, long, value_name = "FILE")]
        output_file: Option<PathBuf>,

        /// Trace into a new timestamped run directory under DIR
        #[arg(long, value_name = "DIR")]
        trace_dir: Option<PathBuf>,

        /// Also write every traced call to the log
        #[arg(long)]
        log_calls: bool,

        /// Extra arguments for the renderer
        #[arg(last = true)]
        extra_args: Vec<OsString>,
    },

    /// Convert saved renderer output without running the renderer
    Convert {
        /// Renderer output file; reads stdin when omitted
        input: Option<PathBuf>,

        /// The output was rendered as a single prompt
        #[arg(long)]
        no_chat: bool,

        #[arg(short, long, default_value = "openai_chat", value_parser = OutputFormat::parse)]
        format: OutputFormat,
    },

    /// Run the renderer directly with the given arguments
    Exec {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<OsString>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Render {
            markup,
            context,
            context_json,
            stylesheet,
            no_chat,
            format,
            output_file,
            trace_dir,
            log_calls,
            extra_args,
        } => {
            let settings = Settings::new()?;
            let poml = Poml::from_settings(&settings)?;

            let mut request = RenderRequest::new(markup.as_str())
                .with_chat(!no_chat)
                .with_format(format)
                .with_extra_args(extra_args);
            if let Some(path) = context {
                request = request.with_context(path);
            }
            if let Some(text) = context_json {
                let value: Value =
                    serde_json::from_str(&text).context("--context-json is not valid JSON")?;
                request = request.with_context(InputData::Json(value));
            }
            if let Some(path) = stylesheet {
                request = request.with_stylesheet(path);
            }
            if let Some(path) = output_file {
                request = request.with_output_file(path);
            }

            let tracer = match trace_dir {
                Some(dir) => Some(Tracer::with_run_dir(dir)?),
                None => Tracer::from_settings(&settings)?,
            };
            let tracer = match (tracer, log_calls) {
                (Some(tracer), true) => Some(tracer.with_sink(Box::new(LogSink))),
                (tracer, _) => tracer,
            };
            if let Some(dir) = tracer.as_ref().and_then(Tracer::trace_dir) {
                info!(trace_dir = %dir.display(), "tracing enabled");
            }

            let rendered = poml.render_traced(&request, tracer.as_ref())?;
            println!("{}", rendered.to_text()?);
        }
        Command::Convert {
            input,
            no_chat,
            format,
        } => {
            println!("{}", convert_input(input.as_deref(), !no_chat, format)?);
        }
        Command::Exec { args } => {
            let settings = Settings::new()?;
            let renderer = NodeRenderer::from_settings(&settings)?;
            let output = renderer.run(&args)?;
            print!("{}", output.stdout);
            eprint!("{}", output.stderr);
            process::exit(output.code);
        }
    }
    Ok(())
}

fn convert_input(input: Option<&Path>, chat: bool, format: OutputFormat) -> Result<String> {
    let output = match input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };
    Ok(poml::convert(&output, chat, format)?.to_text()?)
}
