use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

use crate::config::Settings;
use crate::errors::{PomlError, PomlResult};

/// Exit status and captured streams of one renderer run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// The external program that turns markup into rendered JSON.
///
/// It is invoked with `-f <markup> -o <output>` plus options, and writes its
/// result to the output path.
#[cfg_attr(test, mockall::automock)]
pub trait Renderer: Send + Sync {
    fn run(&self, args: &[OsString]) -> PomlResult<RunOutput>;
}

/// Runs the renderer's JavaScript entrypoint with a Node executable.
#[derive(Debug, Clone)]
pub struct NodeRenderer {
    node: String,
    script: PathBuf,
}

impl NodeRenderer {
    pub fn new<N: Into<String>, S: Into<PathBuf>>(node: N, script: S) -> Self {
        Self {
            node: node.into(),
            script: script.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> PomlResult<Self> {
        let script = settings
            .renderer
            .cli_script()
            .map_err(|e| PomlError::RendererUnavailable(e.to_string()))?;
        Ok(Self::new(settings.renderer.node.clone(), script))
    }

    pub fn script(&self) -> &PathBuf {
        &self.script
    }
}

impl Renderer for NodeRenderer {
    fn run(&self, args: &[OsString]) -> PomlResult<RunOutput> {
        if !self.script.is_file() {
            return Err(PomlError::RendererUnavailable(format!(
                "Expected CLI entrypoint: {} to exist",
                self.script.display()
            )));
        }

        debug!(node = %self.node, script = %self.script.display(), ?args, "running renderer");
        let output = Command::new(&self.node)
            .arg(&self.script)
            .args(args)
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => PomlError::RendererUnavailable(format!(
                    "Node executable '{}' was not found",
                    self.node
                )),
                _ => PomlError::Io(e),
            })?;

        Ok(RunOutput {
            // Killed by a signal: no exit code, report it as a failure.
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_script() {
        let renderer = NodeRenderer::new("node", "/definitely/not/here/cli.js");
        match renderer.run(&[]) {
            Err(PomlError::RendererUnavailable(message)) => {
                assert!(message.contains("/definitely/not/here/cli.js"))
            }
            other => panic!("Expected RendererUnavailable, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_node_executable() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("cli.js");
        fs::write(&script, "").unwrap();

        let renderer = NodeRenderer::new("poml-test-no-such-node", &script);
        assert!(matches!(
            renderer.run(&[OsString::from("-f")]),
            Err(PomlError::RendererUnavailable(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_code_and_streams_are_captured() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("cli.sh");
        fs::write(&script, "echo \"args: $*\"\necho oops >&2\nexit 3\n").unwrap();

        let renderer = NodeRenderer::new("sh", &script);
        let output = renderer
            .run(&[OsString::from("-f"), OsString::from("in.poml")])
            .unwrap();
        assert_eq!(output.code, 3);
        assert!(!output.success());
        assert_eq!(output.stdout.trim(), "args: -f in.poml");
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[test]
    fn test_from_settings_requires_script() {
        let settings = Settings::default();
        match NodeRenderer::from_settings(&settings) {
            Err(PomlError::RendererUnavailable(message)) => {
                assert!(message.contains("POML_RENDERER__CLI_SCRIPT"))
            }
            other => panic!("Expected RendererUnavailable, got {:?}", other),
        }
    }
}
