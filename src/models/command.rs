//! External-process generation backend.
//!
//! Runs a configured program once per job. The job parameters are written as
//! one JSON object to the program's stdin; the program must print one
//! [`GenerationOutput`] JSON object to stdout and exit with status 0.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::types::{GenerationOutput, GenerationParams};

use super::backend::{GenerationError, Generator};

/// Largest stderr excerpt kept in an error message.
const MAX_STDERR_CHARS: usize = 2000;

/// Generator that shells out to an inference program.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandGenerator {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Parses a shell-like command line: program followed by
    /// whitespace-separated arguments. Quoting is not supported.
    pub fn from_command_line(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace();
        let program = parts.next()?;
        Some(Self::new(program, parts.map(str::to_string).collect()))
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }
}

impl Generator for CommandGenerator {
    fn kind(&self) -> &'static str {
        "command"
    }

    fn generate(&self, params: &GenerationParams) -> Result<GenerationOutput, GenerationError> {
        let input = serde_json::to_vec(params)
            .map_err(|e| GenerationError::InvalidOutput(format!("cannot encode params: {}", e)))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| GenerationError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        // The program may exit before reading its input. Always reap it so
        // its exit status and stderr win over the write error.
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin
                .write_all(&input)
                .and_then(|()| stdin.write_all(b"\n")),
            None => Ok(()),
        };

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let excerpt: String = stderr.trim().chars().take(MAX_STDERR_CHARS).collect();
            return Err(GenerationError::ProcessExit {
                status: output.status.to_string(),
                stderr: excerpt,
            });
        }

        written?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        // Programs may log before the result; the result is the last non-empty line.
        let last_line = stdout
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| GenerationError::InvalidOutput("empty stdout".to_string()))?;

        serde_json::from_str(last_line.trim())
            .map_err(|e| GenerationError::InvalidOutput(format!("{}: {}", e, last_line.trim())))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::types::{GenerationDefaults, GenerationRequest};

    fn params() -> GenerationParams {
        GenerationDefaults::default().merge(GenerationRequest {
            caption: Some("lofi".to_string()),
            seed: Some(1),
            ..Default::default()
        })
    }

    fn sh(script: &str) -> CommandGenerator {
        CommandGenerator::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    #[test]
    fn parses_last_stdout_line() {
        let generator = sh(
            r#"cat >/dev/null; echo "loading weights"; echo '{"audio_paths":["/out/a.wav"],"metas":{"bpm":92}}'"#,
        );
        let output = generator.generate(&params()).unwrap();
        assert_eq!(output.audio_paths, vec!["/out/a.wav".to_string()]);
        assert_eq!(output.metas.bpm, Some(92));
    }

    #[test]
    fn receives_params_on_stdin() {
        // Succeeds only if the caption arrived on stdin.
        let generator = sh(
            r#"read line; case "$line" in *'"caption":"lofi"'*) echo '{"audio_paths":["ok"]}';; *) exit 3;; esac"#,
        );
        let output = generator.generate(&params()).unwrap();
        assert_eq!(output.audio_paths, vec!["ok".to_string()]);
    }

    #[test]
    fn exit_status_reported_when_stdin_closed_early() {
        // Larger than a pipe buffer, so the write fails once stdin closes.
        let params = GenerationDefaults::default().merge(GenerationRequest {
            caption: Some("lofi ".repeat(40_000)),
            seed: Some(1),
            ..Default::default()
        });
        let generator = sh("exec 0<&-; echo 'model weights missing' >&2; sleep 0.3; exit 3");
        match generator.generate(&params).unwrap_err() {
            GenerationError::ProcessExit { status, stderr } => {
                assert!(status.contains('3'), "status: {status}");
                assert!(stderr.contains("model weights missing"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_zero_exit_is_error() {
        let generator = sh("cat >/dev/null; echo 'cuda out of memory' >&2; exit 2");
        let err = generator.generate(&params()).unwrap_err();
        match err {
            GenerationError::ProcessExit { stderr, .. } => {
                assert!(stderr.contains("cuda out of memory"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn garbage_output_is_error() {
        let generator = sh("cat >/dev/null; echo 'not json'");
        let err = generator.generate(&params()).unwrap_err();
        assert!(matches!(err, GenerationError::InvalidOutput(_)));
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let generator = CommandGenerator::new("/nonexistent/lofi-render", Vec::new());
        let err = generator.generate(&params()).unwrap_err();
        assert!(matches!(err, GenerationError::Spawn { .. }));
    }

    #[test]
    fn command_line_parsing() {
        let generator = CommandGenerator::from_command_line("python render.py --fp16").unwrap();
        assert_eq!(generator.program(), &PathBuf::from("python"));
        assert_eq!(generator.args, vec!["render.py", "--fp16"]);
        assert!(CommandGenerator::from_command_line("   ").is_none());
    }
}
