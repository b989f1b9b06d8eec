use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::{PreconditionError, TtsConfig};

use super::provider::Synthesizer;
use super::SynthesisError;

/// Runs an external program per line and takes its stdout as the audio.
///
/// `{text}` and `{voice}` in the argument list are substituted; the program is
/// never run through a shell.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandBackend {
    pub fn from_config(config: &TtsConfig) -> Result<Self, PreconditionError> {
        let program = config
            .command
            .program
            .clone()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| {
                PreconditionError::InvalidConfig(
                    "command backend requires tts.command.program".to_string(),
                )
            })?;
        Ok(Self::new(
            program,
            config.command.args.clone(),
            Duration::from_secs(config.timeout_seconds),
        ))
    }

    pub fn new(program: String, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program,
            args,
            timeout,
        }
    }

    fn render_args(&self, text: &str, voice_id: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace("{voice}", voice_id).replace("{text}", text))
            .collect()
    }
}

impl Synthesizer for CommandBackend {
    fn name(&self) -> &str {
        "command"
    }

    fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, SynthesisError> {
        let mut child = Command::new(&self.program)
            .args(self.render_args(text, voice_id))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| SynthesisError::Permanent(format!("spawn {}: {e}", self.program)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SynthesisError::Transient("capture synthesis stdout".to_string()))?;
        let reader = thread::spawn(move || {
            let mut buf = Vec::new();
            let mut handle = stdout;
            let _ = handle.read_to_end(&mut buf);
            buf
        });

        let start = Instant::now();
        loop {
            let polled = child
                .try_wait()
                .map_err(|e| SynthesisError::Transient(format!("poll {}: {e}", self.program)))?;
            if let Some(status) = polled {
                if !status.success() {
                    let _ = reader.join();
                    return Err(SynthesisError::Transient(format!(
                        "{} exited with status {status}",
                        self.program
                    )));
                }
                break;
            }

            if !self.timeout.is_zero() && start.elapsed() >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                let _ = reader.join();
                return Err(SynthesisError::Transient(format!(
                    "{} timed out after {}s",
                    self.program,
                    self.timeout.as_secs()
                )));
            }

            thread::sleep(Duration::from_millis(25));
        }

        reader.join().map_err(|_| {
            SynthesisError::Transient("synthesis reader panicked while streaming audio".to_string())
        })
    }
}
