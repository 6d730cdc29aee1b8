//! Presence verification via an external command.
//!
//! The platform consent mechanism (fingerprint reader, PIN dialog, security
//! key tap) stays outside this process; we run whatever verifier the user
//! configured and trust its exit status.  `fprintd-verify` is the default.

use std::path::Path;
use std::process::{Command, Stdio};

use pinguard_core::Authenticator;
use tracing::{debug, warn};

use crate::config::GateConfig;

pub struct CommandGate {
    command: String,
    args: Vec<String>,
}

impl CommandGate {
    pub fn new(config: &GateConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
        }
    }

    fn resolve(&self) -> bool {
        if self.command.is_empty() {
            return false;
        }
        if self.command.contains('/') {
            return Path::new(&self.command).exists();
        }
        let Some(path) = std::env::var_os("PATH") else {
            return false;
        };
        std::env::split_paths(&path).any(|dir| dir.join(&self.command).exists())
    }
}

/// Substitute `{{prompt}}` placeholders in a single argument.
fn render_arg(arg: &str, prompt: &str) -> String {
    arg.replace("{{prompt}}", prompt)
}

impl Authenticator for CommandGate {
    fn is_available(&self) -> bool {
        self.resolve()
    }

    fn verify(&self, prompt: &str) -> bool {
        if !self.resolve() {
            warn!(command = %self.command, "verifier command not found");
            return false;
        }

        let args: Vec<String> = self.args.iter().map(|a| render_arg(a, prompt)).collect();
        debug!(command = %self.command, "running presence verifier");

        // stdin/stdout belong to the protocol peer; the verifier gets neither.
        // stderr is inherited so its own messaging reaches the user.
        let status = Command::new(&self.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status();

        match status {
            Ok(status) if status.success() => {
                debug!("presence verified");
                true
            }
            Ok(status) => {
                debug!(code = ?status.code(), "presence verification declined");
                false
            }
            Err(e) => {
                warn!(command = %self.command, error = %e, "verifier failed to run");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(command: &str, args: &[&str]) -> CommandGate {
        CommandGate::new(&GateConfig {
            command: command.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[test]
    fn render_arg_substitutes_placeholder() {
        assert_eq!(render_arg("--reason={{prompt}}", "sign it"), "--reason=sign it");
        assert_eq!(render_arg("--flag", "sign it"), "--flag");
    }

    #[test]
    fn absolute_path_availability() {
        assert!(gate("/bin/sh", &[]).is_available());
        assert!(!gate("/no/such/verifier", &[]).is_available());
    }

    #[test]
    fn missing_command_declines() {
        assert!(!gate("definitely-not-a-real-verifier-xyz", &[]).verify("prompt"));
    }

    #[test]
    fn exit_status_drives_the_answer() {
        assert!(gate("/bin/sh", &["-c", "exit 0"]).verify("prompt"));
        assert!(!gate("/bin/sh", &["-c", "exit 1"]).verify("prompt"));
    }

    #[test]
    fn placeholder_reaches_the_command() {
        // The shell exits 0 only when the rendered prompt came through.
        let gate = gate("/bin/sh", &["-c", "test \"$1\" = 'unlock key'", "sh", "{{prompt}}"]);
        assert!(gate.verify("unlock key"));
        assert!(!gate.verify("something else"));
    }
}
