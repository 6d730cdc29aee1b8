//! First-time secret collection on the controlling terminal.

use std::path::PathBuf;

use pinguard_core::{Collected, CollectRequest, Secret, SecretCollector};
use tracing::debug;

/// Prompts once on the controlling terminal with echo disabled.
///
/// A headless run (no `/dev/tty`), a read failure, or EOF from Ctrl-D is
/// treated as the user backing out.  An empty entered line is a valid empty
/// secret — the two stay distinct all the way up the stack.
pub struct TtyCollector {
    device: PathBuf,
}

impl TtyCollector {
    pub fn new() -> Self {
        Self {
            device: PathBuf::from("/dev/tty"),
        }
    }
}

impl Default for TtyCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretCollector for TtyCollector {
    fn collect(&mut self, request: &CollectRequest<'_>) -> anyhow::Result<Collected> {
        // Without a controlling terminal rpassword falls back to
        // stdout/stdin, which here are the protocol channel.  Probe the
        // device first so that case cancels instead of corrupting the stream.
        if std::fs::File::open(&self.device).is_err() {
            debug!(key_id = %request.key_id, "no controlling terminal, cancelling");
            return Ok(Collected::Cancelled);
        }

        if let Some(description) = request.description {
            eprintln!("{description}");
        }
        let label = request.prompt.unwrap_or("Passphrase");

        match rpassword::prompt_password(format!("{label}: ")) {
            Ok(value) => Ok(Collected::Provided(Secret::new(value))),
            Err(e) => {
                debug!(key_id = %request.key_id, error = %e, "secret entry cancelled");
                Ok(Collected::Cancelled)
            }
        }
    }
}
