//! The line-protocol state machine.
//!
//! Speaks the agent's pinentry dialect over any `BufRead`/`Write` pair: one
//! command per line in, one or more response lines out, every response
//! flushed before the next read.  A failed command is answered with `ERR` and
//! the loop keeps reading — nothing a peer sends can take the process down.

use std::io::{self, BufRead, Write};

use pinguard_core::{
    Authenticator, Collected, CollectRequest, Secret, SecretCollector, SessionCache,
};
use pinguard_vault::SecretStore;
use tracing::{debug, error, warn};

use crate::{keyid, wire};

pub const GREETING: &str = "OK Pleased to meet you";

/// Error codes in the pinentry-compatible numeric space (error source 5),
/// distinct per failure class: `99` is cancellation, `1` the general error.
const ERR_CANCELLED: u32 = 83_886_179;
const ERR_GENERIC: u32 = 83_886_081;

/// Per-process session fields set by the peer between requests.
#[derive(Default)]
struct Session {
    description: Option<String>,
    prompt: Option<String>,
    key_info: Option<String>,
}

struct Failure {
    code: u32,
    message: &'static str,
}

impl Failure {
    fn cancelled() -> Self {
        Self {
            code: ERR_CANCELLED,
            message: "Operation cancelled",
        }
    }

    fn generic() -> Self {
        Self {
            code: ERR_GENERIC,
            message: "General error",
        }
    }
}

enum Outcome {
    Continue,
    Quit,
}

pub struct Server<'a> {
    gate: &'a dyn Authenticator,
    store: &'a SecretStore,
    cache: &'a mut SessionCache,
    collector: &'a mut dyn SecretCollector,
    session: Session,
}

impl<'a> Server<'a> {
    pub fn new(
        gate: &'a dyn Authenticator,
        store: &'a SecretStore,
        cache: &'a mut SessionCache,
        collector: &'a mut dyn SecretCollector,
    ) -> Self {
        Self {
            gate,
            store,
            cache,
            collector,
            session: Session::default(),
        }
    }

    /// Emit the greeting, then process commands until `BYE` or end of input.
    pub fn run(&mut self, mut reader: impl BufRead, mut writer: impl Write) -> io::Result<()> {
        writeln!(writer, "{GREETING}")?;
        writer.flush()?;

        let mut raw = Vec::new();
        loop {
            raw.clear();
            if reader.read_until(b'\n', &mut raw)? == 0 {
                break;
            }
            // Lines are read as raw bytes and decoded lossily: invalid UTF-8
            // must not end the loop, it just becomes an unrecognized command.
            let line = String::from_utf8_lossy(&raw);
            match self.dispatch(line.trim(), &mut writer)? {
                Outcome::Continue => {}
                Outcome::Quit => break,
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, line: &str, writer: &mut impl Write) -> io::Result<Outcome> {
        if let Some(text) = line.strip_prefix("SETDESC") {
            self.session.description = Some(wire::unescape(text.trim_start()));
            return ok(writer).map(keep);
        }
        if let Some(text) = line.strip_prefix("SETPROMPT") {
            self.session.prompt = Some(wire::unescape(text.trim_start()));
            return ok(writer).map(keep);
        }
        if let Some(text) = line.strip_prefix("SETKEYINFO") {
            // Key-info is an identifier, never display text: stored raw.
            self.session.key_info = Some(text.trim_start().to_string());
            return ok(writer).map(keep);
        }
        if line.starts_with("GETPIN") {
            match self.getpin() {
                Ok(secret) => {
                    writeln!(writer, "D {}", wire::escape_secret(secret.expose().as_bytes()))?;
                    return ok(writer).map(keep);
                }
                Err(failure) => return err(writer, failure).map(keep),
            }
        }
        if line.starts_with("CONFIRM") {
            let prompt = self
                .session
                .description
                .as_deref()
                .unwrap_or("Confirm user presence");
            if self.gate.verify(prompt) {
                return ok(writer).map(keep);
            }
            debug!("confirmation declined");
            return err(writer, Failure::cancelled()).map(keep);
        }
        if line.starts_with("MESSAGE") || line.starts_with("OPTION") {
            return ok(writer).map(keep);
        }
        if let Some(what) = line.strip_prefix("GETINFO") {
            match what.trim() {
                "version" => writeln!(writer, "D {}", env!("CARGO_PKG_VERSION"))?,
                "pid" => writeln!(writer, "D {}", std::process::id())?,
                _ => {}
            }
            return ok(writer).map(keep);
        }
        if line.starts_with("BYE") {
            writeln!(writer, "OK closing connection")?;
            writer.flush()?;
            return Ok(Outcome::Quit);
        }
        if line.starts_with("RESET") {
            self.session = Session::default();
            return ok(writer).map(keep);
        }

        // Unrecognized commands are acknowledged, never errored: the peer may
        // speak a newer dialect and must not be derailed by it.
        ok(writer).map(keep)
    }

    /// The secret-retrieval flow.
    ///
    /// Presence verification comes first, unconditionally — a cached or
    /// stored secret is never released without a fresh check.  After that the
    /// cache, the vault, and finally the user are consulted, short-circuiting
    /// on the first hit.
    fn getpin(&mut self) -> Result<Secret, Failure> {
        let key_id = keyid::extract(
            self.session.key_info.as_deref(),
            self.session.description.as_deref(),
        );
        debug!(key_id = %key_id, "secret requested");

        let gate_prompt = self
            .session
            .description
            .as_deref()
            .or(self.session.prompt.as_deref())
            .unwrap_or("Unlock signing key");
        if !self.gate.verify(gate_prompt) {
            debug!(key_id = %key_id, "presence verification declined");
            return Err(Failure::cancelled());
        }

        if let Some(secret) = self.cache.get(&key_id) {
            debug!(key_id = %key_id, "cache hit");
            return Ok(secret.clone());
        }

        if let Some(secret) = self.store.get(&key_id) {
            debug!(key_id = %key_id, "vault hit");
            self.cache.insert(key_id, secret.clone());
            return Ok(secret);
        }

        debug!(key_id = %key_id, "vault miss, collecting");
        let request = CollectRequest {
            key_id: &key_id,
            description: self.session.description.as_deref(),
            prompt: self.session.prompt.as_deref(),
        };
        match self.collector.collect(&request) {
            Ok(Collected::Provided(secret)) => {
                if let Err(e) = self.store.put(&key_id, &secret) {
                    // The secret still serves this session from memory; the
                    // user just won't find it persisted next time.
                    warn!(key_id = %key_id, error = %e, "could not persist secret");
                }
                self.cache.insert(key_id, secret.clone());
                Ok(secret)
            }
            Ok(Collected::Cancelled) => {
                debug!(key_id = %key_id, "secret entry cancelled");
                Err(Failure::cancelled())
            }
            Err(e) => {
                error!(key_id = %key_id, error = %e, "secret collection failed");
                Err(Failure::generic())
            }
        }
    }
}

fn keep(_: ()) -> Outcome {
    Outcome::Continue
}

fn ok(writer: &mut impl Write) -> io::Result<()> {
    writeln!(writer, "OK")?;
    writer.flush()
}

fn err(writer: &mut impl Write, failure: Failure) -> io::Result<()> {
    writeln!(writer, "ERR {} {}", failure.code, failure.message)?;
    writer.flush()
}
