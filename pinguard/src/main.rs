//! pinentry-compatible helper gating secret release behind a local
//! presence check, with an encrypted on-disk vault so a passphrase is
//! typed once per machine rather than once per signature.

mod collect;
mod config;
mod gate;
mod keyid;
mod server;
mod wire;

use std::io::Write;

use anyhow::Context;
use pinguard_core::SessionCache;
use pinguard_vault::{HostIdCipher, MachineKeyCipher, SecretStore};
use tracing::debug;

fn main() -> anyhow::Result<()> {
    init_logging();

    let config = config::load();

    let vault_path = match config.vault.path.clone() {
        Some(path) => path,
        None => SecretStore::default_path().context("cannot locate a data directory ($XDG_DATA_HOME or $HOME)")?,
    };
    debug!(path = %vault_path.display(), "vault location");

    let store = SecretStore::new(
        vault_path,
        vec![
            Box::new(MachineKeyCipher::new()),
            Box::new(HostIdCipher::new()),
        ],
    );
    let gate = gate::CommandGate::new(&config.gate);
    let mut cache = SessionCache::new();
    let mut collector = collect::TtyCollector::new();

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut server = server::Server::new(&gate, &store, &mut cache, &mut collector);
    server.run(stdin.lock(), stdout.lock())?;

    std::io::stderr().flush().ok();
    Ok(())
}

/// Diagnostics go to stderr only; stdout carries the protocol.  The
/// `PINGUARD_DEBUG` switch turns on debug-level tracing, and messages never
/// include secret material.
fn init_logging() {
    let level = if pinguard_core::debug_enabled() {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();
}
