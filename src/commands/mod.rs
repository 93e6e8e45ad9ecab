mod deploy;
mod restart;
mod show;

pub use deploy::{DeployOpts, run as deploy};
pub use restart::{RestartOpts, run as restart};
pub use show::run as show;

use anyhow::Result;
use log::info;

use crate::remote;

/// Run a state-changing remote command, or narrate it under --dry-run.
/// Read-only probes go through `remote` directly.
pub(crate) fn mutate(host: &str, command: &str, dry_run: bool) -> Result<()> {
    if dry_run {
        info!("[{}] would run: {}", host, command);
        return Ok(());
    }
    remote::run(host, command)
}
