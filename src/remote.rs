use anyhow::{Context, Result, anyhow};
use log::debug;
use std::path::Path;
use std::process::Command;

/// Run a shell command on a remote host, discarding its output.
pub fn run(host: &str, command: &str) -> Result<()> {
    run_with_output(host, command).map(|_| ())
}

/// Run a shell command on a remote host and return its standard output.
pub fn run_with_output(host: &str, command: &str) -> Result<String> {
    debug!("ssh [{}] {}", host, command);
    let output = Command::new("ssh")
        .arg(host)
        .arg(command)
        .output()
        .with_context(|| format!("failed to spawn ssh to {}", host))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!("stdout: {}", stdout);
        debug!("stderr: {}", stderr);
        return Err(anyhow!(
            "command failed on {}: {}: {}",
            host,
            command,
            stderr.trim()
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Push a local file to a path on a remote host.
pub fn copy(host: &str, local: &Path, remote_path: &str) -> Result<()> {
    debug!("scp {} -> {}:{}", local.display(), host, remote_path);
    let output = Command::new("scp")
        .arg("-q")
        .arg(local)
        .arg(format!("{}:{}", host, remote_path))
        .output()
        .with_context(|| format!("failed to spawn scp to {}", host))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!(
            "scp of {} to {}:{} failed: {}",
            local.display(),
            host,
            remote_path,
            stderr.trim()
        ));
    }
    Ok(())
}

/// Login name of the invoking user, used to namespace files created on
/// remote hosts.
pub fn username() -> String {
    std::env::var("USER").unwrap_or_else(|_| String::from("root"))
}
