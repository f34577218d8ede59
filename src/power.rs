//! Host power control: SSH-invoked suspend/chown, and Wake-on-LAN.
//!
//! Every external process here is built as [`tokio::process::Command`] with
//! a separately-pushed argv, never a single interpolated shell string
//! (§9/§11 — the redesign away from shell concatenation).

use tokio::process::Command;

use crate::error::{Result, TerracottaError};

fn ssh_command(host: &str, user: &str, password: &str, remote_argv: &[&str]) -> Command {
    let mut cmd = Command::new("sshpass");
    cmd.arg("-p").arg(password);
    cmd.arg("ssh").arg("-o").arg("StrictHostKeyChecking=no").arg(format!("{user}@{host}"));
    cmd.arg("--");
    for arg in remote_argv {
        cmd.arg(arg);
    }
    cmd
}

async fn run(mut cmd: Command) -> Result<()> {
    let program = format!("{:?}", cmd.as_std());
    let status = cmd.status().await?;
    if !status.success() {
        return Err(TerracottaError::Process {
            command: program,
            reason: format!("exited with {status}"),
        });
    }
    Ok(())
}

/// `chown` the VM instance directory to the hypervisor service user, ahead
/// of a live migration.
pub async fn chown_instance_dir(host: &str, user: &str, password: &str, instance_dir: &str, hypervisor_user: &str) -> Result<()> {
    run(ssh_command(host, user, password, &["chown", "-R", hypervisor_user, instance_dir])).await
}

/// Suspend a host via the configured `sleep_command` (default `pm-suspend`).
pub async fn suspend_host(host: &str, user: &str, password: &str, sleep_command: &str) -> Result<()> {
    run(ssh_command(host, user, password, &[sleep_command])).await
}

/// Resolves a host's MAC address via `ping -c1 <host>` followed by
/// `arp -a`, parsing the latter's output field-wise rather than via `awk`.
/// Any result whose length isn't 17 characters (`xx:xx:xx:xx:xx:xx`) is
/// discarded.
pub async fn resolve_mac_address(host: &str) -> Result<Option<String>> {
    let ping_status = Command::new("ping").arg("-c1").arg(host).status().await?;
    if !ping_status.success() {
        return Ok(None);
    }

    let output = Command::new("arp").arg("-a").output().await?;
    if !output.status.success() {
        return Ok(None);
    }
    let stdout = String::from_utf8_lossy(&output.stdout);

    for line in stdout.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let matches_host = fields.first().map(|f| f.contains(host)).unwrap_or(false);
        if !matches_host {
            continue;
        }
        if let Some(mac) = fields.iter().find(|f| f.len() == 17 && f.contains(':')) {
            return Ok(Some(mac.to_string()));
        }
    }
    Ok(None)
}

/// Invokes `ether-wake -i <interface> <mac>` (binary name is `ether-wake` on
/// RedHat-family systems, `etherwake` elsewhere; the caller supplies which).
pub async fn wake_on_lan(binary: &str, interface: &str, mac: &str) -> Result<()> {
    let mut cmd = Command::new(binary);
    cmd.arg("-i").arg(interface).arg(mac);
    run(cmd).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_length_filter_accepts_only_17_characters() {
        let candidates = ["aa:bb:cc:dd:ee:ff", "aa:bb:cc", "not-a-mac-address-at-all"];
        let valid: Vec<&&str> = candidates.iter().filter(|c| c.len() == 17).collect();
        assert_eq!(valid, vec![&"aa:bb:cc:dd:ee:ff"]);
    }

    #[test]
    fn ssh_command_never_builds_a_shell_string() {
        let cmd = ssh_command("host-a", "user", "pw", &["pm-suspend"]);
        assert_eq!(cmd.as_std().get_program(), "sshpass");
    }
}
