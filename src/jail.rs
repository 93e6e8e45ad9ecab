use anyhow::{Result, anyhow};
use log::debug;
use std::collections::{HashMap, HashSet};

use crate::constants::EZJAIL_CONF_DIR;
use crate::{remote, shell};

/// Everything jroll knows about one jail, discovered fresh per operation.
#[derive(Debug, Clone)]
pub struct JailInfo {
    pub host: String,
    pub jail: String,
    /// Mount point of the jail's root filesystem
    pub rootdir: String,
    /// ZFS dataset mounted at `rootdir`
    pub rootfs: String,
    pub ip: String,
    pub hostname: String,
    /// Snapshot suffixes on `rootfs`, newest first
    pub snapshots: Vec<String>,
    pub snapshot_set: HashSet<String>,
    pub running: bool,
}

impl JailInfo {
    pub fn has_snapshot(&self, suffix: &str) -> bool {
        self.snapshot_set.contains(suffix)
    }
}

/// Discover a jail's root dataset, snapshots and running state by
/// probing its host over ssh.
pub fn inspect(jail: &str, host: &str) -> Result<JailInfo> {
    debug!("inspecting jail {} on {}", jail, host);
    let safe = sanitize(jail);

    let conf = remote::run_with_output(host, &format!("cat {}/{}", EZJAIL_CONF_DIR, safe))?;
    let attrs = parse_ezjail_conf(&conf, &safe);
    let rootdir = attrs
        .get("rootdir")
        .cloned()
        .ok_or_else(|| anyhow!("jail {} on {}: no rootdir in ezjail config", jail, host))?;
    let ip = attrs.get("ip").cloned().unwrap_or_default();
    let hostname = attrs.get("hostname").cloned().unwrap_or_default();

    let mounts = remote::run_with_output(host, "mount -ptzfs")?;
    let rootfs = find_rootfs(&mounts, &rootdir).ok_or_else(|| {
        anyhow!("jail {} on {}: no ZFS filesystem mounted at {}", jail, host, rootdir)
    })?;

    let listing = remote::run_with_output(
        host,
        &format!("zfs list -Hrt snapshot -oname {}", shell::escape(&rootfs)),
    )?;
    let snapshots = parse_snapshot_listing(&listing, &rootfs);
    let snapshot_set = snapshots.iter().cloned().collect();

    let status = remote::run_with_output(host, "ezjail-admin list")?;
    let running = parse_running(&status, &ip, &hostname);

    Ok(JailInfo {
        host: host.to_string(),
        jail: jail.to_string(),
        rootdir,
        rootfs,
        ip,
        hostname,
        snapshots,
        snapshot_set,
        running,
    })
}

/// ezjail flattens jail names into shell variable names the same way.
fn sanitize(jail: &str) -> String {
    jail.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Pick the `jail_<safe>_<key>="<value>"` exports out of an ezjail
/// config. The ip value may carry a leading `<interface>|` token.
fn parse_ezjail_conf(output: &str, safe: &str) -> HashMap<String, String> {
    let prefix = format!("jail_{}_", safe);
    let mut attrs = HashMap::new();
    for line in output.lines() {
        let Some(rest) = line.trim().strip_prefix("export") else {
            continue;
        };
        // Any run of whitespace may separate the keyword from the key.
        if !rest.starts_with(|c: char| c.is_ascii_whitespace()) {
            continue;
        }
        let Some(rest) = rest.trim_start().strip_prefix(&prefix) else {
            continue;
        };
        let Some((key, value)) = rest.split_once('=') else {
            continue;
        };
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            continue;
        }
        let Some(value) = value
            .trim()
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
        else {
            continue;
        };
        let value = if key == "ip" {
            match value.split_once('|') {
                Some((_iface, ip)) => ip,
                None => value,
            }
        } else {
            value
        };
        attrs.insert(key.to_string(), value.to_string());
    }
    attrs
}

/// `mount -ptzfs` prints `<fs> <mountpoint> zfs <options>` per line.
fn find_rootfs(mounts: &str, rootdir: &str) -> Option<String> {
    mounts.lines().find_map(|line| {
        let mut cols = line.split_whitespace();
        let fs = cols.next()?;
        let mountpoint = cols.next()?;
        (mountpoint == rootdir).then(|| fs.to_string())
    })
}

/// `zfs list -Hrt snapshot -oname` prints `<dataset>@<suffix>` per line,
/// oldest first; child datasets show up under -r and are skipped.
fn parse_snapshot_listing(listing: &str, rootfs: &str) -> Vec<String> {
    let prefix = format!("{}@", rootfs);
    let mut snapshots: Vec<String> = listing
        .lines()
        .filter_map(|line| line.trim().strip_prefix(&prefix))
        .map(str::to_string)
        .collect();
    snapshots.reverse();
    snapshots
}

/// `ezjail-admin list` rows: status, JID, IP, hostname, root directory.
/// Our jail is the row matching its ip and hostname; an `R` in the
/// status column means it runs.
fn parse_running(listing: &str, ip: &str, hostname: &str) -> bool {
    listing.lines().any(|line| {
        let cols: Vec<&str> = line.split_whitespace().collect();
        cols.len() >= 4 && cols[2] == ip && cols[3] == hostname && cols[0].contains('R')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EZJAIL_CONF: &str = "
export jail_web_1_hostname=\"web1.example.net\"
export jail_web_1_ip=\"em0|10.1.2.3\"
export\tjail_web_1_rootdir=\"/usr/jails/web-1\"
export   jail_web_1_exec_start=\"/bin/sh /etc/rc\"
# export jail_web_1_vnet_enable=\"YES\"
exportjail_web_1_bogus=\"x\"
export jail_other_ip=\"10.9.9.9\"
";

    #[test]
    fn ezjail_conf_yields_all_exports_for_the_jail() {
        let attrs = parse_ezjail_conf(EZJAIL_CONF, "web_1");
        // Tabs and runs of spaces after the keyword both parse.
        assert_eq!(attrs.get("rootdir").unwrap(), "/usr/jails/web-1");
        assert_eq!(attrs.get("exec_start").unwrap(), "/bin/sh /etc/rc");
        assert_eq!(attrs.get("hostname").unwrap(), "web1.example.net");
        assert!(!attrs.contains_key("vnet_enable"));
        assert!(!attrs.contains_key("bogus"));
        assert_eq!(attrs.len(), 4);
    }

    #[test]
    fn ip_interface_prefix_is_stripped() {
        let attrs = parse_ezjail_conf(EZJAIL_CONF, "web_1");
        assert_eq!(attrs.get("ip").unwrap(), "10.1.2.3");

        let bare = parse_ezjail_conf("export jail_w_ip=\"10.0.0.7\"\n", "w");
        assert_eq!(bare.get("ip").unwrap(), "10.0.0.7");
    }

    #[test]
    fn sanitize_flattens_non_alphanumerics() {
        assert_eq!(sanitize("web-1"), "web_1");
        assert_eq!(sanitize("db.main"), "db_main");
        assert_eq!(sanitize("plain9"), "plain9");
    }

    #[test]
    fn rootfs_is_the_dataset_mounted_at_rootdir() {
        let mounts = "\
tank/jails/web-1 /usr/jails/web-1 zfs rw,noatime
tank/jails/web-1/data /usr/jails/web-1/data zfs rw
tank/home /home zfs rw
";
        assert_eq!(
            find_rootfs(mounts, "/usr/jails/web-1").unwrap(),
            "tank/jails/web-1"
        );
        assert!(find_rootfs(mounts, "/usr/jails/web-2").is_none());
    }

    #[test]
    fn snapshots_come_back_newest_first_without_children() {
        let listing = "\
tank/jails/web-1@jroll.2024-01-01.00:00:00
tank/jails/web-1@jroll.2024-02-01.00:00:00
tank/jails/web-1/data@jroll.2024-02-01.00:00:00
tank/jails/web-1@manual
";
        let snapshots = parse_snapshot_listing(listing, "tank/jails/web-1");
        assert_eq!(
            snapshots,
            vec![
                "manual",
                "jroll.2024-02-01.00:00:00",
                "jroll.2024-01-01.00:00:00",
            ]
        );
    }

    const EZJAIL_LIST: &str = "\
STA JID  IP              Hostname                       Root Directory
--- ---- --------------- ------------------------------ ------------------------
ZR  23   10.1.2.3        web1.example.net               /usr/jails/web-1
ZS  N/A  10.1.2.4        web2.example.net               /usr/jails/web-2
";

    #[test]
    fn running_state_comes_from_the_matching_row() {
        assert!(parse_running(EZJAIL_LIST, "10.1.2.3", "web1.example.net"));
        assert!(!parse_running(EZJAIL_LIST, "10.1.2.4", "web2.example.net"));
        assert!(!parse_running(EZJAIL_LIST, "10.9.9.9", "nope.example.net"));
    }
}
