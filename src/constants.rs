use std::time::Duration;

/// Program name, used to namespace dump files on remote hosts
pub const PROG: &str = "jroll";

/// Directory holding per-jail ezjail configuration on remote hosts
pub const EZJAIL_CONF_DIR: &str = "/usr/local/etc/ezjail";

/// Prefix of every snapshot this tool creates and manages
pub const SNAP_PREFIX: &str = "jroll.";

/// Timestamp layout of managed snapshot names (local time)
pub const SNAP_STAMP_FORMAT: &str = "%Y-%m-%d.%H:%M:%S";

/// Timestamp layout written into the meta file
pub const META_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Snapshots retained per target when the project does not say otherwise
pub const DEFAULT_KEEP: u32 = 23;

/// Directories purged inside the super's root before snapshotting
pub const DEFAULT_CLEAN: &[&str] = &["/tmp", "/var/log"];

/// Host files injected into each target's root after receive
pub const DEFAULT_COPY: &[&str] = &["/etc/hosts", "/etc/resolv.conf"];

/// Path of the deployment descriptor inside each target's root
pub const DEFAULT_META: &str = "/etc/deploy.meta.yml";

/// Configuration file location relative to the executable's directory
pub const DEFAULT_CONFIG: &str = "../etc/jroll.yml";

/// Timeout applied to every resolver HTTP request
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause after stopping a jail during restart, so services can wind down
pub const RESTART_SETTLE: Duration = Duration::from_secs(3);
