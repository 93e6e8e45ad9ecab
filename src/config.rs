use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::constants::{DEFAULT_CLEAN, DEFAULT_COPY, DEFAULT_KEEP, DEFAULT_META};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub projects: BTreeMap<String, Project>,
}

#[derive(Debug, Deserialize)]
pub struct Project {
    /// Authoritative jail, formatted `jail@host`
    #[serde(rename = "super")]
    pub super_id: String,
    /// Data center tag of the super; empty when untagged
    #[serde(default)]
    pub dc: String,
    /// Cohorts, each an ordered list of targets
    pub groups: BTreeMap<String, Vec<Member>>,
    /// Group name to deploy into, or an http(s) URL returning one
    pub inactive: Option<String>,
    /// URL of a YAML document whose `tail` field names the inactive group
    pub info: Option<String>,
    pub keep: Option<u32>,
    pub clean: Option<Vec<String>>,
    pub copy: Option<Vec<String>>,
    /// Absent means the stock path; an explicit `~` or `""` turns the
    /// breadcrumb off
    #[serde(default, deserialize_with = "double_option")]
    pub meta: Option<Option<String>>,
    /// Filter piped after `zfs send`, e.g. `gzip -c`
    pub compress: Option<String>,
    /// Filter piped ahead of `zfs recv`, e.g. `gzip -dc`
    pub decompress: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Member {
    /// Target jail, formatted `jail@host`
    pub id: String,
    #[serde(default)]
    pub dc: String,
    pub keep: Option<u32>,
    pub copy: Option<Vec<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub meta: Option<Option<String>>,
    /// Leave the jail stopped after deploying to it
    #[serde(default)]
    pub halt: bool,
}

/// Keeps an absent key distinguishable from an explicit `meta: ~`:
/// absent stays `None`, a present value (null included) becomes `Some`.
fn double_option<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {:?}", path.as_ref()))?;
        let config: Config =
            serde_yaml::from_str(&content).with_context(|| "failed to parse YAML config")?;
        Ok(config)
    }

    pub fn project(&self, name: &str) -> Result<&Project> {
        self.projects
            .get(name)
            .ok_or_else(|| anyhow!("unknown project '{}'", name))
    }
}

impl Project {
    pub fn members(&self, project_name: &str, group: &str) -> Result<&[Member]> {
        self.groups
            .get(group)
            .map(Vec::as_slice)
            .ok_or_else(|| anyhow!("project '{}' has no group '{}'", project_name, group))
    }

    /// Directories purged inside the super's root before snapshotting.
    /// An explicit empty list skips quiescing entirely.
    pub fn clean_dirs(&self) -> Vec<&str> {
        match &self.clean {
            Some(list) => list.iter().map(String::as_str).collect(),
            None => DEFAULT_CLEAN.to_vec(),
        }
    }

    fn meta_path(&self) -> Option<&str> {
        match &self.meta {
            None => Some(DEFAULT_META),
            Some(value) => explicit_meta(value),
        }
    }
}

/// An explicit `meta:` entry; `~` and the empty string turn the
/// breadcrumb off.
fn explicit_meta(value: &Option<String>) -> Option<&str> {
    match value.as_deref() {
        None | Some("") | Some("~") => None,
        Some(path) => Some(path),
    }
}

impl Member {
    pub fn keep(&self, project: &Project) -> u32 {
        self.keep.or(project.keep).unwrap_or(DEFAULT_KEEP)
    }

    /// Host files injected into this target's root after receive.
    pub fn copy_files<'a>(&'a self, project: &'a Project) -> Vec<&'a str> {
        match self.copy.as_ref().or(project.copy.as_ref()) {
            Some(list) => list.iter().map(String::as_str).collect(),
            None => DEFAULT_COPY.to_vec(),
        }
    }

    /// Where the deployment descriptor lands inside this target's root.
    /// A `~` or empty `meta:` at either level disables it.
    pub fn meta_path<'a>(&'a self, project: &'a Project) -> Option<&'a str> {
        match &self.meta {
            None => project.meta_path(),
            Some(value) => explicit_meta(value),
        }
    }
}

/// Split an instance id into its jail and host parts.
pub fn split_id(id: &str) -> Result<(&str, &str)> {
    match id.split_once('@') {
        Some((jail, host)) if !jail.is_empty() && !host.is_empty() => Ok((jail, host)),
        _ => bail!("malformed instance id '{}', expected jail@host", id),
    }
}
