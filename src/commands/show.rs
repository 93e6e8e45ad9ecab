use anyhow::Result;

use crate::config::{Config, split_id};
use crate::jail;

/// Read-only listing of projects, groups and member states. With no
/// arguments every configured project is shown.
pub fn run(config: &Config, projects: &[String]) -> Result<()> {
    let names: Vec<&str> = if projects.is_empty() {
        config.projects.keys().map(String::as_str).collect()
    } else {
        // Unknown names abort before anything is printed.
        for name in projects {
            config.project(name)?;
        }
        projects.iter().map(String::as_str).collect()
    };

    for name in names {
        let project = config.project(name)?;
        println!("{}:", name);
        println!("  super:    {}", project.super_id);
        // The configured value is shown as-is; resolving a URL here
        // would turn a listing into a live HTTP call.
        println!("  inactive: {}", project.inactive.as_deref().unwrap_or("~"));
        for (group_name, members) in &project.groups {
            let state = if project.inactive.as_deref() == Some(group_name.as_str()) {
                "inactive"
            } else {
                "active"
            };
            println!("  {} ({}):", group_name, state);
            for member in members {
                let (jail_name, host) = split_id(&member.id)?;
                let target = jail::inspect(jail_name, host)?;
                let (marker, state) = if target.running {
                    ("●", "running")
                } else {
                    ("○", "stopped")
                };
                println!("    {} {:<32} {}", marker, member.id, state);
            }
        }
        println!();
    }
    Ok(())
}
