use anyhow::Result;
use log::info;
use std::thread;

use super::mutate;
use crate::config::{Config, Project, split_id};
use crate::constants::RESTART_SETTLE;
use crate::{jail, meta, resolver, shell, ui};

#[derive(Debug)]
pub struct RestartOpts {
    pub active: bool,
    pub dry_run: bool,
    pub group: Option<String>,
}

pub fn run(config: &Config, projects: &[String], opts: &RestartOpts) -> Result<()> {
    for name in projects {
        let project = config.project(name)?;
        restart_project(name, project, opts)?;
    }
    Ok(())
}

fn restart_project(name: &str, project: &Project, opts: &RestartOpts) -> Result<()> {
    let group = if let Some(group) = &opts.group {
        group.clone()
    } else if opts.active {
        resolver::active_group(name, project)?
    } else {
        resolver::inactive_group(name, project)?
    };
    let members = project.members(name, &group)?;
    ui::print_step(&format!(
        "Restarting group '{}' of '{}' ({} member(s))",
        group,
        name,
        members.len()
    ));

    for member in members {
        let (jail_name, host) = split_id(&member.id)?;
        let target = jail::inspect(jail_name, host)?;

        if target.running {
            mutate(
                host,
                &format!("ezjail-admin stop {}", shell::escape(jail_name)),
                opts.dry_run,
            )?;
            // Give services inside the jail a moment to wind down.
            if !opts.dry_run {
                thread::sleep(RESTART_SETTLE);
            }
        }

        for path in member.copy_files(project) {
            mutate(
                host,
                &format!(
                    "cp {} {}",
                    shell::escape(path),
                    shell::escape(&format!("{}{}", target.rootdir, path))
                ),
                opts.dry_run,
            )?;
        }

        if let Some(meta_path) = member.meta_path(project) {
            let content = meta::render(
                name,
                &group,
                project.info.as_deref(),
                jail_name,
                host,
                &meta::now_stamp(),
            );
            meta::install(host, &target.rootdir, meta_path, &content, opts.dry_run)?;
        }

        if member.halt {
            info!("{} is marked halt, leaving it stopped", member.id);
        } else {
            mutate(
                host,
                &format!("ezjail-admin start {}", shell::escape(jail_name)),
                opts.dry_run,
            )?;
        }

        ui::print_success(&format!("{} restarted", member.id));
    }
    Ok(())
}
