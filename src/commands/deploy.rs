use anyhow::{Result, anyhow};
use chrono::Local;
use indicatif::ProgressBar;
use log::{debug, info};

use super::mutate;
use crate::config::{Config, Member, Project, split_id};
use crate::constants::{PROG, SNAP_PREFIX, SNAP_STAMP_FORMAT};
use crate::jail::{self, JailInfo};
use crate::pillar::TransferPlan;
use crate::sweep::{self, SweepMode};
use crate::{meta, remote, resolver, shell, ui};

#[derive(Debug)]
pub struct DeployOpts {
    pub group: Option<String>,
    pub dry_run: bool,
    pub sweep: bool,
    pub no_sweep: bool,
}

impl DeployOpts {
    fn sweep_mode(&self) -> SweepMode {
        if self.no_sweep {
            SweepMode::Disabled
        } else if self.sweep {
            SweepMode::Demand
        } else {
            SweepMode::Auto
        }
    }
}

pub fn run(config: &Config, projects: &[String], opts: &DeployOpts) -> Result<()> {
    for name in projects {
        let project = config.project(name)?;
        deploy_project(name, project, opts)?;
    }
    Ok(())
}

/// State shared across the per-member fan-out of one project.
struct Rollout<'a> {
    name: &'a str,
    project: &'a Project,
    group: String,
    plan: TransferPlan,
    base: String,
    dump: String,
    dry_run: bool,
}

fn deploy_project(name: &str, project: &Project, opts: &DeployOpts) -> Result<()> {
    let group = match &opts.group {
        Some(group) => group.clone(),
        None => resolver::inactive_group(name, project)?,
    };
    let members = project.members(name, &group)?;
    ui::print_step(&format!(
        "Deploying '{}' into group '{}' ({} member(s))",
        name,
        group,
        members.len()
    ));
    if opts.dry_run {
        info!("dry run: no host will be changed");
    }

    // Discovery: the super first, then every member in order. The base
    // must be chosen against the freshest view of all targets.
    let (super_jail, super_host) = split_id(&project.super_id)?;
    let sup = jail::inspect(super_jail, super_host)?;
    let mut targets = Vec::with_capacity(members.len());
    for member in members {
        let (jail_name, host) = split_id(&member.id)?;
        targets.push((member, jail::inspect(jail_name, host)?));
    }

    let plan = TransferPlan::build(project, members);
    for (dc, pillar, consumers) in plan.describe() {
        debug!("dc '{}': pillar {}, {} consumer(s)", dc, pillar, consumers);
    }

    let base = select_base(&sup, &targets)?;
    info!("base snapshot: {}@{}", sup.rootfs, base);

    let sweeps: Vec<Vec<String>> = targets
        .iter()
        .map(|(member, target)| {
            let doomed = sweep::plan(
                &target.snapshots,
                &base,
                member.keep(project),
                opts.sweep_mode(),
            );
            debug!("{}: {} snapshot(s) planned for removal", member.id, doomed.len());
            doomed
        })
        .collect();

    // Quiesce the super and purge volatile directories before cutting
    // the snapshot.
    let clean = project.clean_dirs();
    if !clean.is_empty() {
        mutate(
            super_host,
            &format!("ezjail-admin stop {}", shell::escape(super_jail)),
            opts.dry_run,
        )?;
        for dir in &clean {
            let path = format!("{}{}", sup.rootdir, dir);
            mutate(
                super_host,
                &format!("find {} -type f -delete", shell::escape(&path)),
                opts.dry_run,
            )?;
        }
    }

    let snapshot = format!("{}{}", SNAP_PREFIX, Local::now().format(SNAP_STAMP_FORMAT));
    mutate(
        super_host,
        &format!(
            "zfs snapshot {}",
            shell::escape(&format!("{}@{}", sup.rootfs, snapshot))
        ),
        opts.dry_run,
    )?;
    info!("created {}@{} on {}", sup.rootfs, snapshot, super_host);
    if !clean.is_empty() {
        mutate(
            super_host,
            &format!("ezjail-admin start {}", shell::escape(super_jail)),
            opts.dry_run,
        )?;
    }

    // Dump the incremental stream into a file the fan-out copies around.
    let dump = dump_path(name);
    let stream = shell::escape(&format!("{}@{}", sup.rootfs, snapshot));
    let anchor = shell::escape(&format!("@{}", base));
    let send = match &project.compress {
        Some(filter) => format!(
            "zfs send -I {} {} | {} > {}",
            anchor,
            stream,
            filter,
            shell::escape(&dump)
        ),
        None => format!(
            "zfs send -I {} {} > {}",
            anchor,
            stream,
            shell::escape(&dump)
        ),
    };
    mutate(super_host, &send, opts.dry_run)?;
    if !opts.dry_run {
        let size =
            remote::run_with_output(super_host, &format!("stat -f %z {}", shell::escape(&dump)))?;
        info!("dump {} on {} is {} bytes", dump, super_host, size.trim());
    }

    let rollout = Rollout {
        name,
        project,
        group,
        plan,
        base,
        dump,
        dry_run: opts.dry_run,
    };

    for ((member, target), doomed) in targets.iter().zip(&sweeps) {
        let member = *member;
        let spinner = ui::member_spinner(&format!("{}: deploying {}", name, member.id));
        deploy_member(&rollout, member, target, doomed, &spinner)?;
        spinner.finish_and_clear();
        ui::print_success(&format!("{} deployed", member.id));
    }

    // Leftover dump copies live only on pillar hosts now.
    for host in rollout.plan.pillar_hosts() {
        mutate(
            host,
            &format!("rm -f {}", shell::escape(&rollout.dump)),
            rollout.dry_run,
        )?;
    }

    Ok(())
}

fn deploy_member(
    rollout: &Rollout,
    member: &Member,
    target: &JailInfo,
    doomed: &[String],
    spinner: &ProgressBar,
) -> Result<()> {
    let (jail_name, host) = split_id(&member.id)?;

    // Fetch the dump from this member's pillar, unless it already sits
    // on this host. The copy runs on the pillar's side.
    let pillar = rollout.plan.pillar_for(&member.id);
    let (_, pillar_host) = split_id(pillar)?;
    if pillar_host != host {
        spinner.set_message(format!(
            "{}: copying dump {} -> {}",
            rollout.name, pillar_host, host
        ));
        mutate(
            pillar_host,
            &format!(
                "scp {} {}:{}",
                shell::escape(&rollout.dump),
                host,
                shell::escape(&rollout.dump)
            ),
            rollout.dry_run,
        )?;
    }

    if target.running {
        spinner.set_message(format!("{}: stopping {}", rollout.name, member.id));
        mutate(
            host,
            &format!("ezjail-admin stop {}", shell::escape(jail_name)),
            rollout.dry_run,
        )?;
    }

    spinner.set_message(format!(
        "{}: rolling {} back to {}",
        rollout.name, member.id, rollout.base
    ));
    mutate(
        host,
        &format!(
            "zfs rollback -r {}",
            shell::escape(&format!("{}@{}", target.rootfs, rollout.base))
        ),
        rollout.dry_run,
    )?;

    spinner.set_message(format!("{}: receiving delta on {}", rollout.name, member.id));
    let recv = match &rollout.project.decompress {
        Some(filter) => format!(
            "{} < {} | zfs recv {}",
            filter,
            shell::escape(&rollout.dump),
            shell::escape(&target.rootfs)
        ),
        None => format!(
            "zfs recv {} < {}",
            shell::escape(&target.rootfs),
            shell::escape(&rollout.dump)
        ),
    };
    mutate(host, &recv, rollout.dry_run)?;

    for path in member.copy_files(rollout.project) {
        mutate(
            host,
            &format!(
                "cp {} {}",
                shell::escape(path),
                shell::escape(&format!("{}{}", target.rootdir, path))
            ),
            rollout.dry_run,
        )?;
    }

    if let Some(meta_path) = member.meta_path(rollout.project) {
        spinner.set_message(format!("{}: writing meta file on {}", rollout.name, member.id));
        let content = meta::render(
            rollout.name,
            &rollout.group,
            rollout.project.info.as_deref(),
            jail_name,
            host,
            &meta::now_stamp(),
        );
        meta::install(host, &target.rootdir, meta_path, &content, rollout.dry_run)?;
    }

    if member.halt {
        info!("{} is marked halt, leaving it stopped", member.id);
    } else {
        spinner.set_message(format!("{}: starting {}", rollout.name, member.id));
        mutate(
            host,
            &format!("ezjail-admin start {}", shell::escape(jail_name)),
            rollout.dry_run,
        )?;
    }

    if !rollout.plan.is_pillar(member) {
        mutate(
            host,
            &format!("rm -f {}", shell::escape(&rollout.dump)),
            rollout.dry_run,
        )?;
    }

    for snapshot in doomed {
        debug!("sweeping {}@{} on {}", target.rootfs, snapshot, host);
        mutate(
            host,
            &format!(
                "zfs destroy {}",
                shell::escape(&format!("{}@{}", target.rootfs, snapshot))
            ),
            rollout.dry_run,
        )?;
    }

    Ok(())
}

/// Newest super snapshot present on every target; the anchor of the
/// incremental send.
fn select_base(sup: &JailInfo, targets: &[(&Member, JailInfo)]) -> Result<String> {
    sup.snapshots
        .iter()
        .find(|name| targets.iter().all(|(_, target)| target.has_snapshot(name)))
        .cloned()
        .ok_or_else(|| {
            anyhow!(
                "no common base: no snapshot of {} exists on every target",
                sup.rootfs
            )
        })
}

/// Dump files are namespaced by program, user, pid and project, so
/// unrelated runs never collide.
fn dump_path(project_name: &str) -> String {
    format!(
        "/tmp/{}.{}.{}.{}",
        PROG,
        remote::username(),
        std::process::id(),
        project_name
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn member(id: &str) -> Member {
        Member {
            id: id.to_string(),
            dc: String::new(),
            keep: None,
            copy: None,
            meta: None,
            halt: false,
        }
    }

    fn info(host: &str, snapshots: &[&str]) -> JailInfo {
        let snapshots: Vec<String> = snapshots.iter().map(|s| s.to_string()).collect();
        let snapshot_set: HashSet<String> = snapshots.iter().cloned().collect();
        JailInfo {
            host: host.to_string(),
            jail: "j".to_string(),
            rootdir: format!("/usr/jails/{}", host),
            rootfs: format!("tank/jails/{}", host),
            ip: "10.0.0.1".to_string(),
            hostname: format!("{}.example.net", host),
            snapshots,
            snapshot_set,
            running: true,
        }
    }

    #[test]
    fn base_is_the_newest_snapshot_shared_by_all() {
        let sup = info(
            "super",
            &[
                "jroll.2024-03-01.00:00:00",
                "jroll.2024-02-01.00:00:00",
                "jroll.2024-01-01.00:00:00",
            ],
        );
        let m1 = member("w1@n1");
        let m2 = member("w2@n2");
        let targets = vec![
            (
                &m1,
                info(
                    "n1",
                    &["jroll.2024-02-01.00:00:00", "jroll.2024-01-01.00:00:00"],
                ),
            ),
            (&m2, info("n2", &["jroll.2024-02-01.00:00:00"])),
        ];
        assert_eq!(
            select_base(&sup, &targets).unwrap(),
            "jroll.2024-02-01.00:00:00"
        );
    }

    #[test]
    fn disjoint_snapshot_histories_are_fatal() {
        let sup = info("super", &["jroll.2024-03-01.00:00:00"]);
        let m1 = member("w1@n1");
        let targets = vec![(&m1, info("n1", &["jroll.2024-02-01.00:00:00"]))];
        let err = select_base(&sup, &targets).unwrap_err();
        assert!(err.to_string().contains("no common base"));
    }

    #[test]
    fn sweep_flags_map_onto_modes() {
        let opts = |sweep, no_sweep| DeployOpts {
            group: None,
            dry_run: false,
            sweep,
            no_sweep,
        };
        assert_eq!(opts(false, false).sweep_mode(), SweepMode::Auto);
        assert_eq!(opts(true, false).sweep_mode(), SweepMode::Demand);
        assert_eq!(opts(false, true).sweep_mode(), SweepMode::Disabled);
    }

    #[test]
    fn dump_paths_carry_the_project_name() {
        let dump = dump_path("web");
        assert!(dump.starts_with("/tmp/jroll."));
        assert!(dump.ends_with(".web"));
        assert!(dump.contains(&std::process::id().to_string()));
    }
}
