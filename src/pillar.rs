use std::collections::BTreeMap;

use crate::config::{Member, Project};

/// Transfer bookkeeping for one data center.
#[derive(Debug)]
struct DcEntry {
    /// Instance whose host serves the dump to the rest of the DC
    pillar: String,
    /// Members pulling their copy from this DC's pillar
    consumers: u32,
}

/// Assigns every member the instance it copies the dump from, so that
/// each data center pulls the dump across the WAN at most once.
///
/// The first member seen in a DC pulls from the super and becomes that
/// DC's pillar; later members of the same DC pull from it locally.
#[derive(Debug)]
pub struct TransferPlan {
    super_id: String,
    dcs: BTreeMap<String, DcEntry>,
    pillar_of: BTreeMap<String, String>,
}

impl TransferPlan {
    pub fn build(project: &Project, members: &[Member]) -> Self {
        let mut dcs = BTreeMap::new();
        dcs.insert(
            project.dc.clone(),
            DcEntry {
                pillar: project.super_id.clone(),
                consumers: 0,
            },
        );
        let mut pillar_of = BTreeMap::new();

        for member in members {
            match dcs.get_mut(&member.dc) {
                Some(entry) => {
                    pillar_of.insert(member.id.clone(), entry.pillar.clone());
                    entry.consumers += 1;
                }
                None => {
                    pillar_of.insert(member.id.clone(), project.super_id.clone());
                    if let Some(origin) = dcs.get_mut(&project.dc) {
                        origin.consumers += 1;
                    }
                    dcs.insert(
                        member.dc.clone(),
                        DcEntry {
                            pillar: member.id.clone(),
                            consumers: 0,
                        },
                    );
                }
            }
        }

        TransferPlan {
            super_id: project.super_id.clone(),
            dcs,
            pillar_of,
        }
    }

    /// Instance this member copies the dump from.
    pub fn pillar_for(&self, member_id: &str) -> &str {
        self.pillar_of
            .get(member_id)
            .map(String::as_str)
            .unwrap_or(&self.super_id)
    }

    /// Whether this member serves the dump to the rest of its DC, and
    /// therefore keeps its copy until the final reap.
    pub fn is_pillar(&self, member: &Member) -> bool {
        self.dcs
            .get(&member.dc)
            .is_some_and(|entry| entry.pillar == member.id)
    }

    /// Hosts still holding a dump copy once every member is deployed.
    pub fn pillar_hosts(&self) -> Vec<&str> {
        let mut hosts: Vec<&str> = self
            .dcs
            .values()
            .filter_map(|entry| entry.pillar.split_once('@').map(|(_, host)| host))
            .collect();
        hosts.sort_unstable();
        hosts.dedup();
        hosts
    }

    /// `(dc, pillar, consumers)` rows for diagnostics, in dc order.
    pub fn describe(&self) -> impl Iterator<Item = (&str, &str, u32)> {
        self.dcs
            .iter()
            .map(|(dc, entry)| (dc.as_str(), entry.pillar.as_str(), entry.consumers))
    }
}
