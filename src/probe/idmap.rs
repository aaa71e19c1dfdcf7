//! uid/gid allocation for unprivileged containers.

use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

use crate::config::IdmapConfig;
use crate::error::IdmapError;

/// One contiguous mapping of `range` ids starting at `ns_id` inside the container
/// onto `host_id` on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdmapEntry {
    pub is_uid: bool,
    pub is_gid: bool,
    pub host_id: u64,
    pub ns_id: u64,
    pub range: u64,
}

impl IdmapEntry {
    /// LXC config form, one line per id kind, e.g. `u 0 100000 65536`.
    pub fn to_lxc_strings(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if self.is_uid {
            lines.push(format!("u {} {} {}", self.ns_id, self.host_id, self.range));
        }
        if self.is_gid {
            lines.push(format!("g {} {} {}", self.ns_id, self.host_id, self.range));
        }
        lines
    }

    fn host_end(&self) -> u64 {
        self.host_id.saturating_add(self.range)
    }

    /// Whether the host range of this entry is fully mapped by `kernel`, i.e. usable
    /// from the namespace this daemon runs in.
    pub fn usable(&self, kernel: &IdmapSet) -> Result<(), IdmapError> {
        let covered = |want_uid: bool| {
            kernel.entries.iter().any(|k| {
                let kind = if want_uid { k.is_uid } else { k.is_gid };
                // Kernel maps are "ns host range": our host ids live in the kernel's ns column.
                kind && k.ns_id <= self.host_id
                    && self.host_end() <= k.ns_id.saturating_add(k.range)
            })
        };

        if (self.is_uid && !covered(true)) || (self.is_gid && !covered(false)) {
            return Err(IdmapError::Unusable {
                host_id: self.host_id,
                range: self.range,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IdmapSet {
    pub entries: Vec<IdmapEntry>,
}

impl IdmapSet {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_lxc_strings(&self) -> Vec<String> {
        self.entries
            .iter()
            .flat_map(IdmapEntry::to_lxc_strings)
            .collect()
    }

    /// Every entry must be usable for the set to be.
    pub fn usable(&self, kernel: &IdmapSet) -> Result<(), IdmapError> {
        self.entries.iter().try_for_each(|entry| entry.usable(kernel))
    }

    /// Allocation for `user` from subuid/subgid style files (`user:start:count`).
    ///
    /// Ranges are stacked from container id 0 upwards in file order.
    pub fn from_subid_files(
        user: &str,
        subuid: &Path,
        subgid: &Path,
    ) -> Result<Self, IdmapError> {
        let mut entries = Vec::new();
        for (path, is_uid) in [(subuid, true), (subgid, false)] {
            let mut ns_id: u64 = 0;
            for (host_id, range, line) in read_subid(path, user)? {
                entries.push(IdmapEntry {
                    is_uid,
                    is_gid: !is_uid,
                    host_id,
                    ns_id,
                    range,
                });
                ns_id = ns_id
                    .checked_add(range)
                    .filter(|end| *end <= MAX_ID_COUNT)
                    .ok_or_else(|| malformed(path, &line))?;
            }
        }
        Ok(Self { entries })
    }

    /// The map this process currently runs under, from `/proc/self/{uid,gid}_map`.
    pub fn from_kernel_maps(uid_map: &Path, gid_map: &Path) -> Result<Self, IdmapError> {
        let mut entries = Vec::new();
        for (path, is_uid) in [(uid_map, true), (gid_map, false)] {
            let content = read(path)?;
            for line in content.lines().filter(|l| !l.trim().is_empty()) {
                let fields: Vec<u64> = line
                    .split_whitespace()
                    .map(str::parse)
                    .collect::<Result<_, _>>()
                    .map_err(|_| malformed(path, line))?;
                let [ns_id, host_id, range] = fields[..] else {
                    return Err(malformed(path, line));
                };
                entries.push(IdmapEntry {
                    is_uid,
                    is_gid: !is_uid,
                    host_id,
                    ns_id,
                    range,
                });
            }
        }
        Ok(Self { entries })
    }
}

fn read(path: &Path) -> Result<String, IdmapError> {
    std::fs::read_to_string(path).map_err(|source| IdmapError::Read {
        path: path.display().to_string(),
        source,
    })
}

fn malformed(path: &Path, line: &str) -> IdmapError {
    IdmapError::Malformed {
        path: path.display().to_string(),
        line: line.to_string(),
    }
}

/// Ids are 32 bit; a range can't reach past `u32::MAX + 1`.
const MAX_ID_COUNT: u64 = u32::MAX as u64 + 1;

fn parse_id(field: &str, path: &Path, line: &str) -> Result<u64, IdmapError> {
    field
        .parse::<u32>()
        .map(u64::from)
        .map_err(|_| malformed(path, line))
}

/// `(start, count, line)` for every entry of `user`.
fn read_subid(path: &Path, user: &str) -> Result<Vec<(u64, u64, String)>, IdmapError> {
    let content = read(path)?;
    let mut ranges = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split(':');
        let (Some(name), Some(start), Some(count), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(malformed(path, line));
        };
        if name != user {
            continue;
        }
        let start = parse_id(start, path, line)?;
        let count = parse_id(count, path, line)?;
        if start + count > MAX_ID_COUNT {
            return Err(malformed(path, line));
        }
        ranges.push((start, count, line.to_string()));
    }
    Ok(ranges)
}

/// Probe the idmap for unprivileged containers.
///
/// Never fails: a missing, empty or unusable allocation is logged and yields `None`,
/// meaning only privileged containers can run.
pub fn get_idmap_set(config: &IdmapConfig) -> Option<IdmapSet> {
    let idmap = match IdmapSet::from_subid_files(
        &config.user,
        &config.subuid_path,
        &config.subgid_path,
    ) {
        Ok(idmap) => idmap,
        Err(e) => {
            warn!(err = %e, "Error reading default uid/gid map");
            warn!("Only privileged containers will be able to run");
            return None;
        }
    };

    let kernel = IdmapSet::from_kernel_maps(&config.kernel_uid_map, &config.kernel_gid_map);
    if let Ok(kernel) = &kernel {
        info!("Kernel uid/gid map:");
        for line in kernel.to_lxc_strings() {
            info!(" - {}", line);
        }
    }

    if idmap.is_empty() {
        warn!("No available uid/gid map could be found");
        warn!("Only privileged containers will be able to run");
        return None;
    }

    info!("Configured uid/gid map:");
    for entry in &idmap.entries {
        let suffix = match &kernel {
            Ok(kernel) if entry.usable(kernel).is_ok() => "",
            _ => " (unusable)",
        };
        for line in entry.to_lxc_strings() {
            info!(" - {}{}", line, suffix);
        }
    }

    let usable = kernel.and_then(|kernel| idmap.usable(&kernel));
    if let Err(e) = usable {
        warn!(err = %e, "One or more uid/gid map entry isn't usable (typically due to nesting)");
        warn!("Only privileged containers will be able to run");
        return None;
    }

    Some(idmap)
}
