use crate::allocation_store::AllocationErrorCode::*;
use crate::allocation_store::AllocationSnapshot;
use crate::resource::{ResourceId, Units};
use anyhow::{anyhow, Result};
use std::collections::{BTreeMap, BTreeSet};

pub(crate) fn first_unknown<'a, V>(
    known: &BTreeMap<ResourceId, V>,
    keys: impl IntoIterator<Item = &'a ResourceId>,
) -> Option<&'a ResourceId> {
    keys.into_iter().find(|rid| !known.contains_key(*rid))
}

pub(crate) fn ensure_known_resources<'a, V>(
    known: &BTreeMap<ResourceId, V>,
    keys: impl IntoIterator<Item = &'a ResourceId>,
) -> Result<()> {
    match first_unknown(known, keys) {
        Some(rid) => Err(anyhow!(UnknownResource(rid.clone()))),
        None => Ok(()),
    }
}

pub(crate) fn ensure_unique<'a>(
    ids: impl IntoIterator<Item = &'a String>,
    what: &str,
) -> Result<()> {
    let mut seen = BTreeSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(anyhow!(InvalidInput(format!("duplicate {} {}", what, id))));
        }
    }
    Ok(())
}

/// Every per-process vector must carry exactly the snapshot's resource keys.
pub(crate) fn ensure_snapshot_shape(snapshot: &AllocationSnapshot) -> Result<()> {
    for (rid, resource) in snapshot.resources.iter() {
        if &resource.id != rid {
            return Err(anyhow!(InvalidInput(format!(
                "resource keyed {} carries id {}",
                rid, resource.id
            ))));
        }
        if resource.available > resource.total {
            return Err(anyhow!(InvalidInput(format!(
                "resource {} has {} available of {} total",
                rid, resource.available, resource.total
            ))));
        }
    }
    for (pid, process) in snapshot.processes.iter() {
        if &process.id != pid {
            return Err(anyhow!(InvalidInput(format!(
                "process keyed {} carries id {}",
                pid, process.id
            ))));
        }
        let vectors = [
            ("allocation", process.allocation.keys().collect::<Vec<_>>()),
            ("request", process.request.keys().collect::<Vec<_>>()),
            ("max demand", process.max_demand.keys().collect::<Vec<_>>()),
        ];
        for (name, keys) in vectors.iter() {
            if let Some(rid) = first_unknown(&snapshot.resources, keys.iter().copied()) {
                return Err(anyhow!(InvalidInput(format!(
                    "{} of process {} names unknown resource {}",
                    name, pid, rid
                ))));
            }
            if keys.len() != snapshot.resources.len() {
                return Err(anyhow!(InvalidInput(format!(
                    "{} of process {} does not cover every resource",
                    name, pid
                ))));
            }
        }
    }
    Ok(())
}

/// `available + sum(allocation) == total` for every resource.
pub(crate) fn ensure_conservation(snapshot: &AllocationSnapshot) -> Result<()> {
    for (rid, resource) in snapshot.resources.iter() {
        let held: u64 = snapshot
            .processes
            .values()
            .map(|process| u64::from(process.allocation.get(rid)))
            .sum();
        let accounted = u64::from(resource.available) + held;
        if accounted != u64::from(resource.total) {
            return Err(anyhow!(CapacityInconsistency {
                rid: rid.clone(),
                detail: format!(
                    "{} available + {} held != {} total",
                    resource.available, held, resource.total
                ),
            }));
        }
    }
    Ok(())
}

pub(crate) fn sub_units(rid: &ResourceId, lhs: Units, rhs: Units) -> Result<Units> {
    lhs.checked_sub(rhs).ok_or_else(|| {
        anyhow!(CapacityInconsistency {
            rid: rid.clone(),
            detail: format!("{} - {} underflows", lhs, rhs),
        })
    })
}

pub(crate) fn add_units(rid: &ResourceId, lhs: Units, rhs: Units) -> Result<Units> {
    lhs.checked_add(rhs).ok_or_else(|| {
        anyhow!(CapacityInconsistency {
            rid: rid.clone(),
            detail: format!("{} + {} overflows", lhs, rhs),
        })
    })
}
