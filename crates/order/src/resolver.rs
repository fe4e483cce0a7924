//! Dependency tracking between merged cells
//!
//! A merged cell may only enter the commit buffer once every cell its final
//! clock names has entered it. The backward walk registers the cell on each
//! unscheduled predecessor and stops at the first scheduled (or pruned) one:
//! scheduling is prefix-closed per chain, so everything below it is settled.
//! Edges are released when a predecessor is scheduled, not when it merges.

use crate::error::InvariantViolation;
use crate::store::VectorClockStore;
use crate::types::{CellId, NO_BLOCK};
use crate::vector_clock::VectorClock;

/// Register `id` on each unscheduled predecessor named by `clock` and set its
/// dependency count. Returns the count.
pub(crate) fn register_dependencies(
    store: &mut VectorClockStore,
    id: CellId,
    clock: &VectorClock,
) -> Result<u32, InvariantViolation> {
    let mut depends = 0u32;
    for (chain_id, upto) in clock.iter() {
        if upto == NO_BLOCK {
            continue;
        }
        let floor = store
            .chain(chain_id)
            .map(|c| c.pruned_through())
            .ok_or_else(|| InvariantViolation::new(id, format!("clock names untracked chain {}", chain_id)))?;

        let mut block = upto;
        while block > floor {
            let pred_id = CellId::new(chain_id, block);
            let pred = store
                .get_or_create(pred_id)
                .map_err(|e| InvariantViolation::new(id, format!("predecessor {}: {}", pred_id, e)))?;
            if pred.is_scheduled() {
                break;
            }
            pred.depended.insert(id);
            depends += 1;
            block -= 1;
        }
    }

    let cell = store
        .cell_mut(id)
        .ok_or_else(|| InvariantViolation::new(id, "resolving a missing cell"))?;
    cell.depends_count = depends;
    if depends > 0 {
        tracing::debug!("Cell {} waits on {} predecessors", id, depends);
    }
    Ok(depends)
}

/// Flush the reverse edges of a freshly scheduled cell. Returns the dependents
/// that became ready to schedule, in ascending id order.
pub(crate) fn release_dependents(
    store: &mut VectorClockStore,
    id: CellId,
) -> Result<Vec<CellId>, InvariantViolation> {
    let dependents = match store.cell_mut(id) {
        Some(cell) => std::mem::take(&mut cell.depended),
        None => return Err(InvariantViolation::new(id, "releasing a missing cell")),
    };

    let mut ready = Vec::new();
    for dep_id in dependents {
        let dep = store
            .cell_mut(dep_id)
            .ok_or_else(|| InvariantViolation::new(dep_id, format!("dependent of {} missing", id)))?;
        dep.depends_count = dep
            .depends_count
            .checked_sub(1)
            .ok_or_else(|| InvariantViolation::new(dep_id, "dependency count underflow"))?;
        if dep.ready_to_schedule() {
            ready.push(dep_id);
        }
    }
    Ok(ready)
}
