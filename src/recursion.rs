//! # Recursion Engine
//!
//! Walks a record tree along its JoinSpec and fires up to six hooks at fixed
//! points. Validation, writing and deleting are all expressed as hook sets
//! over this one traversal.
//!
//! ## Firing Order
//!
//! For one list of sibling records at one tree level:
//!
//! ```text
//! BreadthFirstData(list)
//! for record in list:
//!     BreadthFirstRecord(record)
//!     for child spec with a group in record:
//!         BreadthFirstParentEdge(record, child)
//!         record[child] = recurse(record[child], child)
//!         DepthFirstParentEdge(record, child)
//!     DepthFirstRecord(record)
//! DepthFirstData(list)
//! ```
//!
//! The order is load-bearing. A write pass inserts a child list in its
//! `DepthFirstData` hook, and the parent's `DepthFirstParentEdge` hook then
//! reads the keys the insert produced.
//!
//! ## Rust Pattern: Return and Replace
//!
//! The child list is taken out of the parent record, passed to the recursive
//! call by value and the returned list is put back. No reference into the
//! parent is held while child hooks run, so hooks get plain `&mut` access and
//! every mutation made below is visible to the hooks above.
//!
//! ## Rust Pattern: Explicit Context
//!
//! Hooks are plain `fn` pointers taking `&mut C`. Anything a pass needs (a
//! SQL handle, an allocator, collected failures) lives in the context value
//! owned by the caller, not in captured state.

use crate::error::Result;
use crate::join::JoinSpec;
use crate::types::Record;

/// The six points at which a hook can fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    BreadthFirstData,
    BreadthFirstRecord,
    BreadthFirstParentEdge,
    DepthFirstParentEdge,
    DepthFirstRecord,
    DepthFirstData,
}

/// Hook over a list of sibling records.
pub type DataHook<C> = fn(&mut C, &mut Vec<Record>, &JoinSpec) -> Result<()>;

/// Hook over one record.
///
/// Edge hooks receive the parent record and the child's JoinSpec.
pub type RecordHook<C> = fn(&mut C, &mut Record, &JoinSpec) -> Result<()>;

/// Optional hooks, one slot per [`Phase`]. An empty slot is a no-op.
pub struct CallbackSet<C> {
    /// Fires on a sibling list before any of its records.
    pub breadth_first_data: Option<DataHook<C>>,
    /// Fires on a record before its children are visited.
    pub breadth_first_record: Option<RecordHook<C>>,
    /// Fires on a parent before one child group is visited.
    pub breadth_first_parent_edge: Option<RecordHook<C>>,
    /// Fires on a parent after one child group has been visited.
    pub depth_first_parent_edge: Option<RecordHook<C>>,
    /// Fires on a record after all its children.
    pub depth_first_record: Option<RecordHook<C>>,
    /// Fires on a sibling list after all of its records.
    pub depth_first_data: Option<DataHook<C>>,
}

impl<C> Default for CallbackSet<C> {
    fn default() -> Self {
        Self {
            breadth_first_data: None,
            breadth_first_record: None,
            breadth_first_parent_edge: None,
            depth_first_parent_edge: None,
            depth_first_record: None,
            depth_first_data: None,
        }
    }
}

impl<C> CallbackSet<C> {
    /// An empty set; every phase is a no-op.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a list hook for `BreadthFirstData` or `DepthFirstData`.
    ///
    /// Other phases take record hooks; passing one of them here is ignored
    /// and logged.
    pub fn on_data(mut self, phase: Phase, hook: DataHook<C>) -> Self {
        match phase {
            Phase::BreadthFirstData => self.breadth_first_data = Some(hook),
            Phase::DepthFirstData => self.depth_first_data = Some(hook),
            other => tracing::warn!(phase = ?other, "not a data phase, hook ignored"),
        }
        self
    }

    /// Sets a record or edge hook for any of the four remaining phases.
    pub fn on_record(mut self, phase: Phase, hook: RecordHook<C>) -> Self {
        match phase {
            Phase::BreadthFirstRecord => self.breadth_first_record = Some(hook),
            Phase::BreadthFirstParentEdge => self.breadth_first_parent_edge = Some(hook),
            Phase::DepthFirstParentEdge => self.depth_first_parent_edge = Some(hook),
            Phase::DepthFirstRecord => self.depth_first_record = Some(hook),
            other => tracing::warn!(phase = ?other, "not a record phase, hook ignored"),
        }
        self
    }

    /// True if a hook is set for `phase`.
    pub fn has(&self, phase: Phase) -> bool {
        match phase {
            Phase::BreadthFirstData => self.breadth_first_data.is_some(),
            Phase::BreadthFirstRecord => self.breadth_first_record.is_some(),
            Phase::BreadthFirstParentEdge => self.breadth_first_parent_edge.is_some(),
            Phase::DepthFirstParentEdge => self.depth_first_parent_edge.is_some(),
            Phase::DepthFirstRecord => self.depth_first_record.is_some(),
            Phase::DepthFirstData => self.depth_first_data.is_some(),
        }
    }
}

/// Runs `callbacks` over `data`, a list of records shaped by `spec`.
///
/// Returns the list with every hook's mutations applied. The first hook
/// error aborts the walk and is returned unchanged.
pub fn recurse<C>(
    callbacks: &CallbackSet<C>,
    ctx: &mut C,
    mut data: Vec<Record>,
    spec: &JoinSpec,
) -> Result<Vec<Record>> {
    if let Some(hook) = callbacks.breadth_first_data {
        hook(ctx, &mut data, spec)?;
    }

    for record in data.iter_mut() {
        if let Some(hook) = callbacks.breadth_first_record {
            hook(ctx, record, spec)?;
        }

        for child in spec.children() {
            if record.joint(child.nest_key()).is_none() {
                continue;
            }

            if let Some(hook) = callbacks.breadth_first_parent_edge {
                hook(ctx, record, child)?;
            }

            if let Some(list) = record.take_joint(child.nest_key()) {
                let list = recurse(callbacks, ctx, list, child)?;
                record.set_joint(child.nest_key(), list);
            }

            if let Some(hook) = callbacks.depth_first_parent_edge {
                hook(ctx, record, child)?;
            }
        }

        if let Some(hook) = callbacks.depth_first_record {
            hook(ctx, record, spec)?;
        }
    }

    if let Some(hook) = callbacks.depth_first_data {
        hook(ctx, &mut data, spec)?;
    }

    Ok(data)
}

// =============================================================================
// Tests
// =============================================================================
