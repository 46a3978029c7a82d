//! Polymorphic asynchronous work units (spec.md §3.1 "Task", §4.6).
//! Grounded on `original_source/terrain/block_thread_manager.h`'s
//! `InputBlock`/`OutputBlock`/`Processor_T` trio, generalized from a
//! template-parameterized processor into a trait object so the scheduler
//! can hold a mix of task kinds in one queue.

pub mod mesh_block;

pub use mesh_block::MeshBlockTask;

use glam::IVec3;
use std::sync::Arc;

use crate::data::VoxelData;
use crate::generator::Generator;

/// Why a task produced no output (spec.md §4.6 "Cancellation"). Kept
/// separate from [`crate::error::EngineError`]: per spec, being dropped
/// is an expected outcome, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Cancelled,
    PriorityExceeded,
    DependencyInvalidated,
    VolumeDestroyed,
}

/// Result of [`Task::run`] / [`Task::resume`] (spec.md §4.6 "type tag
/// {MESHED, DROPPED}").
#[derive(Debug)]
pub enum TaskOutcome {
    Meshed(crate::meshing::MeshOutput),
    Dropped(DropReason),
    /// The task suspended itself (spec.md §5 "Suspension") and must be
    /// resumed later by the scheduler rather than treated as finished.
    Suspended,
}

/// Shared context every task needs to do its work, handed in by the
/// scheduler so tasks stay free of global state.
#[derive(Clone)]
pub struct TaskContext {
    pub data: Arc<VoxelData>,
    pub generator: Arc<dyn Generator>,
    pub drop_distance_sq: f32,
    pub viewer_position: IVec3,
}

/// A position-keyed, prioritizable, cancellable, resumable unit of work
/// (spec.md §3.1 "Task").
pub trait Task: Send {
    /// Lower runs first. Spec.md §4.8: `distance² from viewer to (position
    /// * 2^LOD)`, with coarser LODs sorting ahead of finer ones at equal
    /// distance. `viewer` is the last-known viewer position, passed in by
    /// the scheduler at sort time rather than baked into the task.
    fn priority(&self, viewer: IVec3) -> i64;

    fn is_cancelled(&self) -> bool;

    /// (LOD, position) identity used for scheduler dedup (spec.md §4.8).
    fn key(&self) -> (u32, IVec3);

    fn run(&mut self, ctx: &TaskContext) -> TaskOutcome;

    /// Continue a previously [`TaskOutcome::Suspended`] task.
    fn resume(&mut self, ctx: &TaskContext) -> TaskOutcome {
        self.run(ctx)
    }

    fn debug_name(&self) -> &str;
}

/// Plain squared distance from the viewer to `(position * 2^lod)`, used
/// for the `drop_distance` threshold test (spec.md §4.8).
pub fn distance_sq(position: IVec3, lod: u32, viewer_lod0_position: IVec3) -> f32 {
    let world_pos = position * (1i32 << lod);
    (world_pos - viewer_lod0_position).as_vec3().length_squared()
}

/// `priority = distance² from viewer to (position * 2^lod)`, with LOD
/// folded in so that, at equal position, higher LODs sort first (spec.md
/// §4.8).
pub fn distance_priority(position: IVec3, lod: u32, viewer_lod0_position: IVec3) -> i64 {
    let dist_sq = distance_sq(position, lod, viewer_lod0_position) as i64;
    // Higher LODs must win ties and, per spec, be considered generally
    // ahead of finer ones: fold `-lod` into the high bits so it dominates
    // the ordering, with distance² breaking ties within a LOD.
    (i64::from(u32::MAX - lod) << 40) | (dist_sq & 0xFF_FFFF_FFFF)
}
