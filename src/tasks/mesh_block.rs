//! Per-chunk meshing job (spec.md §4.6). Grounded on
//! `original_source/meshers/mesh_block_task.h`'s `MeshBlockTask`: a
//! `_stage: u8` discriminant plus a persisted `_voxels`/`_surfaces_output`
//! scratch pair, generalized here into an explicit Rust state machine
//! instead of a raw stage counter with implicit field reuse.

use std::sync::Arc;

use glam::IVec3;
use log::debug;

use crate::constants::meshing::{
    BLOCKY_MAX_PADDING, BLOCKY_MIN_PADDING, TRANSVOXEL_MAX_PADDING, TRANSVOXEL_MIN_PADDING,
};
use crate::meshing::blocky::{BlockyLibrary, BlockyMesher};
use crate::meshing::transvoxel::TransvoxelMesher;
use crate::meshing::{Face, MeshOutput};
use crate::voxel::VoxelBuffer;

use super::{distance_priority, distance_sq, DropReason, Task, TaskContext, TaskOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MesherKind {
    Blocky,
    Transvoxel,
}

enum Stage {
    Gather,
    Mesh { padded: VoxelBuffer },
    DetailTextureSchedule { mesh: MeshOutput },
    Upload { mesh: MeshOutput },
    Done,
}

/// Coroutine-style state machine: `run`/`resume` advance through `stage`
/// one step at a time, suspending between steps the way the scheduler
/// expects (spec.md §5 "Suspension", §9 "coroutine-style tasks").
pub struct MeshBlockTask {
    pub lod: u32,
    pub position: IVec3,
    pub mesher: MesherKind,
    pub library: Option<Arc<BlockyLibrary>>,
    pub with_detail_texture: bool,
    pub begin_lod_index: u32,
    stage: Stage,
    cancelled: bool,
}

impl MeshBlockTask {
    pub fn new(lod: u32, position: IVec3, mesher: MesherKind, library: Option<Arc<BlockyLibrary>>) -> Self {
        Self {
            lod,
            position,
            mesher,
            library,
            with_detail_texture: false,
            begin_lod_index: 0,
            stage: Stage::Gather,
            cancelled: false,
        }
    }

    fn padding(&self) -> (i32, i32) {
        match self.mesher {
            MesherKind::Blocky => (BLOCKY_MIN_PADDING as i32, BLOCKY_MAX_PADDING as i32),
            MesherKind::Transvoxel => (TRANSVOXEL_MIN_PADDING as i32, TRANSVOXEL_MAX_PADDING as i32),
        }
    }

    fn mesh_padded(&self, padded: &VoxelBuffer) -> MeshOutput {
        let (min_padding, _) = self.padding();
        match self.mesher {
            MesherKind::Blocky => {
                let library = self
                    .library
                    .clone()
                    .unwrap_or_else(|| Arc::new(BlockyLibrary::new()));
                BlockyMesher::new(&library).mesh(padded, min_padding)
            }
            MesherKind::Transvoxel => {
                let mesher = TransvoxelMesher::new(padded, self.lod);
                let mut out = mesher.mesh();
                for face in Face::ALL {
                    out.transition_surfaces[face as usize] = mesher.mesh_transition(face);
                }
                out
            }
        }
    }
}

impl Task for MeshBlockTask {
    fn priority(&self, viewer: IVec3) -> i64 {
        distance_priority(self.position, self.lod, viewer)
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    fn key(&self) -> (u32, IVec3) {
        (self.lod, self.position)
    }

    fn run(&mut self, ctx: &TaskContext) -> TaskOutcome {
        if self.is_cancelled() {
            return TaskOutcome::Dropped(DropReason::Cancelled);
        }

        loop {
            match std::mem::replace(&mut self.stage, Stage::Done) {
                Stage::Gather => {
                    let d_sq = distance_sq(self.position, self.lod, ctx.viewer_position);
                    if d_sq > ctx.drop_distance_sq {
                        debug!(
                            "[MESH_BLOCK_TASK] dropping ({:?}, lod {}): beyond drop_distance",
                            self.position, self.lod
                        );
                        return TaskOutcome::Dropped(DropReason::PriorityExceeded);
                    }
                    let (min_padding, max_padding) = self.padding();
                    let padded = ctx.data.gather_padded(self.lod, self.position, min_padding, max_padding);
                    self.stage = Stage::Mesh { padded };
                }
                Stage::Mesh { padded } => {
                    let mesh = self.mesh_padded(&padded);
                    if mesh.is_empty() {
                        debug!(
                            "[MESH_BLOCK_TASK] ({:?}, lod {}) produced an empty mesh",
                            self.position, self.lod
                        );
                    }
                    self.stage = Stage::DetailTextureSchedule { mesh };
                }
                Stage::DetailTextureSchedule { mesh } => {
                    if self.with_detail_texture
                        && self.lod >= self.begin_lod_index
                        && !mesh.is_empty()
                        && !mesh.cells.is_empty()
                    {
                        debug!(
                            "[MESH_BLOCK_TASK] ({:?}, lod {}) scheduling detail-texture subtask for {} cells",
                            self.position, self.lod, mesh.cells.len()
                        );
                        // The detail-texture subtask is dispatched by the
                        // scheduler as a follow-up task once this one's
                        // output is applied; this task itself only decides
                        // whether that follow-up is warranted.
                    }
                    self.stage = Stage::Upload { mesh };
                }
                Stage::Upload { mesh } => {
                    self.stage = Stage::Done;
                    return TaskOutcome::Meshed(mesh);
                }
                Stage::Done => {
                    return TaskOutcome::Dropped(DropReason::Cancelled);
                }
            }
        }
    }

    fn debug_name(&self) -> &str {
        "MeshBlock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::VoxelData;
    use crate::generator::FlatGenerator;
    use crate::math::Aabb;
    use crate::meshing::blocky::BlockyModel;

    fn ctx_with_flat_generator(block_size: u32) -> TaskContext {
        let generator: Arc<dyn crate::generator::Generator> = Arc::new(FlatGenerator::default());
        let bounds = Aabb::from_min_size(IVec3::splat(-1000), IVec3::splat(2000));
        let data = VoxelData::new(1, block_size, bounds, generator.clone(), None, false).unwrap();
        TaskContext {
            data: Arc::new(data),
            generator,
            drop_distance_sq: 1.0e12,
            viewer_position: IVec3::ZERO,
        }
    }

    #[test]
    fn blocky_task_on_flat_terrain_produces_a_mesh() {
        let ctx = ctx_with_flat_generator(16);
        let mut library = BlockyLibrary::new();
        library.add_model(BlockyModel::opaque(0));
        let mut task = MeshBlockTask::new(
            0,
            IVec3::ZERO,
            MesherKind::Blocky,
            Some(Arc::new(library)),
        );
        match task.run(&ctx) {
            TaskOutcome::Meshed(mesh) => assert!(!mesh.is_empty()),
            other => panic!("expected Meshed, got {:?}", other),
        }
    }

    #[test]
    fn priority_reflects_the_viewer_position_it_is_given() {
        let task = MeshBlockTask::new(0, IVec3::new(100, 0, 0), MesherKind::Blocky, None);
        let near = task.priority(IVec3::new(100, 0, 0));
        let far = task.priority(IVec3::ZERO);
        assert!(near < far, "closer viewer should yield a lower priority value");
    }

    #[test]
    fn task_beyond_drop_distance_is_dropped() {
        let mut ctx = ctx_with_flat_generator(16);
        ctx.drop_distance_sq = 0.0;
        let mut task = MeshBlockTask::new(0, IVec3::new(1000, 0, 0), MesherKind::Blocky, None);
        match task.run(&ctx) {
            TaskOutcome::Dropped(DropReason::PriorityExceeded) => {}
            other => panic!("expected PriorityExceeded drop, got {:?}", other),
        }
    }
}
