//! Process-wide volume registry (spec.md §6.4, §9 "Global state"):
//! "Initialize once at engine boot; teardown requires joining worker
//! threads... before tearing down the rendering device." Grounded on the
//! registry pattern the scheduler and task machinery already assume (a
//! `VolumeId` is the only thing a `Task` carries back to its owner), kept
//! as a single process-wide table the way this crate's other singletons
//! (the scheduler, the GPU buffer pool) are owned once and shared by
//! reference rather than passed explicitly through every call site.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::meshing::MeshOutput;

/// Opaque handle a caller holds onto a registered volume (spec.md §6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VolumeId(u64);

/// `{data, mesh_output_callback, detail_texture_output_callback}` (spec.md
/// §6.4). Callbacks receive their payload by move and may upload GPU
/// resources, attach collision shapes, or simply drop it.
pub struct VolumeCallbacks {
    pub mesh_output: Box<dyn FnMut(MeshOutput) + Send>,
    pub detail_texture_output: Box<dyn FnMut(crate::detail_texture::Tile) + Send>,
}

fn registry() -> &'static RwLock<FxHashMap<VolumeId, VolumeCallbacks>> {
    static REGISTRY: OnceLock<RwLock<FxHashMap<VolumeId, VolumeCallbacks>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(FxHashMap::default()))
}

fn next_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// Registers a volume's callbacks and returns the handle future task
/// results will be routed through.
pub fn register_volume(callbacks: VolumeCallbacks) -> VolumeId {
    let id = VolumeId(next_id());
    registry().write().insert(id, callbacks);
    id
}

/// Drops a volume's callbacks. Safe to call even if tasks for this volume
/// are still in flight: those results are simply silently discarded when
/// they arrive (spec.md §5 "the volume has been destroyed" cancellation
/// trigger covers the in-flight case; this covers the already-completed
/// one).
pub fn unregister_volume(id: VolumeId) {
    registry().write().remove(&id);
}

pub fn dispatch_mesh_output(id: VolumeId, output: MeshOutput) {
    if let Some(callbacks) = registry().write().get_mut(&id) {
        (callbacks.mesh_output)(output);
    }
}

pub fn dispatch_detail_texture_output(id: VolumeId, tile: crate::detail_texture::Tile) {
    if let Some(callbacks) = registry().write().get_mut(&id) {
        (callbacks.detail_texture_output)(tile);
    }
}

pub fn is_registered(id: VolumeId) -> bool {
    registry().read().contains_key(&id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn registering_then_unregistering_drops_the_entry() {
        let id = register_volume(VolumeCallbacks {
            mesh_output: Box::new(|_| {}),
            detail_texture_output: Box::new(|_| {}),
        });
        assert!(is_registered(id));
        unregister_volume(id);
        assert!(!is_registered(id));
    }

    #[test]
    fn dispatch_invokes_the_registered_callback_exactly_once() {
        let calls = Arc::new(Mutex::new(0u32));
        let calls_clone = calls.clone();
        let id = register_volume(VolumeCallbacks {
            mesh_output: Box::new(move |_| {
                *calls_clone.lock().unwrap() += 1;
            }),
            detail_texture_output: Box::new(|_| {}),
        });
        dispatch_mesh_output(id, MeshOutput::default());
        assert_eq!(*calls.lock().unwrap(), 1);
        unregister_volume(id);
    }

    #[test]
    fn dispatch_to_an_unregistered_volume_is_a_silent_no_op() {
        let id = VolumeId(u64::MAX);
        dispatch_mesh_output(id, MeshOutput::default());
    }
}
