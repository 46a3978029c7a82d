//! Priority task scheduler (spec.md §4.8). Grounded on
//! `original_source/terrain/block_thread_manager.h`'s
//! `VoxelBlockThreadManager`: per-job input/output mutex pair, a
//! position-indexed dedup table, a sync interval at which shared input is
//! drained into a local, sorted queue, and round-robin dispatch among the
//! least-loaded jobs. Uses `parking_lot::{Mutex, Condvar}` for the
//! wait/wake instead of the original's raw semaphore, and
//! `crossbeam_channel` for the output side per this crate's ambient
//! concurrency stack.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use glam::IVec3;
use log::{debug, info};
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;

use crate::constants::scheduler::{DEFAULT_DROP_DISTANCE, SYNC_INTERVAL};
use crate::tasks::{Task, TaskContext, TaskOutcome};

/// Result of a finished (or dropped) task, tagged with its dedup key so
/// callers can route it back to the right volume/block.
pub struct TaskResult {
    pub key: (u32, IVec3),
    pub outcome: TaskOutcome,
}

struct SharedInput {
    tasks: Vec<Box<dyn Task>>,
    /// (lod, position) -> index into `tasks`, for O(1) duplicate rejection
    /// (spec.md §4.8 "never queue twice; duplicates replace").
    dedup: FxHashMap<(u32, IVec3), usize>,
    needs_sort: bool,
}

impl SharedInput {
    fn new() -> Self {
        Self {
            tasks: Vec::new(),
            dedup: FxHashMap::default(),
            needs_sort: false,
        }
    }

    fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Insert or replace a task by its dedup key, returning `true` if an
    /// existing queued task was replaced.
    fn push(&mut self, task: Box<dyn Task>) -> bool {
        let key = task.key();
        if let Some(&idx) = self.dedup.get(&key) {
            self.tasks[idx] = task;
            true
        } else {
            let idx = self.tasks.len();
            self.dedup.insert(key, idx);
            self.tasks.push(task);
            false
        }
    }
}

struct Job {
    shared_input: Mutex<SharedInput>,
    condvar: Condvar,
    exit: AtomicBool,
}

/// Priority queue + per-thread worker pool + cancellation + GPU dispatch
/// pipeline (spec.md §4.8, §3.1 `TaskScheduler`).
pub struct TaskScheduler {
    jobs: Vec<Arc<Job>>,
    workers: Vec<JoinHandle<()>>,
    output_rx: crossbeam_channel::Receiver<TaskResult>,
    viewer_position: Arc<Mutex<IVec3>>,
    drop_distance_sq: f32,
    next_dispatch: AtomicUsize,
}

impl TaskScheduler {
    /// Spawns `worker_count` threads, each running the sync/process loop
    /// against its own job queue. `ctx` is cloned per sync tick so workers
    /// always see the latest viewer position without holding a lock while
    /// running a task (spec.md §5 "Workers never call back into the main
    /// thread while holding any lock").
    pub fn new(worker_count: usize, ctx: TaskContext) -> Self {
        let worker_count = worker_count.max(1);
        let (tx, rx) = crossbeam_channel::unbounded();
        let viewer_position = Arc::new(Mutex::new(ctx.viewer_position));

        let mut jobs = Vec::with_capacity(worker_count);
        let mut workers = Vec::with_capacity(worker_count);
        for job_index in 0..worker_count {
            let job = Arc::new(Job {
                shared_input: Mutex::new(SharedInput::new()),
                condvar: Condvar::new(),
                exit: AtomicBool::new(false),
            });
            jobs.push(job.clone());

            let tx = tx.clone();
            let viewer_position = viewer_position.clone();
            let mut worker_ctx = ctx.clone();
            workers.push(
                std::thread::Builder::new()
                    .name(format!("voxel-worker-{job_index}"))
                    .spawn(move || worker_loop(job, tx, viewer_position, &mut worker_ctx))
                    .expect("failed to spawn voxel worker thread"),
            );
        }

        info!("[SCHEDULER] started {} worker threads", worker_count);

        Self {
            jobs,
            workers,
            output_rx: rx,
            viewer_position,
            drop_distance_sq: DEFAULT_DROP_DISTANCE * DEFAULT_DROP_DISTANCE,
            next_dispatch: AtomicUsize::new(0),
        }
    }

    pub fn set_viewer_position(&self, pos: IVec3) {
        *self.viewer_position.lock() = pos;
    }

    pub fn set_drop_distance(&mut self, drop_distance: f32) {
        self.drop_distance_sq = drop_distance * drop_distance;
    }

    /// Push a batch of tasks, dispatching to whichever job currently has
    /// the fewest pending tasks (spec.md §4.8 "lowest-loaded job... ties
    /// in round-robin").
    pub fn push(&self, tasks: Vec<Box<dyn Task>>) {
        if tasks.is_empty() {
            return;
        }
        let loads: Vec<usize> = self.jobs.iter().map(|j| j.shared_input.lock().len()).collect();
        let min_load = *loads.iter().min().unwrap();

        let mut replaced = 0usize;
        let mut woken = vec![false; self.jobs.len()];
        for task in tasks {
            let candidates: Vec<usize> = loads
                .iter()
                .enumerate()
                .filter(|&(_, &l)| l == min_load)
                .map(|(i, _)| i)
                .collect();
            let pick = candidates[self.next_dispatch.fetch_add(1, Ordering::Relaxed) % candidates.len()];

            let mut input = self.jobs[pick].shared_input.lock();
            if input.push(task) {
                replaced += 1;
            }
            input.needs_sort = true;
            woken[pick] = true;
        }

        for (idx, job) in self.jobs.iter().enumerate() {
            if woken[idx] {
                job.condvar.notify_one();
            }
        }

        if replaced > 0 {
            debug!("[SCHEDULER] {} queued tasks were replaced by duplicates", replaced);
        }
    }

    /// Drain every task result produced so far, without blocking.
    pub fn pop_all(&self) -> Vec<TaskResult> {
        self.output_rx.try_iter().collect()
    }

    pub fn shutdown(mut self) {
        for job in &self.jobs {
            job.exit.store(true, Ordering::SeqCst);
            job.condvar.notify_all();
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(
    job: Arc<Job>,
    output: crossbeam_channel::Sender<TaskResult>,
    viewer_position: Arc<Mutex<IVec3>>,
    ctx: &mut TaskContext,
) {
    let mut local: VecDeque<Box<dyn Task>> = VecDeque::new();
    let mut next_sync = Instant::now() + SYNC_INTERVAL;

    loop {
        if job.exit.load(Ordering::SeqCst) {
            return;
        }

        sync_from_shared(&job, &mut local, &viewer_position, ctx);

        while let Some(mut task) = local.pop_front() {
            if job.exit.load(Ordering::SeqCst) {
                return;
            }
            let key = task.key();
            let outcome = if task.is_cancelled() {
                TaskOutcome::Dropped(crate::tasks::DropReason::Cancelled)
            } else {
                task.run(ctx)
            };
            if matches!(outcome, TaskOutcome::Suspended) {
                // Real suspension (GPU fence wait) would park this task on
                // a pending list keyed by its dependency; this engine's
                // CPU-only task set never returns Suspended today.
                continue;
            }
            let _ = output.send(TaskResult { key, outcome });

            if Instant::now() >= next_sync {
                sync_from_shared(&job, &mut local, &viewer_position, ctx);
                next_sync = Instant::now() + SYNC_INTERVAL;
            }
        }

        if job.exit.load(Ordering::SeqCst) {
            return;
        }

        let mut input = job.shared_input.lock();
        if input.tasks.is_empty() && local.is_empty() {
            job.condvar.wait_for(&mut input, SYNC_INTERVAL);
        }
    }
}

fn sync_from_shared(
    job: &Job,
    local: &mut VecDeque<Box<dyn Task>>,
    viewer_position: &Arc<Mutex<IVec3>>,
    ctx: &mut TaskContext,
) {
    ctx.viewer_position = *viewer_position.lock();

    let mut drained = {
        let mut input = job.shared_input.lock();
        let drained: Vec<Box<dyn Task>> = input.tasks.drain(..).collect();
        input.dedup.clear();
        input.needs_sort = false;
        drained
    };

    local.extend(drained.drain(..));

    let viewer = ctx.viewer_position;
    let mut ordered: Vec<Box<dyn Task>> = local.drain(..).collect();
    ordered.sort_by_key(|t| t.priority(viewer));
    local.extend(ordered);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::VoxelData;
    use crate::generator::FlatGenerator;
    use crate::math::Aabb;
    use crate::meshing::blocky::BlockyLibrary;
    use crate::tasks::mesh_block::{MesherKind, MeshBlockTask};

    fn test_ctx() -> TaskContext {
        let generator: Arc<dyn crate::generator::Generator> = Arc::new(FlatGenerator::default());
        let bounds = Aabb::from_min_size(IVec3::splat(-1000), IVec3::splat(2000));
        let data = VoxelData::new(1, 16, bounds, generator.clone(), None, false).unwrap();
        TaskContext {
            data: Arc::new(data),
            generator,
            drop_distance_sq: 1.0e12,
            viewer_position: IVec3::ZERO,
        }
    }

    #[test]
    fn duplicate_key_replaces_queued_task_instead_of_queueing_twice() {
        let scheduler = TaskScheduler::new(1, test_ctx());
        let library = Arc::new(BlockyLibrary::new());
        let t1 = Box::new(MeshBlockTask::new(0, IVec3::ZERO, MesherKind::Blocky, Some(library.clone())));
        let t2 = Box::new(MeshBlockTask::new(0, IVec3::ZERO, MesherKind::Blocky, Some(library)));
        scheduler.push(vec![t1]);
        scheduler.push(vec![t2]);
        assert_eq!(scheduler.jobs[0].shared_input.lock().len(), 1);
        scheduler.shutdown();
    }

    #[test]
    fn pushed_task_eventually_produces_a_result() {
        let scheduler = TaskScheduler::new(1, test_ctx());
        let library = Arc::new(BlockyLibrary::new());
        let task = Box::new(MeshBlockTask::new(0, IVec3::ZERO, MesherKind::Blocky, Some(library)));
        scheduler.push(vec![task]);

        let mut results = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(2);
        while results.is_empty() && Instant::now() < deadline {
            results.extend(scheduler.pop_all());
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(results.len(), 1);
        scheduler.shutdown();
    }
}
