//! Asynchronous meshing pipeline: builds patch meshes on a thread pool and
//! delivers them over a channel drained once per tick.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::Instant;

use tellus_cubesphere::{Patch, PatchId};
use tellus_terrain::{HeightmapSource, PatchHeightmap, SourceError};

use crate::{MeshParams, PatchMesh, build_mesh};

/// A build request. Without a heightmap the worker loads one from the
/// pipeline's [`HeightmapSource`]; the patch geometry is re-derived from
/// the id either way.
#[derive(Clone, Debug)]
pub struct MeshTask {
    pub patch_id: PatchId,
    pub heightmap: Option<PatchHeightmap>,
    /// Caller-chosen tag echoed back in the [`MeshingResult`].
    pub ticket: u64,
}

impl MeshTask {
    pub fn new(patch_id: PatchId) -> Self {
        Self {
            patch_id,
            heightmap: None,
            ticket: 0,
        }
    }

    pub fn with_heightmap(patch_id: PatchId, heightmap: PatchHeightmap) -> Self {
        Self {
            patch_id,
            heightmap: Some(heightmap),
            ticket: 0,
        }
    }

    #[must_use]
    pub fn with_ticket(mut self, ticket: u64) -> Self {
        self.ticket = ticket;
        self
    }
}

/// A finished mesh together with the heightmap it was built from.
#[derive(Clone, Debug)]
pub struct BuiltPatch {
    pub mesh: PatchMesh,
    pub heightmap: PatchHeightmap,
}

/// The result of a completed task.
#[derive(Debug)]
pub struct MeshingResult {
    pub patch_id: PatchId,
    pub ticket: u64,
    pub outcome: Result<BuiltPatch, SourceError>,
    /// Wall time spent loading and meshing, in microseconds.
    pub build_time_us: u64,
}

/// Mesh building backed by a thread pool.
///
/// The main thread [`submit`](Self::submit)s tasks and collects results via
/// [`drain_results`](Self::drain_results). Inputs and outputs move across
/// the channel by value; workers share only the heightmap source.
pub struct MeshingPipeline {
    task_sender: Option<crossbeam_channel::Sender<MeshTask>>,
    result_receiver: crossbeam_channel::Receiver<MeshingResult>,
    worker_handles: Vec<JoinHandle<()>>,
    /// Maximum number of tasks queued or executing.
    budget: usize,
    in_flight: Arc<AtomicUsize>,
}

impl MeshingPipeline {
    /// Spawn `worker_count` workers accepting at most `budget` tasks at once.
    pub fn new(
        worker_count: usize,
        budget: usize,
        source: Arc<dyn HeightmapSource>,
        params: MeshParams,
    ) -> std::io::Result<Self> {
        let budget = budget.max(1);
        let (task_tx, task_rx) = crossbeam_channel::bounded::<MeshTask>(budget);
        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let params = Arc::new(params);

        let mut handles = Vec::with_capacity(worker_count.max(1));
        for n in 0..worker_count.max(1) {
            let rx = task_rx.clone();
            let tx = result_tx.clone();
            let source = Arc::clone(&source);
            let params = Arc::clone(&params);
            let flight = Arc::clone(&in_flight);

            let handle = std::thread::Builder::new()
                .name(format!("patch-mesh-{n}"))
                .spawn(move || {
                    while let Ok(task) = rx.recv() {
                        let result = run_task(task, source.as_ref(), &params);
                        // Decrement first so a drained result is never still counted.
                        flight.fetch_sub(1, Ordering::AcqRel);
                        if tx.send(result).is_err() {
                            break;
                        }
                    }
                })?;
            handles.push(handle);
        }

        Ok(Self {
            task_sender: Some(task_tx),
            result_receiver: result_rx,
            worker_handles: handles,
            budget,
            in_flight,
        })
    }

    /// Worker count for a machine, leaving headroom for the main thread.
    pub fn default_worker_count() -> usize {
        num_cpus::get().saturating_sub(1).clamp(1, 8)
    }

    /// Submit a task. Returns `false` if the budget is exhausted or the
    /// pipeline has been shut down.
    pub fn submit(&self, task: MeshTask) -> bool {
        let Some(sender) = &self.task_sender else {
            return false;
        };
        if self.in_flight.load(Ordering::Acquire) >= self.budget {
            return false;
        }
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        if sender.try_send(task).is_err() {
            self.in_flight.fetch_sub(1, Ordering::AcqRel);
            return false;
        }
        true
    }

    /// Drain all completed results. Called once per tick on the main thread.
    pub fn drain_results(&self) -> Vec<MeshingResult> {
        self.result_receiver.try_iter().collect()
    }

    /// Number of tasks queued or executing.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Stop accepting work and join the workers once queued tasks finish.
    pub fn shutdown(&mut self) {
        self.task_sender.take();
        for handle in self.worker_handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for MeshingPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_task(task: MeshTask, source: &dyn HeightmapSource, params: &MeshParams) -> MeshingResult {
    let start = Instant::now();
    let MeshTask {
        patch_id,
        heightmap,
        ticket,
    } = task;

    let heightmap = match heightmap {
        Some(hm) => Ok(hm),
        None => source.load(&patch_id),
    };
    let outcome = heightmap.map(|heightmap| {
        let mesh = build_mesh(&Patch::from_id(&patch_id), &heightmap, params);
        BuiltPatch { mesh, heightmap }
    });
    if let Err(e) = &outcome {
        tracing::warn!(patch = %patch_id, error = %e, "heightmap load failed");
    }

    let build_time_us = start.elapsed().as_micros() as u64;
    tracing::trace!(patch = %patch_id, build_time_us, "patch meshed");
    MeshingResult {
        patch_id,
        ticket,
        outcome,
        build_time_us,
    }
}
