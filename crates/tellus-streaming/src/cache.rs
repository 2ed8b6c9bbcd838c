//! Streaming resource cache for patch meshes.
//!
//! Every patch id is in one of three states: absent, in flight, or
//! resident. Required patches move from absent to in flight when the build
//! cap allows, nearest to the viewer first. Completed builds become
//! resident and are evicted least-recently-used once the cache is over
//! capacity, but never while still inside the idle window.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::DVec3;
use tellus_cubesphere::{Patch, PatchId, great_circle_distance, point_to_patch_fraction};
use tellus_mesh::{MeshParams, MeshTask, MeshingPipeline, PatchMesh};
use tellus_terrain::{HeightmapSource, PatchHeightmap};

/// Configuration for [`StreamingCache`].
#[derive(Clone, Debug, PartialEq)]
pub struct StreamingParams {
    /// Maximum concurrent builds.
    pub max_in_flight: usize,
    /// Resident entries above which eviction starts.
    pub capacity: usize,
    /// Entries accessed more recently than this are never evicted.
    pub min_idle: Duration,
    /// Builds outstanding longer than this return to absent.
    pub build_timeout: Duration,
    pub radius: f64,
    /// Deepest level searched by [`StreamingCache::elevation_at`].
    pub max_depth: usize,
    /// Mesh worker threads.
    pub workers: usize,
}

impl Default for StreamingParams {
    fn default() -> Self {
        Self {
            max_in_flight: 8,
            capacity: 512,
            min_idle: Duration::from_secs(5),
            build_timeout: Duration::from_secs(30),
            radius: 6_378_137.0,
            max_depth: 11,
            workers: MeshingPipeline::default_worker_count(),
        }
    }
}

/// Where a patch id is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchState {
    Absent,
    InFlight,
    Resident,
}

/// A resident patch.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub patch_id: PatchId,
    pub mesh: PatchMesh,
    pub heightmap: PatchHeightmap,
    pub last_access: Instant,
}

/// What one maintenance pass did.
#[derive(Debug, Default, PartialEq)]
pub struct TickReport {
    /// Patches that became resident.
    pub completed: usize,
    /// Builds whose heightmap could not be loaded.
    pub failed: usize,
    /// Builds abandoned after the build timeout.
    pub timed_out: Vec<PatchId>,
    /// Entries removed; their GPU resources should be released.
    pub evicted: Vec<PatchId>,
}

/// An outstanding build and the ticket its result will carry.
#[derive(Clone, Copy, Debug)]
struct Dispatch {
    started: Instant,
    ticket: u64,
}

/// Owns resident meshes and the background pipeline that builds them.
///
/// Single-writer: all bookkeeping happens on the caller's thread, and the
/// pipeline is only touched through submit and drain.
pub struct StreamingCache {
    params: StreamingParams,
    pipeline: MeshingPipeline,
    resident: HashMap<PatchId, CacheEntry>,
    in_flight: HashMap<PatchId, Dispatch>,
    next_ticket: u64,
    /// Completions drained outside [`tick`](Self::tick), reported by the next one.
    pending: TickReport,
}

impl StreamingCache {
    pub fn new(
        params: StreamingParams,
        mesh_params: MeshParams,
        source: Arc<dyn HeightmapSource>,
    ) -> std::io::Result<Self> {
        let max_in_flight = params.max_in_flight.max(1);
        // Headroom for builds abandoned after a timeout that still occupy a worker.
        let pipeline = MeshingPipeline::new(
            params.workers.max(1),
            max_in_flight * 2,
            source,
            mesh_params,
        )?;
        Ok(Self {
            params: StreamingParams {
                max_in_flight,
                ..params
            },
            pipeline,
            resident: HashMap::new(),
            in_flight: HashMap::new(),
            next_ticket: 0,
            pending: TickReport::default(),
        })
    }

    pub fn params(&self) -> &StreamingParams {
        &self.params
    }

    /// Resident entries for the required patches, nearest to `viewer`
    /// first, dispatching builds for missing ones.
    ///
    /// Resident required entries have their access time refreshed. Missing
    /// patches beyond the build cap are left for a later call.
    pub fn fetch_required(
        &mut self,
        required: &[PatchId],
        viewer: DVec3,
        now: Instant,
    ) -> Vec<&CacheEntry> {
        self.collect_completed(now);

        let mut seen = HashSet::with_capacity(required.len());
        let mut ordered: Vec<(f64, &PatchId)> = required
            .iter()
            .filter(|id| seen.insert(*id))
            .map(|id| (self.distance_to(id, viewer), id))
            .collect();
        ordered.sort_by(|a, b| a.0.total_cmp(&b.0));

        for &(_, id) in &ordered {
            if let Some(entry) = self.resident.get_mut(id) {
                entry.last_access = now;
                continue;
            }
            if self.in_flight.contains_key(id) || self.in_flight.len() >= self.params.max_in_flight {
                continue;
            }
            let ticket = self.next_ticket;
            if !self.pipeline.submit(MeshTask::new(id.clone()).with_ticket(ticket)) {
                break;
            }
            self.next_ticket += 1;
            tracing::debug!(patch = %id, ticket, "build dispatched");
            self.in_flight.insert(
                id.clone(),
                Dispatch {
                    started: now,
                    ticket,
                },
            );
        }

        ordered
            .iter()
            .filter_map(|(_, id)| self.resident.get(*id))
            .collect()
    }

    /// Collect finished builds, abandon stuck ones and evict idle entries.
    pub fn tick(&mut self, now: Instant) -> TickReport {
        self.collect_completed(now);
        let mut report = std::mem::take(&mut self.pending);

        let timeout = self.params.build_timeout;
        self.in_flight.retain(|id, dispatch| {
            let stuck = now.saturating_duration_since(dispatch.started) > timeout;
            if stuck {
                tracing::warn!(patch = %id, "build timed out");
                report.timed_out.push(id.clone());
            }
            !stuck
        });

        while self.resident.len() > self.params.capacity {
            let Some((oldest, last_access)) = self
                .resident
                .values()
                .min_by_key(|e| e.last_access)
                .map(|e| (e.patch_id.clone(), e.last_access))
            else {
                break;
            };
            if now.saturating_duration_since(last_access) <= self.params.min_idle {
                break;
            }
            self.resident.remove(&oldest);
            tracing::debug!(patch = %oldest, "evicted");
            report.evicted.push(oldest);
        }
        report
    }

    /// Ground elevation under `point` from the finest resident heightmap,
    /// or 0 when nothing covering it is resident.
    pub fn elevation_at(&self, point: DVec3) -> f32 {
        (0..=self.params.max_depth)
            .rev()
            .find_map(|depth| {
                let pf = point_to_patch_fraction(point, depth);
                if pf.patch.depth() != depth {
                    return None;
                }
                self.resident
                    .get(pf.patch.id())
                    .map(|entry| entry.heightmap.sample_fraction(pf.fraction))
            })
            .unwrap_or(0.0)
    }

    /// A resident patch with a retried build still outstanding reads as
    /// resident; the retry keeps counting against the build cap.
    pub fn state_of(&self, id: &PatchId) -> PatchState {
        if self.resident.contains_key(id) {
            PatchState::Resident
        } else if self.in_flight.contains_key(id) {
            PatchState::InFlight
        } else {
            PatchState::Absent
        }
    }

    pub fn get(&self, id: &PatchId) -> Option<&CacheEntry> {
        self.resident.get(id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.resident.values()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn resident_count(&self) -> usize {
        self.resident.len()
    }

    fn distance_to(&self, id: &PatchId, viewer: DVec3) -> f64 {
        let center = Patch::from_id(id).sphere_center(self.params.radius);
        great_circle_distance(viewer, center, self.params.radius)
    }

    fn collect_completed(&mut self, now: Instant) {
        for result in self.pipeline.drain_results() {
            let current = self
                .in_flight
                .get(&result.patch_id)
                .is_some_and(|dispatch| dispatch.ticket == result.ticket);
            if current {
                self.in_flight.remove(&result.patch_id);
            } else {
                // Abandoned after a timeout; any retry stays in flight.
                tracing::debug!(patch = %result.patch_id, ticket = result.ticket, "late build result");
            }
            match result.outcome {
                Ok(built) => {
                    tracing::debug!(
                        patch = %result.patch_id,
                        build_time_us = result.build_time_us,
                        triangles = built.mesh.triangle_count(),
                        "patch resident"
                    );
                    self.resident.insert(
                        result.patch_id.clone(),
                        CacheEntry {
                            patch_id: result.patch_id,
                            mesh: built.mesh,
                            heightmap: built.heightmap,
                            last_access: now,
                        },
                    );
                    self.pending.completed += 1;
                }
                Err(e) => {
                    tracing::warn!(patch = %result.patch_id, error = %e, "build failed");
                    self.pending.failed += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tellus_terrain::{FlatSource, SourceError};

    use super::*;

    const R: f64 = 1000.0;

    fn id(s: &str) -> PatchId {
        s.parse().unwrap()
    }

    fn params(max_in_flight: usize, capacity: usize) -> StreamingParams {
        StreamingParams {
            max_in_flight,
            capacity,
            radius: R,
            max_depth: 4,
            workers: 2,
            ..StreamingParams::default()
        }
    }

    fn mesh_params() -> MeshParams {
        MeshParams {
            radius: R,
            ..MeshParams::default()
        }
    }

    fn cache(params: StreamingParams, source: Arc<dyn HeightmapSource>) -> StreamingCache {
        StreamingCache::new(params, mesh_params(), source).unwrap()
    }

    /// Tick at a fixed instant until nothing is in flight.
    fn settle(cache: &mut StreamingCache, now: Instant) -> TickReport {
        let start = Instant::now();
        let mut total = TickReport::default();
        while cache.in_flight_count() > 0 {
            let report = cache.tick(now);
            total.completed += report.completed;
            total.failed += report.failed;
            assert!(start.elapsed().as_secs() < 10, "Timed out waiting for builds");
            std::thread::sleep(Duration::from_millis(1));
        }
        total
    }

    /// Holds every load until released or five seconds pass.
    struct GatedSource {
        gate: crossbeam_channel::Receiver<()>,
        heightmap: PatchHeightmap,
    }

    impl HeightmapSource for GatedSource {
        fn load(&self, _id: &PatchId) -> Result<PatchHeightmap, SourceError> {
            let _ = self.gate.recv_timeout(Duration::from_secs(5));
            Ok(self.heightmap.clone())
        }
    }

    fn gated(heightmap: PatchHeightmap) -> (crossbeam_channel::Sender<()>, Arc<GatedSource>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (tx, Arc::new(GatedSource { gate: rx, heightmap }))
    }

    struct FailingSource;

    impl HeightmapSource for FailingSource {
        fn load(&self, id: &PatchId) -> Result<PatchHeightmap, SourceError> {
            Err(SourceError::Transport {
                id: id.to_string(),
                message: "connection refused".into(),
            })
        }
    }

    fn all_depth_two() -> Vec<PatchId> {
        ["px-", "nx-", "py-", "ny-", "pz-", "nz-"]
            .iter()
            .flat_map(|f| id(f).children())
            .flat_map(|c| c.children())
            .collect()
    }

    #[test]
    fn test_builds_become_resident() {
        let mut c = cache(params(8, 64), Arc::new(FlatSource { resolution: 3 }));
        let now = Instant::now();
        let required = id("pz-").children().to_vec();

        assert!(c.fetch_required(&required, DVec3::Z * R, now).is_empty());
        assert_eq!(c.in_flight_count(), 4);
        for r in &required {
            assert_eq!(c.state_of(r), PatchState::InFlight);
        }

        let report = settle(&mut c, now);
        assert_eq!(report.completed, 4);
        let entries = c.fetch_required(&required, DVec3::Z * R, now);
        assert_eq!(entries.len(), 4);
        assert_eq!(c.state_of(&required[0]), PatchState::Resident);
    }

    #[test]
    fn test_in_flight_never_exceeds_cap() {
        let (gate, source) = gated(PatchHeightmap::zeros(2));
        let mut c = cache(params(3, 1024), source);
        let required = all_depth_two();
        let now = Instant::now();

        c.fetch_required(&required, DVec3::Y * R, now);
        assert_eq!(c.in_flight_count(), 3);
        c.fetch_required(&required, DVec3::Y * R, now);
        assert_eq!(c.in_flight_count(), 3);

        drop(gate);
        let start = Instant::now();
        while c.resident_count() < required.len() {
            c.fetch_required(&required, DVec3::Y * R, now);
            assert!(c.in_flight_count() <= 3);
            c.tick(now);
            assert!(start.elapsed().as_secs() < 20, "Timed out filling cache");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_nearest_patches_dispatch_first() {
        let (gate, source) = gated(PatchHeightmap::zeros(2));
        let mut c = cache(params(2, 64), source);
        let required = all_depth_two();
        let viewer = DVec3::new(0.0, 0.0, 1.0) * R;

        c.fetch_required(&required, viewer, Instant::now());
        // The four pz- patches touching the face center are equally near.
        let in_flight: Vec<_> = required
            .iter()
            .filter(|r| c.state_of(r) == PatchState::InFlight)
            .collect();
        assert_eq!(in_flight.len(), 2);
        let touching_center = ["pz-ac", "pz-bd", "pz-ca", "pz-db"];
        for r in in_flight {
            assert!(touching_center.contains(&r.as_str()), "{r} dispatched early");
        }
        drop(gate);
    }

    #[test]
    fn test_eviction_respects_idle_window() {
        let mut c = cache(params(8, 2), Arc::new(FlatSource { resolution: 2 }));
        let t0 = Instant::now();
        let required = id("nx-").children().to_vec();

        c.fetch_required(&required, DVec3::NEG_X * R, t0);
        settle(&mut c, t0);
        assert_eq!(c.resident_count(), 4);

        // Over capacity, but everything was touched too recently.
        let report = c.tick(t0 + Duration::from_secs(1));
        assert!(report.evicted.is_empty());
        assert_eq!(c.resident_count(), 4);

        // Keep one entry warm.
        c.fetch_required(&required[..1], DVec3::NEG_X * R, t0 + Duration::from_secs(4));

        let report = c.tick(t0 + Duration::from_secs(6));
        assert_eq!(report.evicted.len(), 2);
        assert_eq!(c.resident_count(), 2);
        assert_eq!(c.state_of(&required[0]), PatchState::Resident);
        assert!(!report.evicted.contains(&required[0]));
        for evicted in &report.evicted {
            assert_eq!(c.state_of(evicted), PatchState::Absent);
        }
    }

    #[test]
    fn test_under_capacity_nothing_is_evicted() {
        let mut c = cache(params(8, 16), Arc::new(FlatSource { resolution: 2 }));
        let t0 = Instant::now();
        c.fetch_required(&id("py-").children(), DVec3::Y * R, t0);
        settle(&mut c, t0);
        let report = c.tick(t0 + Duration::from_secs(3600));
        assert!(report.evicted.is_empty());
        assert_eq!(c.resident_count(), 4);
    }

    #[test]
    fn test_stuck_build_times_out_and_late_result_is_kept() {
        let (gate, source) = gated(PatchHeightmap::zeros(2));
        let mut c = cache(
            StreamingParams {
                build_timeout: Duration::from_secs(1),
                ..params(1, 64)
            },
            source,
        );
        let t0 = Instant::now();
        let patch = id("ny-cd");

        c.fetch_required(std::slice::from_ref(&patch), DVec3::NEG_Y * R, t0);
        assert_eq!(c.state_of(&patch), PatchState::InFlight);

        let report = c.tick(t0 + Duration::from_secs(2));
        assert_eq!(report.timed_out, vec![patch.clone()]);
        assert_eq!(c.state_of(&patch), PatchState::Absent);

        // Eligible for a retry right away.
        c.fetch_required(std::slice::from_ref(&patch), DVec3::NEG_Y * R, t0 + Duration::from_secs(2));
        assert_eq!(c.state_of(&patch), PatchState::InFlight);

        drop(gate);
        settle(&mut c, t0 + Duration::from_secs(2));
        assert_eq!(c.state_of(&patch), PatchState::Resident);
    }

    #[test]
    fn test_late_result_keeps_retry_in_flight() {
        let (gate, source) = gated(PatchHeightmap::zeros(2));
        let mut c = cache(
            StreamingParams {
                build_timeout: Duration::from_secs(1),
                workers: 1,
                ..params(1, 64)
            },
            source,
        );
        let t0 = Instant::now();
        let t2 = t0 + Duration::from_secs(2);
        let a = id("px-b");
        let b = id("px-d");

        c.fetch_required(std::slice::from_ref(&a), DVec3::X * R, t0);
        assert_eq!(c.tick(t2).timed_out, vec![a.clone()]);
        c.fetch_required(std::slice::from_ref(&a), DVec3::X * R, t2);
        assert_eq!(c.in_flight_count(), 1);

        // One worker, so this releases only the abandoned build.
        gate.send(()).unwrap();
        let start = Instant::now();
        let report = loop {
            let report = c.tick(t2);
            if c.resident_count() == 1 {
                break report;
            }
            assert!(start.elapsed().as_secs() < 10, "Timed out waiting for late result");
            std::thread::sleep(Duration::from_millis(1));
        };
        assert_eq!(report.completed, 1);
        assert_eq!(c.state_of(&a), PatchState::Resident);
        assert_eq!(c.in_flight_count(), 1);

        // The retry still holds the only build slot.
        c.fetch_required(&[a.clone(), b.clone()], DVec3::X * R, t2);
        assert_eq!(c.state_of(&b), PatchState::Absent);

        drop(gate);
        assert_eq!(settle(&mut c, t2).completed, 1);
        c.fetch_required(std::slice::from_ref(&b), DVec3::X * R, t2);
        assert_eq!(c.state_of(&b), PatchState::InFlight);
        settle(&mut c, t2);
        assert_eq!(c.state_of(&b), PatchState::Resident);
    }

    #[test]
    fn test_tick_reports_builds_drained_by_fetch() {
        let mut c = cache(params(8, 64), Arc::new(FlatSource { resolution: 3 }));
        let now = Instant::now();
        let required = id("pz-").children().to_vec();

        c.fetch_required(&required, DVec3::Z * R, now);
        let start = Instant::now();
        while c.fetch_required(&required, DVec3::Z * R, now).len() < required.len() {
            assert!(start.elapsed().as_secs() < 10, "Timed out waiting for builds");
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(c.tick(now).completed, 4);
        assert_eq!(c.tick(now).completed, 0);
    }

    #[test]
    fn test_failed_build_returns_to_absent() {
        let mut c = cache(params(4, 64), Arc::new(FailingSource));
        let now = Instant::now();
        let patch = id("pz-b");
        c.fetch_required(std::slice::from_ref(&patch), DVec3::Z * R, now);
        let report = settle(&mut c, now);
        assert_eq!(report.failed, 1);
        assert_eq!(c.state_of(&patch), PatchState::Absent);
    }

    #[test]
    fn test_elevation_prefers_finest_resident_patch() {
        let coarse = PatchHeightmap::new(2, vec![10.0; 4]).unwrap();
        let (gate, source) = gated(coarse);
        drop(gate);
        let mut c = cache(params(8, 64), source);
        let now = Instant::now();
        let point = Patch::parse("pz-cc").unwrap().sphere_center(R);

        assert_eq!(c.elevation_at(point), 0.0);
        c.fetch_required(&[id("pz-")], point, now);
        settle(&mut c, now);
        assert_eq!(c.elevation_at(point), 10.0);
        // Elsewhere on the planet there is still nothing.
        assert_eq!(c.elevation_at(DVec3::NEG_Z * R), 0.0);
    }

    #[test]
    fn test_duplicate_requirements_dispatch_once() {
        let (gate, source) = gated(PatchHeightmap::zeros(2));
        let mut c = cache(params(8, 64), source);
        let patch = id("px-a");
        c.fetch_required(&[patch.clone(), patch.clone(), patch], DVec3::X * R, Instant::now());
        assert_eq!(c.in_flight_count(), 1);
        drop(gate);
    }
}
