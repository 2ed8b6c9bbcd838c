//! Headless viewer: a scripted flight path driving LOD selection and
//! patch streaming once per tick.

use std::time::Instant;

use glam::DVec3;
use tellus_cubesphere::{LonLat, lon_lat_to_point};
use tellus_lod::LodSelector;
use tellus_streaming::StreamingCache;

/// A straight-line flight in longitude with an optional descent.
#[derive(Clone, Debug, PartialEq)]
pub struct Flight {
    pub lon_lat: LonLat,
    /// Height above sea level in meters.
    pub altitude_m: f64,
    /// Degrees of longitude per tick.
    pub drift_deg: f64,
    /// Meters of altitude lost per tick.
    pub descent_m: f64,
    /// Lowest altitude above the ground.
    pub clearance_m: f64,
}

impl Flight {
    /// World position over a sphere of `radius`.
    pub fn position(&self, radius: f64) -> DVec3 {
        lon_lat_to_point(self.lon_lat) * (radius + self.altitude_m)
    }

    /// Move one tick along the path, staying `clearance_m` above `ground_m`.
    pub fn advance(&mut self, ground_m: f64) {
        let mut lon = self.lon_lat.lon + self.drift_deg;
        if lon > 180.0 {
            lon -= 360.0;
        } else if lon <= -180.0 {
            lon += 360.0;
        }
        self.lon_lat.lon = lon;
        self.altitude_m = (self.altitude_m - self.descent_m).max(ground_m + self.clearance_m);
    }
}

/// What one tick saw.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameStats {
    pub required: usize,
    /// Required patches with a resident mesh.
    pub ready: usize,
    pub resident: usize,
    pub in_flight: usize,
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub evicted: usize,
    /// Vertices across the ready meshes.
    pub vertices: usize,
    /// Vertex buffer bytes across the ready meshes.
    pub mesh_bytes: usize,
    pub ground_m: f32,
}

pub struct Viewer {
    selector: LodSelector,
    cache: StreamingCache,
}

impl Viewer {
    pub fn new(selector: LodSelector, cache: StreamingCache) -> Self {
        Self { selector, cache }
    }

    pub fn cache(&self) -> &StreamingCache {
        &self.cache
    }

    pub fn step(&mut self, position: DVec3, now: Instant) -> FrameStats {
        let required = self.selector.required_ids(position);
        let (ready, vertices, mesh_bytes) = {
            let entries = self.cache.fetch_required(&required, position, now);
            let vertices = entries.iter().map(|e| e.mesh.vertex_count()).sum();
            let mesh_bytes = entries.iter().map(|e| e.mesh.byte_size()).sum();
            (entries.len(), vertices, mesh_bytes)
        };
        let report = self.cache.tick(now);

        FrameStats {
            required: required.len(),
            ready,
            resident: self.cache.resident_count(),
            in_flight: self.cache.in_flight_count(),
            completed: report.completed,
            failed: report.failed,
            timed_out: report.timed_out.len(),
            evicted: report.evicted.len(),
            vertices,
            mesh_bytes,
            ground_m: self.cache.elevation_at(position),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tellus_lod::LodParams;
    use tellus_mesh::MeshParams;
    use tellus_streaming::StreamingParams;
    use tellus_terrain::FlatSource;

    use super::*;

    const R: f64 = 1000.0;

    fn viewer(max_depth: usize) -> Viewer {
        let selector = LodSelector::new(LodParams {
            radius: R,
            max_depth,
            ..LodParams::default()
        });
        let cache = StreamingCache::new(
            StreamingParams {
                radius: R,
                max_depth,
                workers: 2,
                ..StreamingParams::default()
            },
            MeshParams {
                radius: R,
                ..MeshParams::default()
            },
            Arc::new(FlatSource { resolution: 3 }),
        )
        .unwrap();
        Viewer::new(selector, cache)
    }

    #[test]
    fn test_flight_wraps_longitude_and_keeps_clearance() {
        let mut flight = Flight {
            lon_lat: LonLat {
                lon: 179.5,
                lat: 10.0,
            },
            altitude_m: 120.0,
            drift_deg: 1.0,
            descent_m: 50.0,
            clearance_m: 30.0,
        };
        flight.advance(0.0);
        assert!((flight.lon_lat.lon - -179.5).abs() < 1e-9);
        assert_eq!(flight.altitude_m, 70.0);
        flight.advance(60.0);
        assert_eq!(flight.altitude_m, 90.0);
        assert!((flight.position(R).length() - (R + 90.0)).abs() < 1e-9);
    }

    #[test]
    fn test_required_patches_become_ready() {
        let mut viewer = viewer(3);
        let position = DVec3::Y * (R * 1.01);
        let start = Instant::now();
        let mut completed = 0;
        let stats = loop {
            let stats = viewer.step(position, Instant::now());
            completed += stats.completed;
            if stats.required > 0 && stats.ready == stats.required {
                break stats;
            }
            assert!(start.elapsed().as_secs() < 10, "Timed out waiting for patches");
            std::thread::sleep(Duration::from_millis(2));
        };
        assert!(stats.required > 6);
        assert_eq!(stats.in_flight, 0);
        assert!(stats.vertices > 0);
        assert!(stats.mesh_bytes > stats.vertices);
        assert_eq!(completed, stats.resident);
        assert_eq!(stats.ground_m, 0.0);
    }

    #[test]
    fn test_first_tick_respects_build_cap() {
        let mut viewer = viewer(5);
        let stats = viewer.step(DVec3::Z * R, Instant::now());
        assert!(stats.required > 8);
        assert!(stats.in_flight <= 8);
        assert_eq!(stats.ready, 0);
    }
}
