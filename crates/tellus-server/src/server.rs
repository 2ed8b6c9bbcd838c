//! Patch data server on `tiny_http`.

use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tellus_cubesphere::{AddressError, PatchId};
use tellus_terrain::{HeightmapSynthesizer, TileProvider};
use tiny_http::{Header, Method, Request, Response, Server};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind to {addr}: {error}")]
    BindError { addr: String, error: String },
    #[error("listener on {addr} has no IP address")]
    NotIp { addr: String },
    #[error("failed to spawn handler thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// A parsed request target.
#[derive(Debug, PartialEq)]
pub enum Route {
    Health,
    /// Binary heightmap.
    Node(PatchId),
    /// Heightmap as JSON rows.
    NodeJson(PatchId),
    Invalidate(PatchId),
    BadId(AddressError),
    NotFound,
}

impl Route {
    pub fn parse(method: &Method, url: &str) -> Self {
        let path = url.split('?').next().unwrap_or(url);
        let id_route = |raw: &str, make: fn(PatchId) -> Route| match raw.parse::<PatchId>() {
            Ok(id) => make(id),
            Err(e) => Route::BadId(e),
        };

        match (method, path) {
            (Method::Get, "/health") => Route::Health,
            (Method::Get, _) if path.starts_with("/node-json/") => {
                id_route(&path["/node-json/".len()..], Route::NodeJson)
            }
            (Method::Get, _) if path.starts_with("/node/") => {
                id_route(&path["/node/".len()..], Route::Node)
            }
            (Method::Delete, _) if path.starts_with("/node/") => {
                id_route(&path["/node/".len()..], Route::Invalidate)
            }
            _ => Route::NotFound,
        }
    }
}

/// Heightmap server with a pool of handler threads sharing one listener.
pub struct PatchServer {
    local_addr: SocketAddr,
    server: Arc<Server>,
    handles: Vec<JoinHandle<()>>,
    stopping: Arc<AtomicBool>,
}

impl PatchServer {
    /// Bind `addr` (port 0 picks a free port) and start `threads` handlers.
    pub fn start<P: TileProvider + 'static>(
        addr: &str,
        threads: usize,
        synth: Arc<HeightmapSynthesizer<P>>,
    ) -> Result<Self, ServerError> {
        let server = Server::http(addr).map_err(|e| ServerError::BindError {
            addr: addr.to_string(),
            error: e.to_string(),
        })?;
        let local_addr = server.server_addr().to_ip().ok_or_else(|| ServerError::NotIp {
            addr: addr.to_string(),
        })?;

        let server = Arc::new(server);
        let stopping = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(threads.max(1));
        for n in 0..threads.max(1) {
            let server = Arc::clone(&server);
            let synth = Arc::clone(&synth);
            let stopping = Arc::clone(&stopping);
            let handle = thread::Builder::new()
                .name(format!("patch-http-{n}"))
                .spawn(move || run_handler(&server, synth.as_ref(), &stopping))
                .map_err(ServerError::Spawn)?;
            handles.push(handle);
        }

        tracing::info!(
            addr = %local_addr,
            threads = handles.len(),
            resolution = synth.params().resolution,
            "patch server listening"
        );
        Ok(Self {
            local_addr,
            server,
            handles,
            stopping,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Block until the handler threads exit.
    pub fn join(mut self) {
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }

    /// Wake every handler, wait for in-progress requests and join.
    pub fn stop(&mut self) {
        self.stopping.store(true, Ordering::Release);
        for _ in 0..self.handles.len() {
            self.server.unblock();
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for PatchServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_handler<P: TileProvider>(
    server: &Server,
    synth: &HeightmapSynthesizer<P>,
    stopping: &AtomicBool,
) {
    loop {
        match server.recv() {
            Ok(request) => {
                if let Err(e) = handle_request(request, synth) {
                    tracing::warn!(error = %e, "failed to send response");
                }
            }
            Err(_) if stopping.load(Ordering::Acquire) => break,
            Err(e) => tracing::warn!(error = %e, "failed to accept request"),
        }
    }
}

type Body = Response<Cursor<Vec<u8>>>;

fn with_content_type(response: Body, value: &str) -> Body {
    match Header::from_bytes(&b"Content-Type"[..], value.as_bytes()) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}

fn json(body: String) -> Body {
    with_content_type(Response::from_string(body), "application/json")
}

fn handle_request<P: TileProvider>(
    request: Request,
    synth: &HeightmapSynthesizer<P>,
) -> std::io::Result<()> {
    let route = Route::parse(request.method(), request.url());
    let response = match route {
        Route::Health => json(r#"{"status":"ok"}"#.to_string()),
        Route::Node(id) => {
            let start = Instant::now();
            let bytes = synth.load_patch_bytes(&id);
            tracing::debug!(patch = %id, elapsed_ms = start.elapsed().as_millis() as u64, "served node");
            with_content_type(Response::from_data(bytes), "application/octet-stream")
        }
        Route::NodeJson(id) => {
            let rows = synth.load_patch_heightmap(&id).rows();
            match serde_json::to_string(&rows) {
                Ok(body) => json(body),
                Err(e) => Response::from_string(e.to_string()).with_status_code(500),
            }
        }
        Route::Invalidate(id) => match synth.invalidate(&id) {
            Ok(true) => Response::from_data(Vec::new()).with_status_code(204),
            Ok(false) => Response::from_string("Not Found").with_status_code(404),
            Err(e) => {
                tracing::warn!(patch = %id, error = %e, "invalidate failed");
                Response::from_string(e.to_string()).with_status_code(500)
            }
        },
        Route::BadId(e) => Response::from_string(e.to_string()).with_status_code(400),
        Route::NotFound => Response::from_string("Not Found").with_status_code(404),
    };
    request.respond(response)
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::sync::atomic::AtomicUsize;

    use tellus_terrain::{
        BlobStore, HeightmapTile, MemoryStore, PatchHeightmap, SynthParams, TileCoord,
        TileFetchError,
    };

    use super::*;

    /// Uniform 266.5 m tiles.
    #[derive(Default)]
    struct FlatProvider {
        calls: AtomicUsize,
    }

    impl TileProvider for FlatProvider {
        fn fetch(&self, _coord: TileCoord) -> Result<HeightmapTile, TileFetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(HeightmapTile::filled(8, 8, [129, 10, 128]))
        }
    }

    struct Fixture {
        server: PatchServer,
        heightmaps: Arc<MemoryStore>,
        synth: Arc<HeightmapSynthesizer<FlatProvider>>,
    }

    fn start(resolution: usize) -> Fixture {
        let heightmaps = Arc::new(MemoryStore::new());
        let synth = Arc::new(HeightmapSynthesizer::new(
            FlatProvider::default(),
            heightmaps.clone(),
            Arc::new(MemoryStore::new()),
            SynthParams {
                resolution,
                ..SynthParams::default()
            },
        ));
        let server = PatchServer::start("127.0.0.1:0", 2, synth.clone()).unwrap();
        Fixture {
            server,
            heightmaps,
            synth,
        }
    }

    fn url(fixture: &Fixture, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", fixture.server.port(), path)
    }

    #[test]
    fn test_route_parsing() {
        assert_eq!(Route::parse(&Method::Get, "/health"), Route::Health);
        assert_eq!(
            Route::parse(&Method::Get, "/node/pz-ab?t=1"),
            Route::Node("pz-ab".parse().unwrap())
        );
        assert_eq!(
            Route::parse(&Method::Get, "/node-json/nx-"),
            Route::NodeJson("nx-".parse().unwrap())
        );
        assert_eq!(
            Route::parse(&Method::Delete, "/node/py-c"),
            Route::Invalidate("py-c".parse().unwrap())
        );
        assert!(matches!(
            Route::parse(&Method::Get, "/node/qq-a"),
            Route::BadId(AddressError::UnknownFace { .. })
        ));
        assert_eq!(Route::parse(&Method::Post, "/node/pz-"), Route::NotFound);
        assert_eq!(Route::parse(&Method::Get, "/"), Route::NotFound);
    }

    #[test]
    fn test_health() {
        let fixture = start(2);
        let resp = ureq::get(&url(&fixture, "/health")).call().unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = serde_json::from_str(&resp.into_string().unwrap()).unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[test]
    fn test_node_returns_le_f32_grid() {
        let fixture = start(4);
        let resp = ureq::get(&url(&fixture, "/node/pz-ab")).call().unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.header("Content-Type"), Some("application/octet-stream"));

        let mut body = Vec::new();
        resp.into_reader().read_to_end(&mut body).unwrap();
        let hm = PatchHeightmap::from_le_bytes(4, &body).unwrap();
        assert!(hm.values().iter().all(|&v| (v - 266.5).abs() < 1e-3));
        assert!(fixture.heightmaps.get("pz-ab").unwrap().is_some());
    }

    #[test]
    fn test_repeated_request_served_from_store() {
        let fixture = start(3);
        ureq::get(&url(&fixture, "/node/ny-d")).call().unwrap();
        let after_first = fixture.synth.provider().calls.load(Ordering::SeqCst);
        ureq::get(&url(&fixture, "/node/ny-d")).call().unwrap();
        assert_eq!(
            fixture.synth.provider().calls.load(Ordering::SeqCst),
            after_first
        );
    }

    #[test]
    fn test_node_json_rows() {
        let fixture = start(3);
        let resp = ureq::get(&url(&fixture, "/node-json/px-c")).call().unwrap();
        let rows: Vec<Vec<f32>> = serde_json::from_str(&resp.into_string().unwrap()).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|row| row.len() == 3));
    }

    #[test]
    fn test_bad_id_is_400_with_reason() {
        let fixture = start(2);
        match ureq::get(&url(&fixture, "/node/pz-abz")).call() {
            Err(ureq::Error::Status(400, resp)) => {
                let text = resp.into_string().unwrap();
                assert!(text.contains("'z'"), "unexpected body: {text}");
            }
            other => panic!("expected 400, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_route_is_404() {
        let fixture = start(2);
        assert!(matches!(
            ureq::get(&url(&fixture, "/tiles/1/2/3")).call(),
            Err(ureq::Error::Status(404, _))
        ));
    }

    #[test]
    fn test_delete_invalidates_stored_heightmap() {
        let fixture = start(2);
        ureq::get(&url(&fixture, "/node/nz-")).call().unwrap();
        let resp = ureq::delete(&url(&fixture, "/node/nz-")).call().unwrap();
        assert_eq!(resp.status(), 204);
        assert!(fixture.heightmaps.get("nz-").unwrap().is_none());
        assert!(matches!(
            ureq::delete(&url(&fixture, "/node/nz-")).call(),
            Err(ureq::Error::Status(404, _))
        ));
    }

    #[test]
    fn test_stop_joins_handlers() {
        let mut fixture = start(2);
        fixture.server.stop();
        assert!(fixture.server.handles.is_empty());
    }
}
