//! Standing build service.
//!
//! Listener threads accept asset requests and answer cache hits directly;
//! anything needing work is handed over a channel to a single worker that
//! drains requests in arrival order. All build work is serialized onto
//! that one worker because the compiler and most capabilities are not
//! thread-safe. A stuck capability therefore stalls the whole queue; there
//! is no cancellation.
//!
//! Shutdown stops the listeners, lets the in-flight build finish, and
//! flushes the cache. The cache is never cleaned here: a server session
//! never observes the complete asset set, so orphan detection would be
//! wrong.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::build::PipelineManager;
use crate::error::BuildError;

/// Listener configuration.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Interface to bind
    pub bind: String,
    /// Port to listen on; 0 picks a free port
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 7710,
        }
    }
}

/// A queued build request with its response slot.
struct BuildRequest {
    source: String,
    reply: Sender<Result<PathBuf, String>>,
}

struct Shared {
    manager: RwLock<PipelineManager>,
    /// Output path -> source path, computed once at startup
    index: HashMap<String, String>,
    shutdown: AtomicBool,
}

/// The standing build server.
pub struct BuildServer {
    shared: Arc<Shared>,
    queue: Sender<BuildRequest>,
    worker: Option<JoinHandle<()>>,
    listener: Option<JoinHandle<()>>,
    addr: SocketAddr,
}

impl BuildServer {
    /// Start the worker and the TCP listener.
    ///
    /// The protocol is line-oriented: each request line names an asset
    /// (source or output path, relative); the response line is
    /// `OK <output path>` or `ERR <message>`. The literal request
    /// `shutdown` stops the server.
    pub fn start(mut manager: PipelineManager, options: &ServerOptions) -> Result<Self, BuildError> {
        manager.load_cache();
        let index = manager.output_index()?;
        let shared = Arc::new(Shared {
            manager: RwLock::new(manager),
            index,
            shutdown: AtomicBool::new(false),
        });

        let (queue, requests) = channel::<BuildRequest>();

        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::spawn(move || worker_loop(worker_shared, requests));

        let listener = TcpListener::bind((options.bind.as_str(), options.port))
            .map_err(|e| BuildError::Server(format!("bind failed: {}", e)))?;
        let addr = listener
            .local_addr()
            .map_err(|e| BuildError::Server(e.to_string()))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| BuildError::Server(e.to_string()))?;

        let accept_shared = Arc::clone(&shared);
        let accept_queue = queue.clone();
        let accept = std::thread::spawn(move || accept_loop(listener, accept_shared, accept_queue));

        tracing::info!(%addr, "build server listening");
        Ok(Self {
            shared,
            queue,
            worker: Some(worker),
            listener: Some(accept),
            addr,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Resolve one request in-process, same as a connection would.
    pub fn request(&self, asset: &str) -> Result<PathBuf, String> {
        handle_request(&self.shared, &self.queue, asset)
    }

    /// Signal shutdown. Listeners stop accepting, the worker finishes its
    /// current build and exits.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::SeqCst)
    }

    /// Wait for the threads to wind down, then flush the cache.
    pub fn join(mut self) -> Result<(), BuildError> {
        if let Some(handle) = self.listener.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        let mut manager = self
            .shared
            .manager
            .write()
            .map_err(|_| BuildError::Server("manager lock poisoned".to_string()))?;
        manager.flush()
    }

    /// Block until an external shutdown request arrives, then flush.
    pub fn run_to_completion(self) -> Result<(), BuildError> {
        while !self.is_shutdown() {
            std::thread::sleep(Duration::from_millis(200));
        }
        self.join()
    }
}

/// Answer a request: cache fast path under a read lock, otherwise enqueue
/// and wait for the worker's reply.
fn handle_request(
    shared: &Shared,
    queue: &Sender<BuildRequest>,
    asset: &str,
) -> Result<PathBuf, String> {
    let asset = asset.trim().replace('\\', "/");
    let source = shared
        .index
        .get(&asset)
        .cloned()
        .unwrap_or_else(|| asset.clone());

    {
        let manager = shared
            .manager
            .read()
            .map_err(|_| "manager lock poisoned".to_string())?;
        if let Some(dest) = manager.find_cached(&source) {
            tracing::debug!(asset = %source, "served from cache");
            return Ok(dest);
        }
    }

    let (reply, response) = channel();
    queue
        .send(BuildRequest { source, reply })
        .map_err(|_| "server is shutting down".to_string())?;
    response
        .recv()
        .map_err(|_| "server is shutting down".to_string())?
}

/// The single build worker: drains the queue in FIFO order, one build in
/// flight at a time. The timeout only exists to observe the shutdown flag;
/// the loop otherwise sleeps on the channel.
fn worker_loop(shared: Arc<Shared>, requests: Receiver<BuildRequest>) {
    loop {
        if shared.shutdown.load(Ordering::SeqCst) {
            break;
        }
        match requests.recv_timeout(Duration::from_millis(200)) {
            Ok(request) => {
                let built = {
                    let mut manager = match shared.manager.write() {
                        Ok(manager) => manager,
                        Err(_) => {
                            let _ = request.reply.send(Err("manager lock poisoned".to_string()));
                            continue;
                        }
                    };
                    manager.build_requested(&request.source)
                };
                let _ = request.reply.send(built.map_err(|e| e.to_string()));
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn accept_loop(listener: TcpListener, shared: Arc<Shared>, queue: Sender<BuildRequest>) {
    let mut connections = Vec::new();
    while !shared.shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                tracing::debug!(%peer, "client connected");
                let shared = Arc::clone(&shared);
                let queue = queue.clone();
                connections.push(std::thread::spawn(move || {
                    serve_connection(stream, shared, queue)
                }));
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                tracing::error!("listener accept failed: {}", e);
                break;
            }
        }
    }
    for handle in connections {
        let _ = handle.join();
    }
}

fn serve_connection(stream: TcpStream, shared: Arc<Shared>, queue: Sender<BuildRequest>) {
    let _ = stream.set_read_timeout(Some(Duration::from_millis(200)));
    let mut reader = match stream.try_clone() {
        Ok(clone) => BufReader::new(clone),
        Err(e) => {
            tracing::error!("could not clone connection: {}", e);
            return;
        }
    };
    let mut writer = stream;
    let mut line = String::new();

    loop {
        if shared.shutdown.load(Ordering::SeqCst) {
            break;
        }
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                let request = line.trim();
                if request.is_empty() {
                    continue;
                }
                if request == "shutdown" {
                    let _ = writeln!(writer, "OK shutting down");
                    shared.shutdown.store(true, Ordering::SeqCst);
                    break;
                }
                let response = match handle_request(&shared, &queue, request) {
                    Ok(dest) => format!("OK {}", dest.display()),
                    Err(message) => format!("ERR {}", message),
                };
                if writeln!(writer, "{}", response).is_err() {
                    break;
                }
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(_) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildContext;
    use crate::content::ContentDescriptor;
    use std::fs::{self, File};
    use std::io::Write as _;
    use std::path::Path;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut file = File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    fn server_for(temp: &TempDir) -> BuildServer {
        let context = BuildContext::new(temp.path()).with_legacy_events(true);
        let mut manager = PipelineManager::new(context);
        manager
            .collection_mut()
            .include_pattern("**/*.bin", ContentDescriptor::build(None, None))
            .unwrap();
        BuildServer::start(
            manager,
            &ServerOptions {
                bind: "127.0.0.1".to_string(),
                port: 0,
            },
        )
        .unwrap()
    }

    fn roundtrip(addr: SocketAddr, request: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        writeln!(stream, "{}", request).unwrap();
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        line.trim().to_string()
    }

    #[test]
    fn test_request_builds_and_returns_output() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "content/data.bin", "payload");

        let server = server_for(&temp);
        let dest = server.request("data.bin").unwrap();
        assert!(dest.ends_with("bin/data.xnb"));
        assert!(dest.exists());

        server.shutdown();
        server.join().unwrap();
    }

    #[test]
    fn test_request_by_output_path() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "content/data.bin", "payload");

        let server = server_for(&temp);
        let dest = server.request("data.xnb").unwrap();
        assert!(dest.ends_with("bin/data.xnb"));

        server.shutdown();
        server.join().unwrap();
    }

    #[test]
    fn test_repeat_request_hits_cache_without_rewrite() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "content/data.bin", "payload");

        let server = server_for(&temp);
        let dest = server.request("data.bin").unwrap();
        let stamp = crate::cache::FileStamp::of(&dest).unwrap();

        let again = server.request("data.bin").unwrap();
        assert_eq!(dest, again);
        assert_eq!(crate::cache::FileStamp::of(&dest).unwrap(), stamp);

        server.shutdown();
        server.join().unwrap();
    }

    #[test]
    fn test_unknown_asset_is_refused() {
        let temp = TempDir::new().unwrap();
        let server = server_for(&temp);

        let err = server.request("missing.bin").unwrap_err();
        assert!(err.contains("missing.bin"));

        server.shutdown();
        server.join().unwrap();
    }

    #[test]
    fn test_tcp_protocol_and_shutdown_flushes() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "content/data.bin", "payload");

        let server = server_for(&temp);
        let addr = server.local_addr();

        let response = roundtrip(addr, "data.bin");
        assert!(response.starts_with("OK "), "unexpected response: {}", response);
        assert!(response.ends_with("data.xnb"));

        let response = roundtrip(addr, "shutdown");
        assert!(response.starts_with("OK"));

        server.join().unwrap();
        // Flushed, never cleaned
        assert!(temp
            .path()
            .join("obj")
            .join(crate::cache::CACHE_FILENAME)
            .exists());
    }

    #[test]
    fn test_concurrent_requests_all_served() {
        let temp = TempDir::new().unwrap();
        for i in 0..4 {
            create_test_file(temp.path(), &format!("content/asset{}.bin", i), "payload");
        }

        let server = Arc::new(server_for(&temp));
        let mut handles = Vec::new();
        for i in 0..4 {
            let server = Arc::clone(&server);
            handles.push(std::thread::spawn(move || {
                server.request(&format!("asset{}.bin", i))
            }));
        }
        for handle in handles {
            let dest = handle.join().unwrap().unwrap();
            assert!(dest.exists());
        }

        server.shutdown();
        Arc::try_unwrap(server)
            .map_err(|_| ())
            .unwrap()
            .join()
            .unwrap();
    }
}
