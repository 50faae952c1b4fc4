//! Local IPC over a Unix socket.
//!
//! Each connection carries exactly one request and one response, both
//! newline-terminated JSON objects. The request envelope is
//! `{"type": <string>, "data": <payload>}`; the response envelope is
//! `{"success": <bool>, "data"?: <value>, "error"?: <string>}`.

use std::{
    fs,
    io::{BufRead, BufReader, Write},
    os::unix::{fs::PermissionsExt, net::{UnixListener, UnixStream}},
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{error, info};

use crate::error::{ArborError, Result};

/// Message type for registering a repository.
pub const MSG_REPO_ADD: &str = "repo_add";
/// Message type for listing repositories.
pub const MSG_REPO_LIST: &str = "repo_list";
/// Message type for unregistering a repository.
pub const MSG_REPO_REMOVE: &str = "repo_remove";
/// Message type for claiming a worktree.
pub const MSG_CLAIM: &str = "claim";
/// Message type for releasing a worktree.
pub const MSG_RELEASE: &str = "release";
/// Message type for pool counters.
pub const MSG_POOL_STATUS: &str = "pool_status";
/// Message type for daemon-level status.
pub const MSG_DAEMON_STATUS: &str = "daemon_status";
/// Message type for the joined worktree listing.
pub const MSG_WORKTREE_LIST: &str = "worktree_list";
/// Message type for an explicit fetch-and-update pass.
pub const MSG_REFRESH: &str = "refresh";
/// Message type for showing one worktree.
pub const MSG_SHOW: &str = "show";

/// Request envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct Message {
    /// One of the `MSG_*` type tags.
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Type-specific payload, when the type carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Operation result, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// `<kind>: <detail>` when the operation failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    /// A successful response carrying `data`.
    pub fn ok(data: impl Serialize) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => Self {
                success: true,
                data: Some(value),
                error: None,
            },
            Err(err) => Self::fail(format!("internal: failed to encode response: {err}")),
        }
    }

    /// A successful response with no payload.
    pub fn ok_empty() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    /// A failed response from a domain error.
    pub fn err(err: &ArborError) -> Self {
        Self::fail(err.wire_message())
    }

    /// A failed response with a literal error string.
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    /// Decode the payload of a successful response.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let data = self.data.clone().unwrap_or(Value::Null);
        serde_json::from_value(data)
            .map_err(|err| ArborError::Internal(format!("failed to decode response data: {err}")))
    }
}

/// Payload of `repo_add`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoAddRequest {
    /// Unique repository name.
    pub name: String,
    /// Path to the source working copy.
    pub path: String,
    /// Target pool capacity.
    pub max_worktrees: u32,
    /// Base branch; empty asks the daemon to auto-detect.
    #[serde(default)]
    pub base_branch: String,
}

/// Payload of `claim`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRequest {
    /// Repository to claim from.
    pub repo_name: String,
    /// Branch to check out.
    pub branch: String,
}

/// Payload of a successful `claim` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimResponse {
    /// Identifier of the claimed worktree (also its directory name).
    pub worktree_id: String,
    /// Absolute path of the claimed worktree.
    pub path: PathBuf,
}

/// Payload of `release`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseRequest {
    /// Identifier returned by `claim`.
    pub worktree_id: String,
}

/// Payload of `pool_status`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolStatusRequest {
    /// Restrict to one repository when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_name: Option<String>,
}

/// Payload of `refresh`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    /// Repository to fetch and update.
    pub repo_name: String,
}

/// Payload of a successful `refresh` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    /// Repository that was refreshed.
    pub repository: String,
    /// Worktrees created during the pass.
    pub worktrees_updated: u32,
    /// Corrupt worktrees removed during the pass.
    pub worktrees_cleaned: u32,
}

/// Payload of `show`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShowRequest {
    /// Worktree identifier or directory name (the same string).
    pub worktree_id: String,
}

/// Server-side dispatch target: one method per message type.
pub trait Handler: Send + Sync + 'static {
    /// Handle `repo_add`.
    fn repo_add(&self, req: RepoAddRequest) -> Response;
    /// Handle `repo_list`.
    fn repo_list(&self) -> Response;
    /// Handle `repo_remove`.
    fn repo_remove(&self, name: String) -> Response;
    /// Handle `claim`.
    fn claim(&self, req: ClaimRequest) -> Response;
    /// Handle `release`.
    fn release(&self, req: ReleaseRequest) -> Response;
    /// Handle `pool_status`.
    fn pool_status(&self, req: PoolStatusRequest) -> Response;
    /// Handle `daemon_status`.
    fn daemon_status(&self) -> Response;
    /// Handle `worktree_list`.
    fn worktree_list(&self) -> Response;
    /// Handle `refresh`.
    fn refresh(&self, req: RefreshRequest) -> Response;
    /// Handle `show`.
    fn show(&self, req: ShowRequest) -> Response;
}

/// Accept loop over the daemon socket.
#[derive(Debug)]
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
}

impl Server {
    /// Bind the socket, refusing when another daemon already answers on it.
    /// A stale socket file nothing listens on is removed and rebound.
    pub fn bind(socket_path: &Path) -> Result<Self> {
        if socket_path.exists() {
            if UnixStream::connect(socket_path).is_ok() {
                return Err(ArborError::AlreadyExists(format!(
                    "daemon already listening on {}",
                    socket_path.display()
                )));
            }
            fs::remove_file(socket_path)?;
        }
        if let Some(parent) = socket_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(socket_path)?;
        fs::set_permissions(socket_path, fs::Permissions::from_mode(0o600))?;
        listener.set_nonblocking(true)?;

        Ok(Self {
            socket_path: socket_path.to_path_buf(),
            listener,
        })
    }

    /// Accept connections until `shutdown` is raised, spawning one thread per
    /// connection. Connections already being served run to completion.
    pub fn serve(&self, handler: Arc<dyn Handler>, shutdown: &AtomicBool) -> Result<()> {
        info!("listening on {}", self.socket_path.display());

        while !shutdown.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, _addr)) => {
                    let handler = Arc::clone(&handler);
                    thread::spawn(move || handle_connection(stream, handler.as_ref()));
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(100));
                }
                Err(err) => error!("failed to accept connection: {err}"),
            }
        }
        Ok(())
    }

    /// Remove the socket file on shutdown.
    pub fn remove_socket(&self) {
        let _ = fs::remove_file(&self.socket_path);
    }
}

/// Read one request, dispatch it, write one response, close.
fn handle_connection(stream: UnixStream, handler: &dyn Handler) {
    let mut reader = BufReader::new(&stream);
    let mut line = String::new();

    let response = match reader.read_line(&mut line) {
        Ok(0) => return,
        Ok(_) => match serde_json::from_str::<Message>(&line) {
            Ok(msg) => dispatch(msg, handler),
            Err(_) => Response::fail("invalid message format"),
        },
        Err(err) => {
            error!("failed to read request: {err}");
            return;
        }
    };

    if let Err(err) = write_json(&stream, &response) {
        error!("failed to write response: {err}");
    }
}

/// Route a request to the matching handler method, decoding its payload.
fn dispatch(msg: Message, handler: &dyn Handler) -> Response {
    let data = msg.data.unwrap_or(Value::Null);
    match msg.msg_type.as_str() {
        MSG_REPO_ADD => with_payload(data, |req| handler.repo_add(req)),
        MSG_REPO_LIST => handler.repo_list(),
        MSG_REPO_REMOVE => with_payload(data, |name| handler.repo_remove(name)),
        MSG_CLAIM => with_payload(data, |req| handler.claim(req)),
        MSG_RELEASE => with_payload(data, |req| handler.release(req)),
        MSG_POOL_STATUS => {
            if data.is_null() {
                handler.pool_status(PoolStatusRequest::default())
            } else {
                with_payload(data, |req| handler.pool_status(req))
            }
        }
        MSG_DAEMON_STATUS => handler.daemon_status(),
        MSG_WORKTREE_LIST => handler.worktree_list(),
        MSG_REFRESH => with_payload(data, |req| handler.refresh(req)),
        MSG_SHOW => with_payload(data, |req| handler.show(req)),
        _ => Response::fail("unknown message type"),
    }
}

fn with_payload<T: DeserializeOwned>(data: Value, f: impl FnOnce(T) -> Response) -> Response {
    match serde_json::from_value(data) {
        Ok(req) => f(req),
        Err(_) => Response::fail("invalid request data"),
    }
}

fn write_json(mut stream: &UnixStream, value: &impl Serialize) -> std::io::Result<()> {
    let mut encoded = serde_json::to_vec(value)?;
    encoded.push(b'\n');
    stream.write_all(&encoded)?;
    stream.flush()
}

/// Client side of the protocol: one connection per request.
pub struct Client {
    socket_path: PathBuf,
}

impl Client {
    /// Build a client for the daemon at `socket_path`.
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    /// Send one message and wait for its response.
    pub fn send(&self, msg_type: &str, data: Option<Value>) -> Result<Response> {
        let stream = UnixStream::connect(&self.socket_path).map_err(|err| {
            ArborError::Internal(format!(
                "failed to connect to daemon at {}: {err} (is the daemon running?)",
                self.socket_path.display()
            ))
        })?;

        let msg = Message {
            msg_type: msg_type.to_string(),
            data,
        };
        write_json(&stream, &msg)
            .map_err(|err| ArborError::Internal(format!("failed to send request: {err}")))?;

        let mut reader = BufReader::new(&stream);
        let mut line = String::new();
        reader
            .read_line(&mut line)
            .map_err(|err| ArborError::Internal(format!("failed to read response: {err}")))?;

        serde_json::from_str(&line)
            .map_err(|err| ArborError::Internal(format!("malformed response: {err}")))
    }

    fn send_with<T: Serialize>(&self, msg_type: &str, payload: &T) -> Result<Response> {
        let data = serde_json::to_value(payload)
            .map_err(|err| ArborError::Internal(format!("failed to encode request: {err}")))?;
        self.send(msg_type, Some(data))
    }

    /// Register a repository.
    pub fn repo_add(&self, req: &RepoAddRequest) -> Result<Response> {
        self.send_with(MSG_REPO_ADD, req)
    }

    /// List registered repositories.
    pub fn repo_list(&self) -> Result<Response> {
        self.send(MSG_REPO_LIST, None)
    }

    /// Unregister a repository.
    pub fn repo_remove(&self, name: &str) -> Result<Response> {
        self.send_with(MSG_REPO_REMOVE, &name)
    }

    /// Claim a worktree.
    pub fn claim(&self, req: &ClaimRequest) -> Result<Response> {
        self.send_with(MSG_CLAIM, req)
    }

    /// Release a worktree.
    pub fn release(&self, req: &ReleaseRequest) -> Result<Response> {
        self.send_with(MSG_RELEASE, req)
    }

    /// Query pool counters.
    pub fn pool_status(&self, req: &PoolStatusRequest) -> Result<Response> {
        self.send_with(MSG_POOL_STATUS, req)
    }

    /// Query daemon-level status.
    pub fn daemon_status(&self) -> Result<Response> {
        self.send(MSG_DAEMON_STATUS, None)
    }

    /// List every worktree with its repository.
    pub fn worktree_list(&self) -> Result<Response> {
        self.send(MSG_WORKTREE_LIST, None)
    }

    /// Fetch and update one repository's pool.
    pub fn refresh(&self, req: &RefreshRequest) -> Result<Response> {
        self.send_with(MSG_REFRESH, req)
    }

    /// Show one worktree with its repository.
    pub fn show(&self, req: &ShowRequest) -> Result<Response> {
        self.send_with(MSG_SHOW, req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// Canned handler for protocol tests.
    struct EchoHandler;

    impl Handler for EchoHandler {
        fn repo_add(&self, req: RepoAddRequest) -> Response {
            Response::ok(serde_json::json!({ "name": req.name }))
        }
        fn repo_list(&self) -> Response {
            Response::ok(Vec::<String>::new())
        }
        fn repo_remove(&self, name: String) -> Response {
            Response::ok(serde_json::json!({ "removed": name }))
        }
        fn claim(&self, req: ClaimRequest) -> Response {
            Response::ok(ClaimResponse {
                worktree_id: format!("{}-{}", req.repo_name, req.branch),
                path: PathBuf::from("/tmp/wt"),
            })
        }
        fn release(&self, _req: ReleaseRequest) -> Response {
            Response::ok_empty()
        }
        fn pool_status(&self, _req: PoolStatusRequest) -> Response {
            Response::ok(Vec::<String>::new())
        }
        fn daemon_status(&self) -> Response {
            Response::ok(serde_json::json!({ "running": true }))
        }
        fn worktree_list(&self) -> Response {
            Response::ok(Vec::<String>::new())
        }
        fn refresh(&self, _req: RefreshRequest) -> Response {
            Response::ok_empty()
        }
        fn show(&self, _req: ShowRequest) -> Response {
            Response::err(&ArborError::WorktreeNotFound("x".to_string()))
        }
    }

    struct TestServer {
        socket: PathBuf,
        shutdown: Arc<AtomicBool>,
        handle: Option<thread::JoinHandle<()>>,
        _dir: tempfile::TempDir,
    }

    impl TestServer {
        fn start() -> Self {
            let dir = tempdir().unwrap();
            let socket = dir.path().join("test.sock");
            let server = Server::bind(&socket).unwrap();
            let shutdown = Arc::new(AtomicBool::new(false));

            let flag = Arc::clone(&shutdown);
            let handle = thread::spawn(move || {
                server.serve(Arc::new(EchoHandler), &flag).unwrap();
                server.remove_socket();
            });

            Self {
                socket,
                shutdown,
                handle: Some(handle),
                _dir: dir,
            }
        }

        fn client(&self) -> Client {
            Client::new(self.socket.clone())
        }
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            self.shutdown.store(true, Ordering::Relaxed);
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        }
    }

    #[test]
    fn request_response_round_trip() {
        let server = TestServer::start();
        let client = server.client();

        let resp = client
            .claim(&ClaimRequest {
                repo_name: "app".to_string(),
                branch: "feat-1".to_string(),
            })
            .unwrap();
        assert!(resp.success);
        let claim: ClaimResponse = resp.decode().unwrap();
        assert_eq!(claim.worktree_id, "app-feat-1");
    }

    #[test]
    fn string_payload_round_trip() {
        let server = TestServer::start();
        let resp = server.client().repo_remove("app").unwrap();
        assert!(resp.success);
        assert_eq!(resp.data.unwrap()["removed"], "app");
    }

    #[test]
    fn unknown_type_is_rejected() {
        let server = TestServer::start();
        let resp = server.client().send("bogus", None).unwrap();
        assert!(!resp.success);
        assert_eq!(resp.error.as_deref(), Some("unknown message type"));
    }

    #[test]
    fn malformed_payload_is_rejected() {
        let server = TestServer::start();
        let resp = server
            .client()
            .send(MSG_CLAIM, Some(serde_json::json!({ "nope": true })))
            .unwrap();
        assert!(!resp.success);
        assert_eq!(resp.error.as_deref(), Some("invalid request data"));
    }

    #[test]
    fn handler_errors_carry_wire_tags() {
        let server = TestServer::start();
        let resp = server
            .client()
            .show(&ShowRequest {
                worktree_id: "x".to_string(),
            })
            .unwrap();
        assert!(!resp.success);
        assert!(resp.error.unwrap().starts_with("not_found: "));
    }

    #[test]
    fn socket_has_owner_only_permissions() {
        let server = TestServer::start();
        let mode = fs::metadata(&server.socket).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn bind_refuses_when_daemon_already_listening() {
        let server = TestServer::start();
        let err = Server::bind(&server.socket).unwrap_err();
        assert_eq!(err.kind(), "already_exists");
    }

    #[test]
    fn bind_replaces_stale_socket() {
        let dir = tempdir().unwrap();
        let socket = dir.path().join("stale.sock");
        drop(Server::bind(&socket).unwrap());
        // The listener is gone but the file remains; rebinding must succeed.
        assert!(socket.exists());
        Server::bind(&socket).unwrap();
    }
}
