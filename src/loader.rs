//! Artifact loading and out-of-process hosting.
//!
//! Extracted source text becomes an invocable artifact by hosting it in a
//! disposable `node` subprocess, one per attempt. The child gets a fresh
//! module registry every time, so no module-level state can leak between
//! attempts, and a crash or a rogue `listen()` inside the child cannot take
//! the harness down. The `PORT_RUN` env var that gates server startup in the
//! generated code is never set, so listening stays inert.
//!
//! Host and harness speak line-delimited JSON over stdin/stdout: the harness
//! dispatches service requests against the exported app without opening a
//! socket, and renders components to static markup. Before the artifact
//! loads, the harness reroutes console and stdout writes to stderr, so
//! protocol frames are the only bytes on the channel and a logging artifact
//! cannot corrupt it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tempfile::TempDir;
use thiserror::Error;

/// The JS harness evaluated in the child process. Requires the artifact,
/// reports load success or failure, then serves dispatch/render operations
/// until stdin closes.
const HARNESS_JS: &str = include_str!("harness.js");

/// Errors raised by the artifact host
#[derive(Error, Debug)]
pub enum HostError {
    #[error("Artifact failed to load: {0}")]
    LoadFailed(String),

    #[error("Host process could not be started: {0}")]
    SpawnFailed(String),

    #[error("Host process ended unexpectedly{0}")]
    ChannelClosed(String),

    #[error("Artifact call failed: {0}")]
    CallFailed(String),

    #[error("Malformed host reply: {0}")]
    BadReply(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl HostError {
    /// Whether this error belongs to the load stage (as opposed to a later
    /// per-case call failure).
    #[must_use]
    pub const fn is_load_error(&self) -> bool {
        matches!(self, Self::LoadFailed(_) | Self::SpawnFailed(_))
    }
}

/// A synthesized request dispatched against a service artifact
#[derive(Debug, Clone, Serialize)]
pub struct ServiceRequest {
    /// HTTP method, lowercase
    pub method: String,
    /// Route path without query string
    pub path: String,
    /// Query parameters, stringified into the URL by the harness
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<BTreeMap<String, Value>>,
    /// JSON request body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Request headers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
}

/// The captured response for one dispatched request
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceResponse {
    /// Response status code
    pub status: u16,
    /// Parsed JSON response body (`Null` when empty or not JSON)
    #[serde(default)]
    pub body: Value,
}

/// A loaded service artifact: dispatch synthesized requests, observe responses
pub trait ServiceHandle {
    /// Dispatch one request against the artifact.
    ///
    /// # Errors
    ///
    /// Returns an error when the artifact or its host fails to produce a
    /// response; the validator records this as a failed case, never a crash.
    fn dispatch(&mut self, request: &ServiceRequest) -> Result<ServiceResponse, HostError>;
}

/// A loaded component artifact: render once per case to static markup
pub trait ComponentHandle {
    /// Render the component with the given props.
    ///
    /// # Errors
    ///
    /// Returns an error when rendering throws or the host fails.
    fn render(&mut self, props: &Value) -> Result<String, HostError>;
}

/// Loader configuration
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Command used to start the child runtime
    pub node_command: String,
    /// Directory whose `node_modules` supplies express/react to artifacts
    pub module_root: Option<PathBuf>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            node_command: "node".to_string(),
            module_root: None,
        }
    }
}

/// Artifact loader: one disposable host arena per attempt
#[derive(Debug, Clone, Default)]
pub struct ArtifactLoader {
    config: LoaderConfig,
}

impl ArtifactLoader {
    /// Create a loader with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a loader with custom configuration
    #[must_use]
    pub const fn with_config(config: LoaderConfig) -> Self {
        Self { config }
    }

    /// Whether the child runtime is available on this system
    #[must_use]
    pub fn is_available(&self) -> bool {
        Command::new(&self.config.node_command)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|s| s.success())
    }

    /// Load source text into an invocable artifact.
    ///
    /// Writes the source and the harness into a fresh temp dir, spawns the
    /// child, and waits for its load report. Syntax errors and top-level
    /// throws come back as `LoadFailed` without disturbing the harness.
    ///
    /// # Errors
    ///
    /// Returns `LoadFailed` or `SpawnFailed`; both classify as `stage=load`.
    pub fn load(&self, source: &str) -> Result<LoadedArtifact, HostError> {
        let arena = TempDir::new()?;
        let artifact_path = arena.path().join("artifact.js");
        let harness_path = arena.path().join("harness.js");
        std::fs::write(&artifact_path, source)?;
        std::fs::write(&harness_path, HARNESS_JS)?;

        let mut command = Command::new(&self.config.node_command);
        command
            .arg(&harness_path)
            .arg(&artifact_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .env_remove("PORT_RUN");
        if let Some(root) = &self.config.module_root {
            command.env("NODE_PATH", root.join("node_modules"));
            command.current_dir(root);
        }

        let mut child = command
            .spawn()
            .map_err(|e| HostError::SpawnFailed(format!("{}: {e}", self.config.node_command)))?;

        let stdin = child.stdin.take().ok_or_else(|| {
            HostError::SpawnFailed("child stdin unavailable".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            HostError::SpawnFailed("child stdout unavailable".to_string())
        })?;

        let mut artifact = LoadedArtifact {
            _arena: arena,
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
        };

        // First line out of the child is the load report.
        let ready: LoadReport = artifact.read_reply()?;
        if !ready.ready {
            let reason = ready.error.unwrap_or_else(|| "unknown load error".to_string());
            tracing::debug!(error = %reason, "artifact rejected at load");
            return Err(HostError::LoadFailed(reason));
        }

        Ok(artifact)
    }
}

#[derive(Debug, Deserialize)]
struct LoadReport {
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallReply {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    body: Option<Value>,
    #[serde(default)]
    html: Option<String>,
}

/// An artifact hosted in a live child process. Dropping it tears the child
/// and its arena down.
#[derive(Debug)]
pub struct LoadedArtifact {
    _arena: TempDir,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

impl LoadedArtifact {
    fn send(&mut self, message: &Value) -> Result<(), HostError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| HostError::ChannelClosed(" (stdin closed)".to_string()))?;
        let mut line = serde_json::to_string(message)
            .map_err(|e| HostError::BadReply(e.to_string()))?;
        line.push('\n');
        stdin.write_all(line.as_bytes())?;
        stdin.flush()?;
        Ok(())
    }

    fn read_reply<T: for<'de> Deserialize<'de>>(&mut self) -> Result<T, HostError> {
        let mut line = String::new();
        let read = self.stdout.read_line(&mut line)?;
        if read == 0 {
            return Err(HostError::ChannelClosed(String::new()));
        }
        serde_json::from_str(line.trim()).map_err(|e| HostError::BadReply(e.to_string()))
    }

    fn call(&mut self, message: &Value) -> Result<CallReply, HostError> {
        self.send(message)?;
        let reply: CallReply = self.read_reply()?;
        if !reply.ok {
            return Err(HostError::CallFailed(
                reply.error.unwrap_or_else(|| "unknown host error".to_string()),
            ));
        }
        Ok(reply)
    }
}

impl ServiceHandle for LoadedArtifact {
    fn dispatch(&mut self, request: &ServiceRequest) -> Result<ServiceResponse, HostError> {
        let message = serde_json::json!({ "op": "request", "request": request });
        let reply = self.call(&message)?;
        let status = reply
            .status
            .ok_or_else(|| HostError::BadReply("reply missing status".to_string()))?;
        Ok(ServiceResponse {
            status,
            body: reply.body.unwrap_or(Value::Null),
        })
    }
}

impl ComponentHandle for LoadedArtifact {
    fn render(&mut self, props: &Value) -> Result<String, HostError> {
        let message = serde_json::json!({ "op": "render", "props": props });
        let reply = self.call(&message)?;
        reply
            .html
            .ok_or_else(|| HostError::BadReply("reply missing html".to_string()))
    }
}

impl Drop for LoadedArtifact {
    fn drop(&mut self) {
        // Closing stdin lets the child exit on its own; kill covers the rest.
        self.stdin.take();
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
