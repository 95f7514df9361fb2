use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T> = anyhow::Result<T>;

/// Command words the client interprets as a local screen wipe.
pub const CLEAR_COMMANDS: &[&str] = &["clear", "cls"];
/// Command word the backend answers with an `editor` signal (no content)
/// or a file write (content attached).
pub const EDIT_COMMAND: &str = "nano";
/// Read-only command used to seed the editor buffer from the backend.
pub const READ_COMMAND: &str = "cat";

/// Directory under the workspace holding config and logs.
pub fn runtime_dir(workspace: &Path) -> PathBuf {
    workspace.join(".webterm")
}

/// Builds the reserved save form for a file edit (`nano <file>`).
pub fn edit_command(filename: &str) -> String {
    format!("{EDIT_COMMAND} {filename}")
}

/// Builds the read-back form used to load a file's contents (`cat <file>`).
pub fn read_command(filename: &str) -> String {
    format!("{READ_COMMAND} {filename}")
}

// ─── Session handle ─────────────────────────────────────────────────────────

/// Client-side record of the remote execution session. The identifier is
/// fixed for the handle's lifetime; only the working directory changes, and
/// only from a dispatch response that carried a new value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    id: String,
    cwd: String,
}

impl SessionHandle {
    pub fn new(id: impl Into<String>, cwd: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cwd: cwd.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    pub fn set_cwd(&mut self, cwd: impl Into<String>) {
        self.cwd = cwd.into();
    }

    /// Prompt label shown left of the input field.
    pub fn prompt(&self) -> String {
        format!("{} $", self.cwd)
    }
}

// ─── History ring ───────────────────────────────────────────────────────────

/// Ordered record of submitted commands plus a recall cursor.
///
/// `cursor == None` is the past-end sentinel: not recalling anything, the
/// user is editing a fresh line. Entries are never deduplicated or evicted.
#[derive(Debug, Default)]
pub struct HistoryRing {
    entries: Vec<String>,
    cursor: Option<usize>,
}

impl HistoryRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Records a submitted command. Whitespace-only input is dropped
    /// silently. Always leaves the cursor at past-end so the next recall
    /// starts from the newest entry.
    pub fn append(&mut self, text: &str) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }
        self.entries.push(trimmed.to_string());
        self.cursor = None;
    }

    /// Moves the cursor one step toward the oldest entry, clamped at the
    /// start, and returns the entry under it ("" when the ring is empty).
    pub fn recall_previous(&mut self) -> &str {
        if self.entries.is_empty() {
            return "";
        }
        self.cursor = match self.cursor {
            None => Some(self.entries.len() - 1),
            Some(0) => Some(0),
            Some(idx) => Some(idx - 1),
        };
        match self.cursor {
            Some(idx) => &self.entries[idx],
            None => "",
        }
    }

    /// Moves the cursor one step toward past-end. Reaching or passing
    /// past-end returns "" and leaves the cursor at the sentinel, signaling
    /// a fresh line.
    pub fn recall_next(&mut self) -> &str {
        match self.cursor {
            Some(idx) if idx + 1 < self.entries.len() => {
                self.cursor = Some(idx + 1);
                &self.entries[idx + 1]
            }
            _ => {
                self.cursor = None;
                ""
            }
        }
    }

    /// Entries whose text case-insensitively starts with `partial`, in ring
    /// order. An empty `partial` yields nothing.
    pub fn suggest(&self, partial: &str) -> Vec<&str> {
        if partial.is_empty() {
            return Vec::new();
        }
        let needle = partial.to_lowercase();
        self.entries
            .iter()
            .filter(|entry| entry.to_lowercase().starts_with(&needle))
            .map(String::as_str)
            .collect()
    }
}

// ─── Command intent ─────────────────────────────────────────────────────────

/// Local interpretation of a submitted command, resolved once at submission
/// time. The raw string always goes over the wire unchanged; intent only
/// selects the response-handling branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandIntent {
    /// `clear`/`cls` — wipe the local output surface instead of printing.
    ClearScreen,
    /// Anything else — rendered from whatever the backend returns.
    Remote,
}

impl CommandIntent {
    pub fn resolve(raw: &str) -> Self {
        let folded = raw.trim().to_lowercase();
        if CLEAR_COMMANDS.contains(&folded.as_str()) {
            Self::ClearScreen
        } else {
            Self::Remote
        }
    }
}

// ─── Wire types ─────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("init response is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("init response missing session_id")]
    MissingSessionId,
}

/// `GET /init` payload. The session identifier is the one field the client
/// cannot proceed without; a missing working directory defaults to `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitResponse {
    pub session_id: String,
    pub cwd: String,
}

impl InitResponse {
    pub fn from_json_str(body: &str) -> std::result::Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(body).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
        let session_id = value
            .get("session_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or(ProtocolError::MissingSessionId)?
            .to_string();
        let cwd = value
            .get("cwd")
            .and_then(Value::as_str)
            .unwrap_or("/")
            .to_string();
        Ok(Self { session_id, cwd })
    }
}

/// Latest memory reading from the backend. `total` is megabytes and not
/// always sent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

/// `POST /run` payload. Every field is optional; an absent or wrong-typed
/// field means "no effect", never a decode failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub editor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryUsage>,
}

impl RunResponse {
    /// Field-tolerant decode: unparseable bodies and malformed fields decode
    /// to an empty response rather than an error.
    pub fn from_json_str(body: &str) -> Self {
        let Ok(value) = serde_json::from_str::<Value>(body) else {
            return Self::default();
        };
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Self {
        let memory = value.get("memory").and_then(|m| {
            Some(MemoryUsage {
                percent: m.get("percent")?.as_f64()?,
                total: m.get("total").and_then(Value::as_u64),
            })
        });
        Self {
            output: value
                .get("output")
                .and_then(Value::as_str)
                .map(ToString::to_string),
            cwd: value
                .get("cwd")
                .and_then(Value::as_str)
                .map(ToString::to_string),
            editor: value
                .get("editor")
                .and_then(Value::as_str)
                .map(ToString::to_string),
            cpu: value.get("cpu").and_then(Value::as_f64),
            memory,
        }
    }

    pub fn has_usage(&self) -> bool {
        self.cpu.is_some() || self.memory.is_some()
    }
}

// ─── Configuration ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Disable cursor blink and other animation.
    pub reduced_motion: bool,
    /// Maximum rows shown in the autocomplete dropdown.
    pub suggestion_rows: usize,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            reduced_motion: false,
            suggestion_rows: 5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub ui: UiConfig,
}

impl AppConfig {
    pub fn config_path(workspace: &Path) -> PathBuf {
        runtime_dir(workspace).join("config.toml")
    }

    /// Loads `.webterm/config.toml`, falling back to defaults when the file
    /// does not exist. A present but unparseable file is an error.
    pub fn load(workspace: &Path) -> Result<Self> {
        let path = Self::config_path(workspace);
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path)?;
        Ok(toml::from_str(&raw)?)
    }
}
