use anyhow::Result;
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use webterm_core::runtime_dir;

/// Append-only session log under the workspace runtime dir, with optional
/// stderr echo for interactive debugging. Log writes are best-effort from
/// the caller's perspective; the terminal surface never blocks on them.
pub struct Observer {
    log_path: PathBuf,
    verbose: bool,
}

impl Observer {
    pub fn new(workspace: &Path) -> Result<Self> {
        let dir = runtime_dir(workspace);
        fs::create_dir_all(&dir)?;
        Ok(Self {
            log_path: dir.join("observe.log"),
            verbose: false,
        })
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Log a message to stderr with `[webterm]` prefix when verbose mode is on.
    pub fn verbose_log(&self, msg: &str) {
        if self.verbose {
            eprintln!("[webterm] {msg}");
        }
    }

    pub fn record_init(&self, session_id: &str, cwd: &str) -> Result<()> {
        self.verbose_log(&format!("session {session_id} cwd {cwd}"));
        self.append_log_line(&format!(
            "{} INIT session={session_id} cwd={cwd}",
            Utc::now().to_rfc3339()
        ))
    }

    pub fn record_command(&self, command: &str) -> Result<()> {
        self.verbose_log(&format!("dispatch: {command}"));
        self.append_log_line(&format!("{} RUN {command}", Utc::now().to_rfc3339()))
    }

    pub fn record_dispatch_failure(&self, detail: &str) -> Result<()> {
        self.verbose_log(&format!("dispatch failed: {detail}"));
        self.append_log_line(&format!("{} FAIL {detail}", Utc::now().to_rfc3339()))
    }

    /// `action` is one of `open`, `save`, `cancel`.
    pub fn record_editor(&self, action: &str, filename: &str) -> Result<()> {
        self.verbose_log(&format!("editor {action}: {filename}"));
        self.append_log_line(&format!(
            "{} EDITOR {action} {filename}",
            Utc::now().to_rfc3339()
        ))
    }

    /// Log a warning — always written to the log file and to stderr.
    pub fn warn_log(&self, msg: &str) {
        eprintln!("[webterm WARN] {msg}");
        let _ = self.append_log_line(&format!("{} WARN {msg}", Utc::now().to_rfc3339()));
    }

    fn append_log_line(&self, line: &str) -> Result<()> {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        writeln!(f, "{line}")?;
        Ok(())
    }
}
