use anyhow::{Result, anyhow};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde_json::json;
use std::error::Error as StdError;
use std::time::Duration;
use webterm_core::{CommandIntent, InitResponse, RunResponse, ServerConfig, SessionHandle};

/// Fixed line surfaced for any dispatch failure (transport error or
/// non-success status). Details go to the observer log, not the terminal.
pub const DISPATCH_FAILED_LINE: &str = "Error: Server response failed";
/// Fixed line for a failed editor read-back; the overlay is not shown.
pub const READBACK_FAILED_LINE: &str = "Error: Failed to load file content";
/// Fixed line for a failed editor save; the overlay still closes.
pub const SAVE_FAILED_LINE: &str = "Error: Failed to save";

/// Blocking HTTP client for the execution backend.
///
/// One `init` exchange per process lifetime, then `run` per command. There
/// is deliberately no retry: every failure is surfaced as a single output
/// line and control returns to the prompt.
#[derive(Debug, Clone)]
pub struct BackendClient {
    cfg: ServerConfig,
    client: Client,
}

impl BackendClient {
    pub fn new(cfg: ServerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds))
            .build()?;
        Ok(Self { cfg, client })
    }

    pub fn base_url(&self) -> &str {
        &self.cfg.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.cfg.base_url.trim_end_matches('/'), path)
    }

    /// `GET /init` — establishes the session. Called once, before any
    /// command dispatch is permitted.
    pub fn init(&self) -> Result<SessionHandle> {
        let response = self
            .client
            .get(self.url("init"))
            .send()
            .map_err(|e| format_transport_error(&e))?;
        let status = response.status();
        let body = response.text().map_err(|e| format_transport_error(&e))?;
        if !status.is_success() {
            return Err(format_status_error(status));
        }
        let init = InitResponse::from_json_str(&body)?;
        Ok(SessionHandle::new(init.session_id, init.cwd))
    }

    /// `POST /run` — one command round-trip. `content` is attached only for
    /// the editor-save reserved form. The command text is sent verbatim.
    pub fn run(&self, session_id: &str, command: &str, content: Option<&str>) -> Result<RunResponse> {
        let mut body = json!({
            "session_id": session_id,
            "command": command,
        });
        if let Some(content) = content {
            body["content"] = json!(content);
        }
        let response = self
            .client
            .post(self.url("run"))
            .json(&body)
            .send()
            .map_err(|e| format_transport_error(&e))?;
        let status = response.status();
        let text = response.text().map_err(|e| format_transport_error(&e))?;
        if !status.is_success() {
            return Err(format_status_error(status));
        }
        Ok(RunResponse::from_json_str(&text))
    }
}

/// What the output surface should do with one well-formed response.
/// Exactly one variant applies; side updates (`cwd`, usage) are read off the
/// response independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchAction {
    /// Open the editor overlay for this file. Suppresses any `output`.
    OpenEditor(String),
    /// Wipe the accumulated output surface.
    ClearScreen,
    /// Append one line to the output surface.
    Print(String),
    /// Nothing visible.
    Silent,
}

/// Primary-action resolution, in priority order: editor, then local clear,
/// then non-empty output, then nothing.
pub fn resolve_action(intent: CommandIntent, response: &RunResponse) -> DispatchAction {
    if let Some(filename) = response.editor.as_deref()
        && !filename.is_empty()
    {
        return DispatchAction::OpenEditor(filename.to_string());
    }
    if intent == CommandIntent::ClearScreen {
        return DispatchAction::ClearScreen;
    }
    if let Some(output) = response.output.as_deref()
        && !output.is_empty()
    {
        return DispatchAction::Print(output.to_string());
    }
    DispatchAction::Silent
}

/// Log-facing description of a transport failure. The terminal always shows
/// the fixed line; this detail goes to the observer.
fn format_transport_error(err: &reqwest::Error) -> anyhow::Error {
    if err.is_timeout() {
        return anyhow!("request timed out after the configured deadline");
    }
    if err.is_connect() {
        let detail = err.source().map(|e| e.to_string()).unwrap_or_default();
        return anyhow!("could not connect to the backend: {detail}");
    }
    anyhow!("network error: {err}")
}

fn format_status_error(status: StatusCode) -> anyhow::Error {
    anyhow!(
        "backend returned HTTP {} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, mpsc};
    use std::thread;
    use std::time::Duration as StdDuration;

    fn response(output: Option<&str>, editor: Option<&str>) -> RunResponse {
        RunResponse {
            output: output.map(ToString::to_string),
            editor: editor.map(ToString::to_string),
            ..RunResponse::default()
        }
    }

    // ── Primary-action resolution ──

    #[test]
    fn editor_wins_over_output() {
        let action = resolve_action(
            CommandIntent::Remote,
            &response(Some("ignored"), Some("a.txt")),
        );
        assert_eq!(action, DispatchAction::OpenEditor("a.txt".to_string()));
    }

    #[test]
    fn clear_intent_wins_over_output() {
        let action = resolve_action(
            CommandIntent::ClearScreen,
            &response(Some("still here"), None),
        );
        assert_eq!(action, DispatchAction::ClearScreen);
    }

    #[test]
    fn editor_wins_even_over_clear_intent() {
        let action = resolve_action(
            CommandIntent::ClearScreen,
            &response(None, Some("a.txt")),
        );
        assert_eq!(action, DispatchAction::OpenEditor("a.txt".to_string()));
    }

    #[test]
    fn non_empty_output_prints() {
        let action = resolve_action(CommandIntent::Remote, &response(Some("hello"), None));
        assert_eq!(action, DispatchAction::Print("hello".to_string()));
    }

    #[test]
    fn empty_output_and_empty_editor_are_silent() {
        assert_eq!(
            resolve_action(CommandIntent::Remote, &response(Some(""), None)),
            DispatchAction::Silent
        );
        assert_eq!(
            resolve_action(CommandIntent::Remote, &response(None, Some(""))),
            DispatchAction::Silent
        );
        assert_eq!(
            resolve_action(CommandIntent::Remote, &RunResponse::default()),
            DispatchAction::Silent
        );
    }

    // ── HTTP round-trips against a scripted backend ──

    #[derive(Clone)]
    struct MockResponse {
        status: u16,
        body: String,
    }

    struct MockBackend {
        base_url: String,
        requests: Arc<Mutex<Vec<String>>>,
        request_count: Arc<AtomicUsize>,
        stop_tx: Option<mpsc::Sender<()>>,
        handle: Option<thread::JoinHandle<()>>,
    }

    impl MockBackend {
        fn request_count(&self) -> usize {
            self.request_count.load(Ordering::SeqCst)
        }

        fn request(&self, idx: usize) -> String {
            self.requests.lock().expect("requests lock")[idx].clone()
        }
    }

    impl Drop for MockBackend {
        fn drop(&mut self) {
            if let Some(tx) = self.stop_tx.take() {
                let _ = tx.send(());
            }
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        }
    }

    fn start_mock_backend(responses: Vec<MockResponse>) -> MockBackend {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock backend");
        listener
            .set_nonblocking(true)
            .expect("set nonblocking listener");
        let addr = listener.local_addr().expect("addr");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let requests_thread = Arc::clone(&requests);
        let request_count = Arc::new(AtomicUsize::new(0));
        let request_count_thread = Arc::clone(&request_count);
        let (tx, rx) = mpsc::channel::<()>();
        let handle = thread::spawn(move || {
            loop {
                if rx.try_recv().is_ok() {
                    break;
                }
                match listener.accept() {
                    Ok((mut stream, _)) => {
                        let raw = read_http_request(&mut stream);
                        requests_thread.lock().expect("requests lock").push(raw);
                        let idx = request_count_thread.fetch_add(1, Ordering::SeqCst);
                        let selected = responses
                            .get(idx)
                            .cloned()
                            .or_else(|| responses.last().cloned())
                            .unwrap_or(MockResponse {
                                status: 500,
                                body: "{}".to_string(),
                            });
                        let reply = format!(
                            "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            selected.status,
                            selected.body.len(),
                            selected.body
                        );
                        let _ = stream.write_all(reply.as_bytes());
                        let _ = stream.flush();
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(StdDuration::from_millis(2));
                    }
                    Err(_) => break,
                }
            }
        });
        MockBackend {
            base_url: format!("http://{addr}"),
            requests,
            request_count,
            stop_tx: Some(tx),
            handle: Some(handle),
        }
    }

    fn read_http_request(stream: &mut std::net::TcpStream) -> String {
        let mut buffer = Vec::new();
        let mut chunk = [0_u8; 1024];
        let mut header_end = None;
        while header_end.is_none() {
            let Ok(read) = stream.read(&mut chunk) else {
                break;
            };
            if read == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..read]);
            header_end = find_subsequence(&buffer, b"\r\n\r\n").map(|idx| idx + 4);
            if buffer.len() > 1_048_576 {
                break;
            }
        }
        let header_len = header_end.unwrap_or(buffer.len());
        let content_length = parse_content_length(&buffer[..header_len]);
        while buffer.len() < header_len + content_length {
            let Ok(read) = stream.read(&mut chunk) else {
                break;
            };
            if read == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..read]);
        }
        String::from_utf8_lossy(&buffer).to_string()
    }

    fn parse_content_length(headers: &[u8]) -> usize {
        let raw = String::from_utf8_lossy(headers);
        for line in raw.lines() {
            let mut parts = line.splitn(2, ':');
            let key = parts.next().unwrap_or_default().trim();
            if key.eq_ignore_ascii_case("content-length")
                && let Some(value) = parts.next()
                && let Ok(parsed) = value.trim().parse::<usize>()
            {
                return parsed;
            }
        }
        0
    }

    fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        if needle.is_empty() || haystack.len() < needle.len() {
            return None;
        }
        haystack
            .windows(needle.len())
            .position(|window| window == needle)
    }

    fn client_for(server: &MockBackend) -> BackendClient {
        BackendClient::new(ServerConfig {
            base_url: server.base_url.clone(),
            timeout_seconds: 5,
        })
        .expect("client")
    }

    #[test]
    fn init_builds_session_handle() {
        let server = start_mock_backend(vec![MockResponse {
            status: 200,
            body: r#"{"session_id":"abc","cwd":"/"}"#.to_string(),
        }]);
        let client = client_for(&server);
        let session = client.init().expect("init");
        assert_eq!(session.id(), "abc");
        assert_eq!(session.cwd(), "/");
        assert_eq!(server.request_count(), 1);
        assert!(server.request(0).starts_with("GET /init"));
    }

    #[test]
    fn init_non_success_status_is_dispatch_failure() {
        let server = start_mock_backend(vec![MockResponse {
            status: 500,
            body: r#"{"output":"boom"}"#.to_string(),
        }]);
        let client = client_for(&server);
        let err = client.init().expect_err("500 should fail");
        assert!(err.to_string().contains("HTTP 500"));
    }

    #[test]
    fn run_posts_session_and_command() {
        let server = start_mock_backend(vec![MockResponse {
            status: 200,
            body: r#"{"output":"a.txt","cwd":"/home"}"#.to_string(),
        }]);
        let client = client_for(&server);
        let resp = client.run("abc", "ls", None).expect("run");
        assert_eq!(resp.output.as_deref(), Some("a.txt"));
        assert_eq!(resp.cwd.as_deref(), Some("/home"));
        let request = server.request(0);
        assert!(request.starts_with("POST /run"));
        assert!(request.contains(r#""session_id":"abc""#));
        assert!(request.contains(r#""command":"ls""#));
        assert!(!request.contains("content"));
    }

    #[test]
    fn run_attaches_content_only_for_save_form() {
        let server = start_mock_backend(vec![MockResponse {
            status: 200,
            body: r#"{"output":"Wrote to a.txt"}"#.to_string(),
        }]);
        let client = client_for(&server);
        let resp = client
            .run("abc", "nano a.txt", Some("hello world"))
            .expect("save");
        assert_eq!(resp.output.as_deref(), Some("Wrote to a.txt"));
        let request = server.request(0);
        assert!(request.contains(r#""content":"hello world""#));
    }

    #[test]
    fn run_non_success_status_is_dispatch_failure() {
        let server = start_mock_backend(vec![MockResponse {
            status: 400,
            body: r#"{"output":"Invalid session. Reload page."}"#.to_string(),
        }]);
        let client = client_for(&server);
        let err = client.run("stale", "ls", None).expect_err("400 should fail");
        assert!(err.to_string().contains("HTTP 400"));
    }

    #[test]
    fn run_transport_failure_is_dispatch_failure() {
        // Bind then drop a listener so the port is closed.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
            listener.local_addr().expect("addr")
        };
        let client = BackendClient::new(ServerConfig {
            base_url: format!("http://{addr}"),
            timeout_seconds: 1,
        })
        .expect("client");
        assert!(client.run("abc", "ls", None).is_err());
    }

    #[test]
    fn run_tolerates_empty_success_body() {
        let server = start_mock_backend(vec![MockResponse {
            status: 200,
            body: "{}".to_string(),
        }]);
        let client = client_for(&server);
        let resp = client.run("abc", "true", None).expect("run");
        assert_eq!(resp, RunResponse::default());
    }
}
