mod common;

use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::time::{Duration, Instant};

use common::{Workspace, XSI, items_document};
use serde_json::Value;
use tower_lsp::lsp_types::Url;

const SERVER_TIMEOUT: Duration = Duration::from_secs(10);
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_millis(200);
const MAX_MESSAGES: usize = 20;

struct Session {
    child: Child,
    reader: BufReader<ChildStdout>,
}

impl Session {
    fn spawn() -> Self {
        let mut child = Command::new(env!("CARGO_BIN_EXE_xsd-ls"))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .env("RUST_LOG", "off")
            .spawn()
            .expect("Failed to spawn language server");
        let stdout = child.stdout.take().expect("Child stdout should be available");
        Self {
            child,
            reader: BufReader::new(stdout),
        }
    }

    fn send(&mut self, message: &Value) {
        let body = message.to_string();
        let request = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);

        let stdin = self
            .child
            .stdin
            .as_mut()
            .expect("Child stdin should be available");
        stdin
            .write_all(request.as_bytes())
            .expect("Failed to write request");
        stdin.flush().expect("Failed to flush stdin");
    }

    fn read(&mut self) -> Value {
        let start_time = Instant::now();
        let mut content_length = None;

        loop {
            if start_time.elapsed() > SERVER_TIMEOUT {
                panic!("Timeout waiting for response headers");
            }

            let mut line = String::new();
            match self.reader.read_line(&mut line) {
                Ok(0) => panic!("Unexpected EOF while reading headers"),
                Ok(_) => {
                    if line.trim().is_empty() {
                        break;
                    }
                    if let Some(length_str) = line.strip_prefix("Content-Length:") {
                        content_length = Some(
                            length_str
                                .trim()
                                .parse::<usize>()
                                .expect("Invalid Content-Length header"),
                        );
                    }
                }
                Err(e) => panic!("Error reading headers: {}", e),
            }
        }

        let mut body = vec![0u8; content_length.expect("Missing Content-Length header")];
        self.reader
            .read_exact(&mut body)
            .expect("Failed to read response body");
        let body = String::from_utf8(body).expect("Response body should be valid UTF-8");
        serde_json::from_str(&body)
            .unwrap_or_else(|e| panic!("Invalid JSON response: {}\nBody: {}", e, body))
    }

    /// Read until a message matches, skipping log notifications and the like
    fn read_until(&mut self, matches: impl Fn(&Value) -> bool) -> Value {
        for _ in 0..MAX_MESSAGES {
            let message = self.read();
            if matches(&message) {
                return message;
            }
        }
        panic!("No matching message within {} messages", MAX_MESSAGES);
    }

    fn initialize(&mut self) -> Value {
        self.send(&serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "processId": null,
                "rootUri": null,
                "capabilities": {},
                "clientInfo": { "name": "test-client", "version": "1.0" }
            }
        }));
        let response = self.read_until(|m| m.get("id").and_then(Value::as_i64) == Some(1));
        self.send(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": "initialized",
            "params": {}
        }));
        response
    }

    fn shutdown(mut self) {
        drop(self.child.stdin.take());
        std::thread::sleep(SHUTDOWN_GRACE_PERIOD);

        match self.child.try_wait() {
            Ok(Some(status)) => {
                if !status.success() {
                    eprintln!("Server exited with non-zero status: {:?}", status);
                }
            }
            Ok(None) => {
                let _ = self.child.kill();
                let _ = self.child.wait();
            }
            Err(e) => panic!("Error checking server status: {}", e),
        }
    }
}

fn did_open(uri: &Url, version: i32, text: &str) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": "textDocument/didOpen",
        "params": {
            "textDocument": {
                "uri": uri.as_str(),
                "languageId": "xml",
                "version": version,
                "text": text
            }
        }
    })
}

fn is_publish_for(uri: &Url) -> impl Fn(&Value) -> bool + '_ {
    move |message| {
        message.get("method").and_then(Value::as_str) == Some("textDocument/publishDiagnostics")
            && message["params"]["uri"].as_str() == Some(uri.as_str())
    }
}

#[test]
fn initialize_smoke() {
    let mut session = Session::spawn();
    let response = session.initialize();

    assert_eq!(
        response.get("jsonrpc").and_then(|v| v.as_str()),
        Some("2.0"),
        "Response should have jsonrpc: '2.0'"
    );
    let capabilities = &response["result"]["capabilities"];
    assert!(capabilities.is_object(), "Capabilities should be an object");
    // Full text sync
    assert_eq!(capabilities["textDocumentSync"], 1);
    assert_eq!(response["result"]["serverInfo"]["name"], "xsd-ls");

    session.shutdown();
}

#[test]
fn publishes_diagnostics_on_open_and_clears_on_close() {
    let workspace = Workspace::with_schemas();
    let path = workspace.write("doc.xml", "");
    let uri = Url::from_file_path(&path).unwrap();
    // Schema is resolved against the document's directory
    let text = items_document("  <item/>\n  <bogus/>");

    let mut session = Session::spawn();
    session.initialize();
    session.send(&did_open(&uri, 1, &text));

    let published = session.read_until(is_publish_for(&uri));
    let params = &published["params"];
    assert_eq!(params["version"], 1);
    let diagnostics = params["diagnostics"].as_array().unwrap();
    assert_eq!(diagnostics.len(), 1, "{}", params);
    assert_eq!(diagnostics[0]["severity"], 1);
    assert_eq!(diagnostics[0]["source"], "xsd");
    assert_eq!(diagnostics[0]["range"]["start"]["line"], 2);
    assert_eq!(diagnostics[0]["range"]["start"]["character"], 3);

    session.send(&serde_json::json!({
        "jsonrpc": "2.0",
        "method": "textDocument/didClose",
        "params": { "textDocument": { "uri": uri.as_str() } }
    }));
    let cleared = session.read_until(is_publish_for(&uri));
    assert_eq!(cleared["params"]["diagnostics"], serde_json::json!([]));

    session.shutdown();
}

#[test]
fn skips_schema_documents() {
    let workspace = Workspace::with_schemas();
    let schema_uri = Url::from_file_path(workspace.path().join("items.xsd")).unwrap();
    let doc_path = workspace.write("plain.xml", "");
    let doc_uri = Url::from_file_path(&doc_path).unwrap();

    let mut session = Session::spawn();
    session.initialize();
    // Not well-formed, but never validated
    session.send(&did_open(&schema_uri, 1, "<xs:schema"));
    session.send(&did_open(&doc_uri, 1, &format!("<plain xmlns:xsi=\"{}\"/>", XSI)));

    // The first publication is for the XML document
    let published = session.read_until(|m| {
        m.get("method").and_then(Value::as_str) == Some("textDocument/publishDiagnostics")
    });
    assert_eq!(published["params"]["uri"].as_str(), Some(doc_uri.as_str()));
    assert_eq!(published["params"]["diagnostics"], serde_json::json!([]));

    session.shutdown();
}
