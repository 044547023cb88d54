#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

pub const MANIFEST_ONE_WORK: &str = r#"{
  "version": 1,
  "generatedAt": "2025-06-01T12:00:00+00:00",
  "novels": [
    {
      "id": "A",
      "title": "Work A",
      "author": "Someone",
      "coverImage": "A/page_001.png",
      "chapters": [
        { "id": "1", "title": "Chapter One", "pages": ["A/p0.png", "A/p1.png", "A/p2.png"] }
      ]
    }
  ]
}"#;

pub const MANIFEST_TWO_WORKS: &str = r#"{
  "version": 2,
  "generatedAt": "2025-07-01T12:00:00+00:00",
  "novels": [
    {
      "id": "A",
      "title": "Work A",
      "author": "Someone",
      "coverImage": "A/page_001.png",
      "chapters": [
        { "id": "1", "title": "Chapter One", "pages": ["A/p0.png", "A/p1.png", "A/p2.png"] }
      ]
    },
    {
      "id": "B",
      "title": "Work B",
      "author": "Another",
      "coverImage": "B/page_001.png",
      "chapters": [
        { "id": "1", "title": "Start", "pages": ["B/p0.png"] },
        { "id": "2", "title": "End", "pages": ["B/q0.png", "B/q1.png"] }
      ]
    }
  ]
}"#;

/// What `/manga-manifest.json` answers with.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: String,
    pub delay: Duration,
}

impl Reply {
    pub fn ok(body: &str) -> Self {
        Self {
            status: 200,
            body: body.to_owned(),
            delay: Duration::ZERO,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: "error".to_owned(),
            delay: Duration::ZERO,
        }
    }

    /// Holds the response back; other requests are still served meanwhile.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Static file server stand-in whose manifest reply can be switched mid-test.
pub struct StaticServer {
    pub base_url: String,
    reply: Arc<Mutex<Reply>>,
    hits: Arc<AtomicUsize>,
    shutdown_tx: mpsc::Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl StaticServer {
    pub fn start(initial: Reply) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start tiny_http server");
        let base_url = format!("http://{}", server.server_addr());
        let reply = Arc::new(Mutex::new(initial));
        let hits = Arc::new(AtomicUsize::new(0));
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let thread_reply = Arc::clone(&reply);
        let thread_hits = Arc::clone(&hits);
        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let url = request.url().to_string();
                let path = url.split('?').next().unwrap_or(&url);

                let mut delay = Duration::ZERO;
                let response = if path == "/manga-manifest.json" {
                    thread_hits.fetch_add(1, Ordering::SeqCst);
                    let reply = thread_reply.lock().expect("reply lock").clone();
                    delay = reply.delay;
                    let header = tiny_http::Header::from_bytes(
                        &b"Content-Type"[..],
                        &b"application/json"[..],
                    )
                    .expect("build header");
                    tiny_http::Response::from_string(reply.body)
                        .with_status_code(reply.status)
                        .with_header(header)
                } else {
                    tiny_http::Response::from_string("not found").with_status_code(404)
                };

                if delay.is_zero() {
                    let _ = request.respond(response);
                } else {
                    thread::spawn(move || {
                        thread::sleep(delay);
                        let _ = request.respond(response);
                    });
                }
            }
        });

        Self {
            base_url,
            reply,
            hits,
            shutdown_tx,
            handle: Some(handle),
        }
    }

    pub fn set_reply(&self, reply: Reply) {
        *self.reply.lock().expect("reply lock") = reply;
    }

    pub fn manifest_hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Drop for StaticServer {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// A base URL nothing listens on.
pub fn unreachable_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    let addr = listener.local_addr().expect("free port addr");
    drop(listener);
    format!("http://{addr}")
}

/// A base URL that accepts connections but never answers. Keep the listener
/// alive for as long as the URL is in use.
pub fn silent_base_url() -> (String, std::net::TcpListener) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind silent port");
    let addr = listener.local_addr().expect("silent port addr");
    (format!("http://{addr}"), listener)
}
