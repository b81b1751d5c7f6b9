use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use tempfile::TempDir;

use throng::config::{LogLevel, ServerConfig};
use throng::handlers::{FileHandler, IndexHandler};
use throng::{HandlerRegistry, Server};

struct Fixture {
    tempdir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self { tempdir: TempDir::new().expect("create temp dir") }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.tempdir.path().join(name)
    }

    fn write_file(&self, name: &str, data: &[u8]) {
        std::fs::write(self.path(name), data).expect("write fixture file");
    }

    fn create_dir(&self, name: &str) {
        std::fs::create_dir(self.path(name)).expect("create fixture dir");
    }

    fn root(&self) -> PathBuf {
        self.tempdir.path().to_path_buf()
    }
}

/// Starts a server with the default (index, file) handler pair over an
/// OS-assigned port and returns the address plus a join handle.
fn start_server(root: PathBuf, connection_timeout: Duration) -> (std::net::SocketAddr, thread::JoinHandle<()>) {
    let config = ServerConfig {
        threads: 2,
        port: 0,
        root,
        connection_timeout,
        log_level: LogLevel::Error,
    };

    let mut registry = HandlerRegistry::new();
    registry.push(IndexHandler::new(config.root.clone()));
    registry.push(FileHandler::new(config.root.clone()));

    let server = Server::bind(config, registry).expect("bind server");
    let addr = server.local_addr().expect("local addr");

    let handle = thread::spawn(move || {
        server.run().expect("server run");
    });

    // Give the acceptor thread a moment to enter its first tick.
    thread::sleep(Duration::from_millis(50));

    (addr, handle)
}

fn send_request(addr: std::net::SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).expect("connect");
    stream.write_all(raw.as_bytes()).expect("write request");
    stream.shutdown(std::net::Shutdown::Write).ok();

    let mut response = String::new();
    stream.read_to_string(&mut response).expect("read response");
    response
}

#[test]
fn e1_static_file_returns_contents_with_mime_type() {
    let fixture = Fixture::new();
    fixture.write_file("hello.txt", b"hi");

    let (addr, _handle) = start_server(fixture.root(), Duration::from_secs(5));
    let response = send_request(addr, "GET /hello.txt HTTP/1.1\r\nHost: x\r\n\r\n");

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("Content-Type: text\r\n"));
    assert!(response.ends_with("hi"));
}

#[test]
fn e2_unknown_extension_gets_octet_stream_and_attachment_disposition() {
    let fixture = Fixture::new();
    fixture.write_file("raw.bin", &[0u8, 1u8]);

    let (addr, _handle) = start_server(fixture.root(), Duration::from_secs(5));
    let response = send_request(addr, "GET /raw.bin HTTP/1.1\r\n\r\n");

    assert!(response.contains("Content-Type: application/octet-stream"));
    assert!(response.contains("Content-Disposition: attachment"));
}

#[test]
fn e3_directory_listing_contains_sorted_entries() {
    let fixture = Fixture::new();
    fixture.write_file("a", b"x");
    fixture.create_dir("b");

    let (addr, _handle) = start_server(fixture.root(), Duration::from_secs(5));
    let response = send_request(addr, "GET / HTTP/1.1\r\n\r\n");

    assert!(response.contains("<li><a href=\"/a\">a</a></li>"));
    assert!(response.contains("<li><a href=\"/b/\">b/</a></li>"));
}

#[test]
fn e4_unknown_method_gets_501() {
    let fixture = Fixture::new();

    let (addr, _handle) = start_server(fixture.root(), Duration::from_secs(5));
    let response = send_request(addr, "PUT / HTTP/1.1\r\n\r\n");

    assert!(response.starts_with("HTTP/1.1 501 Not Implemented\r\n"));
}

#[test]
fn missing_file_returns_404() {
    // `FileHandler` matches any resolvable GET/HEAD path regardless of
    // existence (mirroring the original's method-only `check()`), so a
    // missing file is answered with a literal 404 from inside the
    // handler rather than falling through to the registry's 501 — that
    // 501 path is for genuinely unmatched requests, e.g. E4's `PUT`.
    let fixture = Fixture::new();

    let (addr, _handle) = start_server(fixture.root(), Duration::from_secs(5));
    let response = send_request(addr, "GET /missing.txt HTTP/1.1\r\n\r\n");

    assert_eq!(response, "HTTP/1.1 404 Not Found\r\n\r\n");
}

#[test]
fn escaping_path_returns_404_instead_of_falling_through() {
    let fixture = Fixture::new();

    let (addr, _handle) = start_server(fixture.root(), Duration::from_secs(5));
    let response = send_request(addr, "GET /../etc/passwd HTTP/1.1\r\n\r\n");

    assert_eq!(response, "HTTP/1.1 404 Not Found\r\n\r\n");
}

#[test]
fn e6_idle_connection_is_closed_after_timeout() {
    let fixture = Fixture::new();
    fixture.write_file("hello.txt", b"hi");

    let (addr, _handle) = start_server(fixture.root(), Duration::from_millis(200));

    let mut stream = TcpStream::connect(addr).expect("connect");
    // Send nothing; the multiplexer should sweep this connection after
    // its idle timeout and close it without a worker ever touching it.
    thread::sleep(Duration::from_millis(900));

    let mut buf = [0u8; 64];
    let n = stream.read(&mut buf).unwrap_or(0);
    let response = String::from_utf8_lossy(&buf[..n]);

    assert!(response.starts_with("HTTP/1.1 503 Service Unavailable") || n == 0);
}

#[test]
fn range_request_returns_partial_content() {
    let fixture = Fixture::new();
    fixture.write_file("hello.txt", b"hello world");

    let (addr, _handle) = start_server(fixture.root(), Duration::from_secs(5));
    let response = send_request(addr, "GET /hello.txt HTTP/1.1\r\nRange: bytes=0-4\r\n\r\n");

    assert!(response.starts_with("HTTP/1.1 206 Partial Content\r\n"));
    assert!(response.contains("Content-Range: bytes 0-4/11"));
    assert!(response.ends_with("hello"));
}
