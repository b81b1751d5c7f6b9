//! Static file handler: `GET`/`HEAD` responses with MIME-table-driven
//! `Content-Type`, plus a single explicit `Range: bytes=start-end`
//! request honored as `206 Partial Content` (see DESIGN.md, O2 — multi-
//! range and suffix ranges fall back to a full `200` response).

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::net::TcpStream;
use std::path::PathBuf;

use crate::error::HandlerError;
use crate::handler::Handler;
use crate::handlers::resolve::resolve;
use crate::mime::MimeTable;
use crate::request::Request;

pub struct FileHandler {
    root: PathBuf,
    mime: MimeTable,
}

impl FileHandler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), mime: MimeTable::seeded() }
    }

    fn resolved(&self, request: &Request) -> Result<PathBuf, HandlerError> {
        resolve(&self.root, request.path())
    }
}

impl Handler for FileHandler {
    fn matches(&self, request: &Request) -> bool {
        // Method is the entire predicate (mirroring the original's
        // method-only `check()`): neither a missing file nor a path
        // that escapes the root is excluded here, so `handle` can
        // answer both with a literal `404` rather than falling through
        // to the registry's own unmatched-request `501`.
        matches!(request.method(), "GET" | "HEAD")
    }

    fn handle(&self, stream: &mut TcpStream, request: &Request) -> Result<(), HandlerError> {
        let path = self.resolved(request)?;
        let mut file = File::open(&path).map_err(|_| HandlerError::NotFound)?;
        let entry = self.mime.lookup(request.path());
        let head = request.method() == "HEAD";
        let total = file.metadata()?.len();

        if let Some((start, end)) = single_range(request, total) {
            write_partial(stream, &mut file, entry, start, end, total, head)
        } else {
            write_full(stream, &mut file, entry, head)
        }
    }
}

fn single_range(request: &Request, total: u64) -> Option<(u64, u64)> {
    let raw = request.header("Range")?;
    let spec = raw.strip_prefix("bytes=")?;

    // Multiple comma-separated ranges and open-ended suffix ranges
    // (`bytes=-500`) are not implemented; fall back to a full response.
    if spec.contains(',') || spec.starts_with('-') {
        return None;
    }

    let (start_str, end_str) = spec.split_once('-')?;
    let start: u64 = start_str.parse().ok()?;
    let end: u64 = if end_str.is_empty() { total.saturating_sub(1) } else { end_str.parse().ok()? };

    if start > end || end >= total {
        return None;
    }

    Some((start, end))
}

fn write_full(stream: &mut TcpStream, file: &mut File, entry: &crate::mime::MimeEntry, head: bool) -> Result<(), HandlerError> {
    let header = format!("HTTP/1.1 200 OK\r\nContent-Type: {}\r\n{}\r\n", entry.mime, entry.addition);
    stream.write_all(header.as_bytes())?;

    if !head {
        std::io::copy(file, stream)?;
    }

    Ok(())
}

fn write_partial(
    stream: &mut TcpStream,
    file: &mut File,
    entry: &crate::mime::MimeEntry,
    start: u64,
    end: u64,
    total: u64,
    head: bool,
) -> Result<(), HandlerError> {
    let header = format!(
        "HTTP/1.1 206 Partial Content\r\nContent-Type: {}\r\nContent-Range: bytes {}-{}/{}\r\n{}\r\n",
        entry.mime, start, end, total, entry.addition
    );
    stream.write_all(header.as_bytes())?;

    if head {
        return Ok(());
    }

    file.seek(SeekFrom::Start(start))?;
    let mut remaining = end - start + 1;
    let mut buf = [0u8; 64 * 1024];

    while remaining > 0 {
        let chunk = remaining.min(buf.len() as u64) as usize;
        let n = file.read(&mut buf[..chunk])?;
        if n == 0 {
            break;
        }
        stream.write_all(&buf[..n])?;
        remaining -= n as u64;
    }

    Ok(())
}
