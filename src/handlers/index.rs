//! Directory listing handler. Matches `GET` requests whose resolved
//! path is a directory and renders an `<li>` index, sorted directories-
//! then-files by name for deterministic output — the program this was
//! distilled from relied on raw `readdir` order, which is filesystem-
//! dependent and not reproducible in a test (see DESIGN.md, O1).

use std::fs;
use std::net::TcpStream;
use std::path::{Path, PathBuf};

use crate::error::HandlerError;
use crate::handler::Handler;
use crate::handlers::resolve::resolve;
use crate::request::Request;

pub struct IndexHandler {
    root: PathBuf,
}

impl IndexHandler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolved(&self, request: &Request) -> Option<PathBuf> {
        resolve(&self.root, request.path()).ok()
    }
}

impl Handler for IndexHandler {
    fn matches(&self, request: &Request) -> bool {
        if request.method() != "GET" {
            return false;
        }

        self.resolved(request).map(|p| p.is_dir()).unwrap_or(false)
    }

    fn handle(&self, stream: &mut TcpStream, request: &Request) -> Result<(), HandlerError> {
        let path = self.resolved(request).ok_or(HandlerError::NotFound)?;
        let body = render_index(request.path(), &path)?;

        const HEADER: &str = "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=UTF-8\r\n\r\n";

        use std::io::Write;
        stream.write_all(HEADER.as_bytes())?;
        stream.write_all(body.as_bytes())?;
        Ok(())
    }
}

fn render_index(request_path: &str, dir: &Path) -> Result<String, HandlerError> {
    let mut dirs = Vec::new();
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type()?.is_dir() {
            dirs.push(name);
        } else {
            files.push(name);
        }
    }

    dirs.sort();
    files.sort();

    let base = request_path.trim_end_matches('/');
    let mut items = String::new();

    for name in &dirs {
        items.push_str(&format!("<li><a href=\"{base}/{name}/\">{name}/</a></li>"));
    }
    for name in &files {
        items.push_str(&format!("<li><a href=\"{base}/{name}\">{name}</a></li>"));
    }

    Ok(format!(
        "<html><head><title>Static server</title></head><body><h1>Index of: {request_path}</h1><ul>{items}</ul></body></html>"
    ))
}
