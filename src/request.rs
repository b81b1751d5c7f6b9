//! HTTP/1.1 request reading and parsing.
//!
//! The wire bytes are read into a single owned, growable buffer; every
//! derived field (method, path, headers, parameters, body) is stored as
//! an `(offset, length)` range into that buffer rather than a raw
//! pointer, so accessor methods can hand back zero-copy `&str` views
//! that borrow from `&self` without ever risking a dangling pointer.

use std::io::Read;

use crate::error::RequestError;

type Range = (usize, usize);

const INITIAL_SIZE: usize = 4096;

#[derive(Debug, Default)]
pub struct Request {
    buf: Vec<u8>,
    method: Range,
    path: Range,
    version: Range,
    headers: Vec<(Range, Range)>,
    parameters: Vec<(Range, Range)>,
    body: Range,
}

impl Request {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(INITIAL_SIZE),
            ..Default::default()
        }
    }

    fn slice(&self, range: Range) -> &str {
        std::str::from_utf8(&self.buf[range.0..range.0 + range.1]).unwrap_or("")
    }

    pub fn method(&self) -> &str {
        self.slice(self.method)
    }

    pub fn path(&self) -> &str {
        self.slice(self.path)
    }

    pub fn version(&self) -> &str {
        self.slice(self.version)
    }

    pub fn body(&self) -> &[u8] {
        &self.buf[self.body.0..self.body.0 + self.body.1]
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|&(k, v)| (self.slice(k), self.slice(v)))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|&&(k, _)| self.slice(k) == name).map(|&(_, v)| self.slice(v))
    }

    /// Parameter lookup searches the parameter list, not the header
    /// list. The program this was distilled from mistakenly reused its
    /// header-search helper here; this is the fixed behavior.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.iter().find(|&&(k, _)| self.slice(k) == name).map(|&(_, v)| self.slice(v))
    }

    pub fn parameters(&self) -> impl Iterator<Item = (&str, &str)> {
        self.parameters.iter().map(|&(k, v)| (self.slice(k), self.slice(v)))
    }

    /// Clears all derived state and buffered bytes so the request can be
    /// reused for the next connection a worker services.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.method = (0, 0);
        self.path = (0, 0);
        self.version = (0, 0);
        self.headers.clear();
        self.parameters.clear();
        self.body = (0, 0);
    }

    /// Reads a full request off `stream` into this instance, growing the
    /// internal buffer as needed, then parses it.
    ///
    /// Reads until the `\r\n\r\n` header terminator has been seen, then,
    /// if `Content-Length` was present, continues reading until that
    /// many body bytes have arrived. This is the corrected replacement
    /// for the single-`recv` assumption of the program this was
    /// distilled from, which broke whenever a header block straddled a
    /// TCP segment boundary.
    pub fn read_from<S: Read>(&mut self, stream: &mut S) -> Result<(), RequestError> {
        self.reset();

        let mut header_end = None;
        let mut total_read = 0usize;

        loop {
            if self.buf.len() == self.buf.capacity() {
                self.buf.reserve(self.buf.capacity().max(INITIAL_SIZE));
            }

            let old_len = self.buf.len();
            let spare = self.buf.capacity() - old_len;
            self.buf.resize(old_len + spare, 0);

            let n = stream.read(&mut self.buf[old_len..])?;
            self.buf.truncate(old_len + n);

            if n == 0 {
                if total_read == 0 {
                    return Err(RequestError::EmptyRead);
                }
                break;
            }

            total_read += n;

            if header_end.is_none() {
                header_end = find_header_terminator(&self.buf);
            }

            if let Some(end) = header_end {
                let content_length = content_length_hint(&self.buf[..end]);
                let have_body = self.buf.len() - (end + 4);

                match content_length {
                    Some(needed) if have_body < needed => continue,
                    _ => break,
                }
            }
        }

        self.parse()
    }

    fn parse(&mut self) -> Result<(), RequestError> {
        let terminator = find_header_terminator(&self.buf).ok_or(RequestError::MalformedHeader)?;

        let title_end = find_crlf(&self.buf, 0).ok_or(RequestError::MalformedTitle)?;
        let title = &self.buf[0..title_end];

        let sp1 = find_byte(title, b' ').ok_or(RequestError::MalformedTitle)?;
        let rest = &title[sp1 + 1..];
        let sp2 = find_byte(rest, b' ').ok_or(RequestError::MalformedTitle)?;

        self.method = (0, sp1);

        let raw_path_start = sp1 + 1;
        let raw_path = &rest[..sp2];

        self.version = (raw_path_start + sp2 + 1, title_end - (raw_path_start + sp2 + 1));

        if let Some(q) = find_byte(raw_path, b'?') {
            self.path = (raw_path_start, q);
            self.parse_query(raw_path_start + q + 1, raw_path_start + raw_path.len())?;
        } else {
            self.path = (raw_path_start, raw_path.len());
        }

        let mut cursor = title_end + 2;

        loop {
            if cursor == terminator {
                break;
            }

            let line_end = find_crlf(&self.buf, cursor).ok_or(RequestError::MalformedHeader)?;
            let line = &self.buf[cursor..line_end];
            let colon = find_byte(line, b':').ok_or(RequestError::MalformedHeader)?;

            let key = (cursor, colon);
            let mut value_start = cursor + colon + 1;
            while value_start < line_end && self.buf[value_start] == b' ' {
                value_start += 1;
            }
            let value = (value_start, line_end - value_start);

            self.headers.push((key, value));
            cursor = line_end + 2;
        }

        let body_start = terminator + 4;
        let content_length = self
            .header("Content-Length")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);
        let available = self.buf.len().saturating_sub(body_start);
        self.body = (body_start, content_length.min(available));

        Ok(())
    }

    fn parse_query(&mut self, start: usize, end: usize) -> Result<(), RequestError> {
        let mut cursor = start;

        while cursor < end {
            let segment_end = find_byte(&self.buf[cursor..end], b'&')
                .map(|i| cursor + i)
                .unwrap_or(end);
            let eq = find_byte(&self.buf[cursor..segment_end], b'=')
                .ok_or(RequestError::MalformedQuery)?;

            let key = (cursor, eq);
            let value = (cursor + eq + 1, segment_end - (cursor + eq + 1));

            if value.1 == 0 && segment_end == end && eq + 1 == segment_end - cursor {
                return Err(RequestError::MalformedQuery);
            }

            self.parameters.push((key, value));
            cursor = segment_end + 1;
        }

        Ok(())
    }
}

fn find_byte(haystack: &[u8], needle: u8) -> Option<usize> {
    haystack.iter().position(|&b| b == needle)
}

fn find_crlf(haystack: &[u8], from: usize) -> Option<usize> {
    haystack[from..].windows(2).position(|w| w == b"\r\n").map(|i| from + i)
}

fn find_header_terminator(haystack: &[u8]) -> Option<usize> {
    haystack.windows(4).position(|w| w == b"\r\n\r\n")
}

fn content_length_hint(headers: &[u8]) -> Option<usize> {
    let text = std::str::from_utf8(headers).ok()?;
    for line in text.split("\r\n") {
        if let Some(rest) = line.strip_prefix("Content-Length:").or_else(|| line.strip_prefix("content-length:")) {
            return rest.trim().parse().ok();
        }
    }
    None
}
