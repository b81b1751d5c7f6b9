//! MIME type table: ordered `{ext, mime, addition}` entries with
//! case-insensitive extension matching, seeded from the table the
//! program this was distilled from shipped with.

pub struct MimeEntry {
    pub ext: &'static str,
    pub mime: &'static str,
    pub addition: &'static str,
}

pub struct MimeTable {
    entries: Vec<MimeEntry>,
}

const FALLBACK: MimeEntry = MimeEntry {
    ext: "",
    mime: "application/octet-stream",
    addition: "Content-Disposition: attachment\r\n",
};

impl MimeTable {
    pub fn seeded() -> Self {
        // Literal values from the program this was distilled from
        // (`main.c`'s handler-registration block), including its quirk
        // of never resetting `mime` between additions — `c` inherits
        // `txt`'s `"text"` rather than getting its own entry.
        let entries = vec![
            MimeEntry { ext: "png", mime: "image/png", addition: "" },
            MimeEntry { ext: "jpg", mime: "image/jpg", addition: "" },
            MimeEntry { ext: "jpeg", mime: "image/jpeg", addition: "" },
            MimeEntry { ext: "gif", mime: "image/gif", addition: "" },
            MimeEntry { ext: "txt", mime: "text", addition: "" },
            MimeEntry { ext: "c", mime: "text", addition: "" },
            MimeEntry { ext: "html", mime: "text/html; charset=UTF-8", addition: "" },
            MimeEntry { ext: "css", mime: "text/css", addition: "" },
            MimeEntry { ext: "pdf", mime: "application/pdf", addition: "" },
            MimeEntry { ext: "mp4", mime: "video/mp4", addition: "" },
            MimeEntry { ext: "swf", mime: "video/vnd.sealed.swf", addition: "" },
        ];

        Self { entries }
    }

    /// Looks up the extension (the substring after the last `.`, if
    /// that `.` occurs after the last `/`), falling back to the generic
    /// octet-stream entry when absent or unrecognized.
    pub fn lookup(&self, path: &str) -> &MimeEntry {
        let ext = match extension_of(path) {
            Some(ext) => ext,
            None => return &FALLBACK,
        };

        self.entries
            .iter()
            .find(|entry| entry.ext.eq_ignore_ascii_case(ext))
            .unwrap_or(&FALLBACK)
    }
}

impl Default for MimeTable {
    fn default() -> Self {
        Self::seeded()
    }
}

fn extension_of(path: &str) -> Option<&str> {
    let last_slash = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    let tail = &path[last_slash..];
    let dot = tail.rfind('.')?;
    if dot + 1 == tail.len() {
        return None;
    }
    Some(&tail[dot + 1..])
}
