//! Persistence - state snapshot, collection directories, cookie files
//!
//! Formats are human-readable and line-oriented (`key=value`). Saves go
//! through write-to-temp plus atomic rename. Loads are tolerant: unknown
//! keys are skipped, numeric ranges clamped, and a field that fails to parse
//! resets to its default without failing the caller.
//!
//! Layout:
//!   $HOME/.tinyrequest_state                              single-request snapshot
//!   $HOME/.tinyrequest/collections/<id>/manifest          name, id, timestamps
//!   $HOME/.tinyrequest/collections/<id>/requests/<i>.req  per-request files
//!   $HOME/.tinyrequest/collections/<id>/cookies.jar       one cookie per line

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;

use crate::constants::{AUTOSAVE_DEBOUNCE, MAX_HEADERS, STATE_DIR_NAME, STATE_FILE_NAME};
use crate::cookies::{CookieJar, StoredCookie};
use crate::models::{Collection, Header, HttpMethod, RequestDraft, SavedRequest};
use crate::validate::validate_header_line;

/// Manages file storage under the state directory
pub struct Storage {
    home: PathBuf,
    state_dir: PathBuf,
}

impl Storage {
    /// Resolve against `$HOME` (`%USERPROFILE%` on Windows), falling back to
    /// the working directory
    pub fn new() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let state_dir = home.join(STATE_DIR_NAME);
        Storage { home, state_dir }
    }

    /// Root everything under `root` instead of the home directory
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let home = root.into();
        let state_dir = home.join(STATE_DIR_NAME);
        Storage { home, state_dir }
    }

    /// Create the state directory tree. Failure here is fatal to startup.
    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(self.collections_dir())
            .with_context(|| format!("cannot create state directory {:?}", self.state_dir))
    }

    pub fn state_file(&self) -> PathBuf {
        self.home.join(STATE_FILE_NAME)
    }

    fn collections_dir(&self) -> PathBuf {
        self.state_dir.join("collections")
    }

    fn collection_dir(&self, id: u64) -> PathBuf {
        self.collections_dir().join(id.to_string())
    }

    /// Save the single-request snapshot
    pub fn save_request_state(&self, draft: &RequestDraft) -> Result<()> {
        write_atomic(&self.state_file(), &encode_request(None, draft))
    }

    /// Load the snapshot; `None` when it does not exist yet
    pub fn load_request_state(&self) -> Option<RequestDraft> {
        let text = fs::read_to_string(self.state_file()).ok()?;
        let (_, draft) = decode_request(&text);
        Some(draft)
    }

    pub fn save_collection(&self, collection: &Collection) -> Result<()> {
        let dir = self.collection_dir(collection.id);
        let requests_dir = dir.join("requests");
        // rewrite the request files wholesale so deletions and reorders stick
        if requests_dir.exists() {
            fs::remove_dir_all(&requests_dir)?;
        }
        fs::create_dir_all(&requests_dir)?;

        let manifest = format!(
            "name={}\nid={}\nmodified={}\nrequest_count={}\n",
            collection.name,
            collection.id,
            collection.modified.to_rfc3339(),
            collection.requests.len(),
        );
        write_atomic(&dir.join("manifest"), &manifest)?;

        for (index, saved) in collection.requests.iter().enumerate() {
            let draft = RequestDraft::from_request(&saved.request);
            write_atomic(
                &requests_dir.join(format!("{index}.req")),
                &encode_request(Some(&saved.name), &draft),
            )?;
        }

        write_atomic(&dir.join("cookies.jar"), &encode_jar(&collection.jar))?;
        tracing::debug!(id = collection.id, name = %collection.name, "collection saved");
        Ok(())
    }

    /// Load every collection under the state directory. Unreadable entries
    /// are skipped with a log line, never an error.
    pub fn load_collections(&self) -> Vec<Collection> {
        let mut collections = Vec::new();
        let Ok(entries) = fs::read_dir(self.collections_dir()) else {
            return collections;
        };
        for entry in entries.flatten() {
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            match self.load_collection_dir(&dir) {
                Some(collection) => collections.push(collection),
                None => tracing::warn!(?dir, "skipping unreadable collection"),
            }
        }
        collections.sort_by_key(|c| c.id);
        collections
    }

    fn load_collection_dir(&self, dir: &Path) -> Option<Collection> {
        let manifest = fs::read_to_string(dir.join("manifest")).ok()?;
        let mut name = String::from("Untitled");
        let mut id: Option<u64> = None;
        let mut modified: Option<DateTime<Utc>> = None;
        let mut request_count = 0usize;
        for line in manifest.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            match key {
                "name" => name = value.to_string(),
                "id" => id = value.parse().ok(),
                "modified" => {
                    modified = DateTime::parse_from_rfc3339(value)
                        .ok()
                        .map(|t| t.with_timezone(&Utc))
                }
                "request_count" => request_count = value.parse().unwrap_or(0).min(10_000),
                _ => {} // unknown keys are skipped
            }
        }
        // directory name is the authority of last resort for the id
        let id = id.or_else(|| dir.file_name()?.to_str()?.parse().ok())?;

        let mut requests = Vec::new();
        for index in 0..request_count {
            let path = dir.join("requests").join(format!("{index}.req"));
            let Ok(text) = fs::read_to_string(&path) else {
                continue;
            };
            let (request_name, draft) = decode_request(&text);
            requests.push(SavedRequest {
                name: request_name.unwrap_or_else(|| format!("Request {}", index + 1)),
                request: draft.freeze(),
            });
        }

        let jar = fs::read_to_string(dir.join("cookies.jar"))
            .map(|text| decode_jar(&text))
            .unwrap_or_default();

        Some(Collection {
            id,
            name,
            requests,
            jar,
            modified: modified.unwrap_or_else(Utc::now),
            dirty: false,
        })
    }

    pub fn delete_collection(&self, id: u64) -> Result<()> {
        let dir = self.collection_dir(id);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self::new()
    }
}

/// Debounced per-collection save policy
pub struct Autosaver {
    debounce: Duration,
    last_save: HashMap<u64, Instant>,
}

impl Autosaver {
    pub fn new() -> Self {
        Self::with_debounce(AUTOSAVE_DEBOUNCE)
    }

    pub fn with_debounce(debounce: Duration) -> Self {
        Autosaver {
            debounce,
            last_save: HashMap::new(),
        }
    }

    /// Dirty and outside the debounce window
    pub fn due(&self, collection: &Collection) -> bool {
        collection.dirty
            && self
                .last_save
                .get(&collection.id)
                .map_or(true, |saved| saved.elapsed() > self.debounce)
    }

    pub fn mark_saved(&mut self, id: u64) {
        self.last_save.insert(id, Instant::now());
    }

    pub fn forget(&mut self, id: u64) {
        self.last_save.remove(&id);
    }
}

impl Default for Autosaver {
    fn default() -> Self {
        Self::new()
    }
}

/// Write-to-temp in the target directory, then atomic rename over the path
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.persist(path)
        .with_context(|| format!("cannot replace {path:?}"))?;
    Ok(())
}

const METHOD_ORDER: [HttpMethod; 7] = [
    HttpMethod::GET,
    HttpMethod::POST,
    HttpMethod::PUT,
    HttpMethod::DELETE,
    HttpMethod::PATCH,
    HttpMethod::HEAD,
    HttpMethod::OPTIONS,
];

fn method_index(method: &HttpMethod) -> usize {
    METHOD_ORDER.iter().position(|m| m == method).unwrap_or(0)
}

fn escape_body(body: &str) -> String {
    body.replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

fn unescape_body(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Encode a request in the snapshot schema. A custom method is written as
/// `method=0` plus the extra `method_custom=` key, which older loaders skip.
fn encode_request(name: Option<&str>, draft: &RequestDraft) -> String {
    let mut out = String::new();
    if let Some(name) = name {
        out.push_str(&format!("name={name}\n"));
    }
    out.push_str(&format!("method={}\n", method_index(&draft.method)));
    if let HttpMethod::Custom(custom) = &draft.method {
        out.push_str(&format!("method_custom={custom}\n"));
    }
    out.push_str(&format!("url={}\n", draft.url));
    out.push_str(&format!("body={}\n", escape_body(&draft.body)));
    out.push_str(&format!("header_count={}\n", draft.headers.len()));
    for (index, header) in draft.headers.iter().enumerate() {
        out.push_str(&format!("header_{index}={}: {}\n", header.name, header.value));
    }
    out
}

/// Tolerant decode of the snapshot schema
fn decode_request(text: &str) -> (Option<String>, RequestDraft) {
    let mut name = None;
    let mut url = String::new();
    let mut body = String::new();
    let mut method_idx = 0usize;
    let mut custom: Option<String> = None;
    let mut header_count = 0usize;
    let mut headers: Vec<(usize, Header)> = Vec::new();

    for line in text.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key {
            "name" => name = Some(value.to_string()),
            "method" => method_idx = value.parse().unwrap_or(0).min(METHOD_ORDER.len() - 1),
            "method_custom" => custom = Some(value.to_string()),
            "url" => url = value.to_string(),
            "body" => body = unescape_body(value),
            "header_count" => header_count = value.parse().unwrap_or(0).min(MAX_HEADERS),
            _ => {
                if let Some(index) = key
                    .strip_prefix("header_")
                    .and_then(|s| s.parse::<usize>().ok())
                {
                    // surrounding whitespace in values is trimmed on load
                    if let Ok((header_name, header_value)) = validate_header_line(value) {
                        headers.push((index, Header::new(header_name, header_value)));
                    }
                }
                // unknown keys are skipped
            }
        }
    }

    headers.sort_by_key(|(index, _)| *index);
    let headers = headers
        .into_iter()
        .filter(|(index, _)| *index < header_count)
        .map(|(_, header)| header)
        .collect();

    let method = match custom {
        Some(custom_name) => HttpMethod::Custom(custom_name),
        None => METHOD_ORDER[method_idx].clone(),
    };

    (
        name,
        RequestDraft {
            method,
            url,
            headers,
            body,
            edited: false,
        },
    )
}

fn encode_jar(jar: &CookieJar) -> String {
    let mut out = String::new();
    for cookie in jar.iter() {
        let expiry = match cookie.expires {
            Some(when) => when.timestamp().to_string(),
            None => "session".to_string(),
        };
        let mut flags = Vec::new();
        if cookie.secure {
            flags.push("secure");
        }
        if cookie.http_only {
            flags.push("httponly");
        }
        if cookie.host_only {
            flags.push("hostonly");
        }
        let flags = if flags.is_empty() {
            "-".to_string()
        } else {
            flags.join(",")
        };
        out.push_str(&format!(
            "{}\t{}\t{}\t{}\t{}\t{}\n",
            cookie.name, cookie.value, cookie.domain, cookie.path, expiry, flags
        ));
    }
    out
}

fn decode_jar(text: &str) -> CookieJar {
    let mut jar = CookieJar::default();
    for line in text.lines() {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 6 || fields[0].is_empty() || !fields[3].starts_with('/') {
            continue;
        }
        let expires = match fields[4] {
            "session" => None,
            raw => raw
                .parse::<i64>()
                .ok()
                .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        };
        let flags: Vec<&str> = fields[5].split(',').collect();
        jar.store(StoredCookie {
            name: fields[0].to_string(),
            value: fields[1].to_string(),
            domain: fields[2].to_string(),
            path: fields[3].to_string(),
            expires,
            secure: flags.contains(&"secure"),
            http_only: flags.contains(&"httponly"),
            host_only: flags.contains(&"hostonly"),
            origin: format!("https://{}{}", fields[2], fields[3]),
        });
    }
    jar
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn draft() -> RequestDraft {
        RequestDraft {
            method: HttpMethod::POST,
            url: "https://api.example.com/users".to_string(),
            headers: vec![
                Header::new("Content-Type", "application/json"),
                Header::new("X-Trace", "abc"),
            ],
            body: "line one\nline two\\with backslash".to_string(),
            edited: true,
        }
    }

    #[test]
    fn test_request_state_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let storage = Storage::with_root(tmp.path());
        storage.init().unwrap();

        storage.save_request_state(&draft()).unwrap();
        let loaded = storage.load_request_state().unwrap();
        assert_eq!(loaded.method, HttpMethod::POST);
        assert_eq!(loaded.url, draft().url);
        assert_eq!(loaded.body, draft().body);
        assert_eq!(loaded.headers, draft().headers);
        // the edit flag is runtime state, never persisted
        assert!(!loaded.edited);
    }

    #[test]
    fn test_custom_method_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let storage = Storage::with_root(tmp.path());
        let mut d = draft();
        d.method = HttpMethod::Custom("PURGE".to_string());
        storage.save_request_state(&d).unwrap();
        let loaded = storage.load_request_state().unwrap();
        assert_eq!(loaded.method, HttpMethod::Custom("PURGE".to_string()));
    }

    #[test]
    fn test_load_missing_state_is_none() {
        let tmp = TempDir::new().unwrap();
        let storage = Storage::with_root(tmp.path());
        assert!(storage.load_request_state().is_none());
    }

    #[test]
    fn test_decode_tolerates_garbage() {
        let text = "method=99\nfuture_key=whatever\nnot a key value line\nurl=https://example.com\nheader_count=2\nheader_0=Accept: */*\nheader_1=broken header line\n";
        let (_, decoded) = decode_request(text);
        // out-of-range method clamps
        assert_eq!(decoded.method, HttpMethod::OPTIONS);
        assert_eq!(decoded.url, "https://example.com");
        // the unparseable header resets away, the good one survives
        assert_eq!(decoded.headers, vec![Header::new("Accept", "*/*")]);
    }

    #[test]
    fn test_header_values_trimmed_on_load() {
        let text = "method=0\nurl=https://example.com\nheader_count=1\nheader_0=Accept:   */*  \n";
        let (_, decoded) = decode_request(text);
        assert_eq!(decoded.headers, vec![Header::new("Accept", "*/*")]);
    }

    #[test]
    fn test_collection_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let storage = Storage::with_root(tmp.path());
        storage.init().unwrap();

        let mut collection = Collection::new(7, "My API");
        collection.requests.push(SavedRequest {
            name: "Create user".to_string(),
            request: draft().freeze(),
        });
        collection
            .jar
            .parse_set_cookie(
                "sid=abc; Path=/; Secure; Max-Age=3600",
                "https://api.example.com/",
            )
            .unwrap();

        storage.save_collection(&collection).unwrap();
        let loaded = storage.load_collections();
        assert_eq!(loaded.len(), 1);
        let loaded = &loaded[0];
        assert_eq!(loaded.id, 7);
        assert_eq!(loaded.name, "My API");
        assert_eq!(loaded.requests.len(), 1);
        assert_eq!(loaded.requests[0].name, "Create user");
        assert_eq!(loaded.requests[0].request, draft().freeze());
        assert_eq!(loaded.jar.len(), 1);
        let cookie = loaded.jar.get(0).unwrap();
        assert_eq!(cookie.name, "sid");
        assert!(cookie.secure);
        assert!(cookie.host_only);
        assert!(cookie.expires.is_some());
        assert!(!loaded.dirty);
    }

    #[test]
    fn test_save_drops_removed_requests() {
        let tmp = TempDir::new().unwrap();
        let storage = Storage::with_root(tmp.path());
        storage.init().unwrap();

        let mut collection = Collection::new(1, "c");
        for name in ["a", "b"] {
            collection.requests.push(SavedRequest {
                name: name.to_string(),
                request: draft().freeze(),
            });
        }
        storage.save_collection(&collection).unwrap();

        collection.requests.remove(0);
        storage.save_collection(&collection).unwrap();

        let loaded = storage.load_collections();
        assert_eq!(loaded[0].requests.len(), 1);
        assert_eq!(loaded[0].requests[0].name, "b");
    }

    #[test]
    fn test_delete_collection() {
        let tmp = TempDir::new().unwrap();
        let storage = Storage::with_root(tmp.path());
        storage.init().unwrap();
        storage.save_collection(&Collection::new(3, "gone")).unwrap();
        assert_eq!(storage.load_collections().len(), 1);
        storage.delete_collection(3).unwrap();
        assert!(storage.load_collections().is_empty());
    }

    #[test]
    fn test_session_cookie_expiry_roundtrip() {
        let mut jar = CookieJar::default();
        jar.parse_set_cookie("sid=abc; Path=/", "https://a.example.com/")
            .unwrap();
        let decoded = decode_jar(&encode_jar(&jar));
        assert_eq!(decoded.get(0).unwrap().expires, None);
    }

    #[test]
    fn test_autosaver_debounce() {
        let mut autosaver = Autosaver::with_debounce(Duration::from_millis(50));
        let mut collection = Collection::new(1, "c");
        assert!(!autosaver.due(&collection));

        collection.touch();
        assert!(autosaver.due(&collection));

        autosaver.mark_saved(collection.id);
        assert!(!autosaver.due(&collection));

        std::thread::sleep(Duration::from_millis(60));
        assert!(autosaver.due(&collection));
    }
}
