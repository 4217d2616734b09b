//! Object storage behind a small trait: local filesystem paths and HTTP
//! endpoints (plain HTTPS object storage for reads, WebDAV for writes),
//! routed by href scheme.
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use thiserror::Error;
use tracing::debug;

use super::href;
use crate::core::params::StorageParams;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {status} for {method} {url}")]
    Status {
        method: &'static str,
        url: String,
        status: StatusCode,
    },
    #[error("Cannot read token file {path}: {source}")]
    Token {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Not valid UTF-8: {0}")]
    Encoding(String),
    #[error("Unsupported href: {0}")]
    Unsupported(String),
}

fn io_error(path: &str) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_string(),
        source,
    }
}

/// Blocking access to catalog documents, rasters and archives.
pub trait ObjectStore {
    fn read(&self, href: &str) -> Result<Vec<u8>, StoreError>;

    fn write(&self, href: &str, data: &[u8]) -> Result<(), StoreError>;

    fn exists(&self, href: &str) -> Result<bool, StoreError>;

    fn read_to_string(&self, href: &str) -> Result<String, StoreError> {
        String::from_utf8(self.read(href)?).map_err(|_| StoreError::Encoding(href.to_string()))
    }

    /// Download `href` into `local_dir`, keeping its file name.
    fn get_file(&self, href: &str, local_dir: &Path) -> Result<PathBuf, StoreError> {
        let data = self.read(href)?;
        let path = local_dir.join(href::file_name(href));
        let display = path.display().to_string();
        fs::write(&path, data).map_err(io_error(&display))?;
        Ok(path)
    }

    /// Upload the local file `path` to `href`.
    fn put_file(&self, path: &Path, href: &str) -> Result<(), StoreError> {
        let display = path.display().to_string();
        let data = fs::read(path).map_err(io_error(&display))?;
        self.write(href, &data)
    }
}

/// Filesystem paths, with or without a `file://` prefix.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalStore;

impl LocalStore {
    fn path(href: &str) -> &Path {
        Path::new(href.strip_prefix("file://").unwrap_or(href))
    }
}

impl ObjectStore for LocalStore {
    fn read(&self, href: &str) -> Result<Vec<u8>, StoreError> {
        fs::read(Self::path(href)).map_err(io_error(href))
    }

    fn write(&self, href: &str, data: &[u8]) -> Result<(), StoreError> {
        let path = Self::path(href);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error(href))?;
        }
        fs::write(path, data).map_err(io_error(href))
    }

    fn exists(&self, href: &str) -> Result<bool, StoreError> {
        Ok(Self::path(href).exists())
    }
}

/// HTTP(S) endpoints. Reads are plain GETs; writes are WebDAV PUTs. When a
/// PUT fails because its parent collection is missing, the missing
/// collections are created with `MKCOL` and the PUT is retried. A bearer
/// token, when present, is sent to hrefs under `token_prefix` (every href
/// when the prefix is unset).
pub struct HttpStore {
    client: Client,
    token: Option<String>,
    token_prefix: Option<String>,
}

impl HttpStore {
    pub fn new(token: Option<String>, timeout: Option<Duration>) -> Result<Self, StoreError> {
        let mut builder = Client::builder().user_agent(concat!("glacierprep/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(HttpStore {
            client: builder.build()?,
            token,
            token_prefix: None,
        })
    }

    pub fn with_token_prefix(mut self, prefix: Option<String>) -> Self {
        self.token_prefix = prefix;
        self
    }

    fn sends_token(&self, url: &str) -> bool {
        self.token_prefix.as_deref().is_none_or(|prefix| url.starts_with(prefix))
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::blocking::RequestBuilder {
        let request = self.client.request(method, url);
        match &self.token {
            Some(token) if self.sends_token(url) => request.bearer_auth(token),
            _ => request,
        }
    }

    fn put(&self, url: &str, data: &[u8]) -> Result<StatusCode, StoreError> {
        debug!("PUT {} ({} bytes)", url, data.len());
        Ok(self.request(reqwest::Method::PUT, url).body(data.to_vec()).send()?.status())
    }

    fn mkcol(&self, collection: &str) -> Result<StatusCode, StoreError> {
        let method = reqwest::Method::from_bytes(b"MKCOL").map_err(|e| StoreError::Unsupported(e.to_string()))?;
        let status = self.request(method, &format!("{collection}/")).send()?.status();
        debug!("MKCOL {} -> {}", collection, status);
        Ok(status)
    }

    /// Create the missing collections above `url`. Walks up until a
    /// collection exists (or cannot be touched), then creates the missing
    /// ones top-down.
    fn create_parents(&self, url: &str) -> Result<(), StoreError> {
        let mut missing = Vec::new();
        let mut dir = href::dirname(url);
        while href::is_url(&dir) && !dir.ends_with('/') {
            match self.mkcol(&dir)? {
                status if status.is_success() => break,
                // 405: exists; 403: outside the token's scope, taken as existing
                StatusCode::METHOD_NOT_ALLOWED | StatusCode::FORBIDDEN => break,
                StatusCode::CONFLICT | StatusCode::NOT_FOUND => {
                    let parent = href::dirname(&dir);
                    if parent == dir {
                        break;
                    }
                    missing.push(std::mem::replace(&mut dir, parent));
                }
                status => {
                    return Err(StoreError::Status {
                        method: "MKCOL",
                        url: dir,
                        status,
                    });
                }
            }
        }
        for collection in missing.into_iter().rev() {
            let status = self.mkcol(&collection)?;
            if !status.is_success() && status != StatusCode::METHOD_NOT_ALLOWED {
                return Err(StoreError::Status {
                    method: "MKCOL",
                    url: collection,
                    status,
                });
            }
        }
        Ok(())
    }
}

impl ObjectStore for HttpStore {
    fn read(&self, href: &str) -> Result<Vec<u8>, StoreError> {
        debug!("GET {}", href);
        let response = self.request(reqwest::Method::GET, href).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Status {
                method: "GET",
                url: href.to_string(),
                status,
            });
        }
        Ok(response.bytes()?.to_vec())
    }

    fn write(&self, href: &str, data: &[u8]) -> Result<(), StoreError> {
        let mut status = self.put(href, data)?;
        if status == StatusCode::CONFLICT || status == StatusCode::NOT_FOUND {
            self.create_parents(href)?;
            status = self.put(href, data)?;
        }
        if !status.is_success() {
            return Err(StoreError::Status {
                method: "PUT",
                url: href.to_string(),
                status,
            });
        }
        Ok(())
    }

    fn exists(&self, href: &str) -> Result<bool, StoreError> {
        let status = self.request(reqwest::Method::HEAD, href).send()?.status();
        match status {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(StoreError::Status {
                method: "HEAD",
                url: href.to_string(),
                status,
            }),
        }
    }
}

/// Routes hrefs to the HTTP store or the local filesystem.
pub struct Storage {
    local: LocalStore,
    http: HttpStore,
}

impl Storage {
    pub fn new(params: &StorageParams) -> Result<Self, StoreError> {
        let token = params.token_path.as_deref().map(read_token).transpose()?;
        let timeout = params.timeout_secs.map(Duration::from_secs);
        Ok(Storage {
            local: LocalStore,
            http: HttpStore::new(token, timeout)?.with_token_prefix(params.token_url_prefix.clone()),
        })
    }

    fn route(&self, href: &str) -> Result<&dyn ObjectStore, StoreError> {
        if href.starts_with("http://") || href.starts_with("https://") {
            Ok(&self.http)
        } else if href.starts_with("file://") || !href::is_url(href) {
            Ok(&self.local)
        } else {
            Err(StoreError::Unsupported(href.to_string()))
        }
    }
}

impl ObjectStore for Storage {
    fn read(&self, href: &str) -> Result<Vec<u8>, StoreError> {
        self.route(href)?.read(href)
    }

    fn write(&self, href: &str, data: &[u8]) -> Result<(), StoreError> {
        self.route(href)?.write(href, data)
    }

    fn exists(&self, href: &str) -> Result<bool, StoreError> {
        self.route(href)?.exists(href)
    }
}

/// Read a bearer token (e.g. a dCache macaroon) from a file.
pub fn read_token(path: &Path) -> Result<String, StoreError> {
    fs::read_to_string(path)
        .map(|t| t.trim().to_string())
        .map_err(|source| StoreError::Token {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex};

    #[test]
    fn local_store_round_trip_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let href = format!("{}/a/b/data.bin", dir.path().display());
        let store = LocalStore;
        assert!(!store.exists(&href).unwrap());
        store.write(&href, b"abc").unwrap();
        assert!(store.exists(&format!("file://{href}")).unwrap());
        assert_eq!(store.read(&href).unwrap(), b"abc");

        let out = tempfile::tempdir().unwrap();
        let local = store.get_file(&href, out.path()).unwrap();
        assert_eq!(local, out.path().join("data.bin"));
        let copy = format!("{}/copy/data.bin", dir.path().display());
        store.put_file(&local, &copy).unwrap();
        assert_eq!(store.read_to_string(&copy).unwrap(), "abc");
    }

    #[test]
    fn storage_routes_by_scheme() {
        let storage = Storage::new(&StorageParams::default()).unwrap();
        assert!(storage.route("/tmp/x").is_ok());
        assert!(storage.route("https://host/x").is_ok());
        assert!(matches!(
            storage.route("s3://bucket/x"),
            Err(StoreError::Unsupported(_))
        ));
    }

    #[test]
    fn token_only_sent_under_prefix() {
        let store = HttpStore::new(Some("t".into()), None)
            .unwrap()
            .with_token_prefix(Some("https://webdav.example:2880/".into()));
        assert!(store.sends_token("https://webdav.example:2880/data/x.tif"));
        assert!(!store.sends_token("https://sentinel-s2-l1c.s3.amazonaws.com/x.jp2"));
        let open = HttpStore::new(None, None).unwrap();
        assert!(open.sends_token("https://anything"));
    }

    /// WebDAV endpoint on a local port whose token only covers `scope`:
    /// MKCOL elsewhere answers 403. Returns the base URL and the request log.
    fn webdav(scope: &'static str, existing: &[&str]) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let log = Arc::new(Mutex::new(Vec::new()));
        let requests = Arc::clone(&log);
        let mut collections: HashSet<String> = existing.iter().map(|c| c.to_string()).collect();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let mut stream = stream.unwrap();
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                let mut words = line.split_whitespace();
                let method = words.next().unwrap_or_default().to_string();
                let path = words.next().unwrap_or_default().to_string();
                let mut length = 0;
                loop {
                    let mut header = String::new();
                    reader.read_line(&mut header).unwrap();
                    if header.trim().is_empty() {
                        break;
                    }
                    if let Some((name, value)) = header.split_once(':') {
                        if name.eq_ignore_ascii_case("content-length") {
                            length = value.trim().parse().unwrap();
                        }
                    }
                }
                let mut body = vec![0; length];
                reader.read_exact(&mut body).unwrap();

                let parent = format!("{}/", href::dirname(path.trim_end_matches('/')));
                let status = match method.as_str() {
                    "PUT" if collections.contains(&parent) => 201,
                    "PUT" => 409,
                    "MKCOL" if !path.starts_with(scope) => 403,
                    "MKCOL" if collections.contains(&path) => 405,
                    "MKCOL" if collections.contains(&parent) => {
                        collections.insert(path.clone());
                        201
                    }
                    "MKCOL" => 409,
                    _ => 400,
                };
                requests.lock().unwrap().push(format!("{method} {path} -> {status}"));
                write!(stream, "HTTP/1.1 {status} Status\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").unwrap();
            }
        });
        (base, log)
    }

    #[test]
    fn put_creates_missing_parents_inside_token_scope() {
        let (base, log) = webdav("/pnfs/site/data/", &["/pnfs/site/data/"]);
        let store = HttpStore::new(Some("macaroon".into()), None).unwrap();
        store
            .write(&format!("{base}/pnfs/site/data/rg/dem/05VMG.tif"), b"tif")
            .unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            [
                "PUT /pnfs/site/data/rg/dem/05VMG.tif -> 409",
                "MKCOL /pnfs/site/data/rg/dem/ -> 409",
                "MKCOL /pnfs/site/data/rg/ -> 201",
                "MKCOL /pnfs/site/data/rg/dem/ -> 201",
                "PUT /pnfs/site/data/rg/dem/05VMG.tif -> 201",
            ]
        );

        log.lock().unwrap().clear();
        store
            .write(&format!("{base}/pnfs/site/data/rg/dem/05VNG.tif"), b"tif")
            .unwrap();
        assert_eq!(*log.lock().unwrap(), ["PUT /pnfs/site/data/rg/dem/05VNG.tif -> 201"]);
    }

    #[test]
    fn forbidden_ancestor_is_taken_as_existing() {
        // `other/` lies outside the token scope, so no collection is created
        let (base, log) = webdav("/pnfs/site/data/rg/", &["/pnfs/site/data/", "/pnfs/site/data/rg/"]);
        let store = HttpStore::new(Some("macaroon".into()), None).unwrap();
        let err = store
            .write(&format!("{base}/pnfs/site/data/other/05VMG.tif"), b"tif")
            .unwrap_err();
        assert!(matches!(err, StoreError::Status { method: "PUT", .. }));
        assert_eq!(
            *log.lock().unwrap(),
            [
                "PUT /pnfs/site/data/other/05VMG.tif -> 409",
                "MKCOL /pnfs/site/data/other/ -> 403",
                "PUT /pnfs/site/data/other/05VMG.tif -> 409",
            ]
        );
    }

    #[test]
    fn token_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("macaroon.dat");
        fs::write(&path, "  secret-token\n").unwrap();
        assert_eq!(read_token(&path).unwrap(), "secret-token");
        assert!(read_token(&dir.path().join("missing")).is_err());
    }
}
