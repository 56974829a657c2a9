//! Byte retrieval from network or local origins.
//!
//! Local paths are read directly; http(s) URLs go through a [`Fetcher`]
//! implementation. The default one is [`HttpFetcher`], a blocking `reqwest`
//! client with connect and overall timeouts and a response size cap.

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::{RepoError, RepoResult};

/// Connect timeout for network origins.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Overall timeout for a single request, body included.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum accepted response body (50 MB).
pub const MAX_DOWNLOAD_SIZE: u64 = 50 * 1024 * 1024;

/// Where bytes come from: a network URL or a filesystem path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Origin {
    /// `http://` or `https://` location.
    Url(Url),
    /// Local file or directory.
    Path(PathBuf),
}

impl Origin {
    /// Parses a location string.
    ///
    /// `http(s)://` becomes [`Origin::Url`], `file://` and anything without a
    /// scheme becomes [`Origin::Path`].
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::Parse`] for empty input, malformed URLs or
    /// unsupported schemes.
    pub fn parse(location: &str) -> RepoResult<Self> {
        let location = location.trim();
        if location.is_empty() {
            return Err(parse_error(location, "empty location"));
        }

        if !location.contains("://") {
            return Ok(Self::Path(PathBuf::from(location)));
        }

        let url = Url::parse(location).map_err(|e| parse_error(location, &e.to_string()))?;
        match url.scheme() {
            "http" | "https" => Ok(Self::Url(url)),
            "file" => url
                .to_file_path()
                .map(Self::Path)
                .map_err(|()| parse_error(location, "not a valid file URL")),
            scheme => Err(parse_error(
                location,
                &format!("unsupported scheme '{scheme}'"),
            )),
        }
    }

    /// Returns true for filesystem origins.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Path(_))
    }

    /// Returns the filesystem path for local origins.
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::Path(path) => Some(path),
            Self::Url(_) => None,
        }
    }

    /// Returns true for plain-HTTP URLs.
    pub fn is_plain_http(&self) -> bool {
        matches!(self, Self::Url(url) if url.scheme() == "http")
    }

    /// Resolves a reference found inside the document at `self`.
    ///
    /// Absolute URLs and absolute paths are taken as-is; anything else is
    /// relative to the directory containing `self`.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::Parse`] if the reference cannot be parsed or joined.
    pub fn resolve(&self, reference: &str) -> RepoResult<Self> {
        let reference = reference.trim();
        if reference.contains("://") {
            return Self::parse(reference);
        }
        if Path::new(reference).is_absolute() {
            return Ok(Self::Path(PathBuf::from(reference)));
        }

        match self {
            Self::Url(url) => url
                .join(reference)
                .map(Self::Url)
                .map_err(|e| parse_error(reference, &e.to_string())),
            Self::Path(path) => {
                let base = path.parent().unwrap_or_else(|| Path::new("."));
                Ok(Self::Path(base.join(reference)))
            }
        }
    }

    /// Treats `self` as a directory and appends a relative path to it.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::Parse`] if the URL cannot be joined.
    pub fn join(&self, relative: &str) -> RepoResult<Self> {
        let relative = relative.trim_start_matches('/');
        match self {
            Self::Url(url) => {
                let mut base = url.clone();
                if !base.path().ends_with('/') {
                    let dir = format!("{}/", base.path());
                    base.set_path(&dir);
                }
                base.join(relative)
                    .map(Self::Url)
                    .map_err(|e| parse_error(relative, &e.to_string()))
            }
            Self::Path(path) => Ok(Self::Path(path.join(relative))),
        }
    }

    /// Returns the directory containing `self`.
    pub fn parent(&self) -> Option<Self> {
        match self {
            Self::Url(url) => url.join(".").ok().map(Self::Url),
            Self::Path(path) => path.parent().map(|p| Self::Path(p.to_path_buf())),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => write!(f, "{url}"),
            Self::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

fn parse_error(location: &str, reason: &str) -> RepoError {
    RepoError::Parse {
        what: format!("origin '{location}'"),
        reason: reason.to_string(),
    }
}

/// Transfer settings derived from the current configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Permit plain HTTP and invalid TLS certificates.
    pub allow_insecure: bool,
}

impl FetchPolicy {
    /// Builds the policy from configuration.
    pub fn from_config(config: &scriptrepo_config::Config) -> Self {
        Self {
            allow_insecure: config.allow_insecure_downloads,
        }
    }
}

/// Retrieves raw bytes from an origin.
pub trait Fetcher: Send + Sync {
    /// Performs a network GET.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::Transport`] or [`RepoError::NotFound`] on failure.
    fn fetch_url(&self, url: &Url, policy: FetchPolicy) -> RepoResult<Vec<u8>>;

    /// Reads bytes from any origin, enforcing the insecure-origin policy.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::Insecure`] for plain HTTP when not allowed, or the
    /// error of the underlying transfer.
    fn fetch(&self, origin: &Origin, policy: FetchPolicy) -> RepoResult<Vec<u8>> {
        match origin {
            Origin::Path(path) => read_local(path),
            Origin::Url(url) => {
                if origin.is_plain_http() && !policy.allow_insecure {
                    return Err(RepoError::Insecure {
                        origin: url.to_string(),
                    });
                }
                self.fetch_url(url, policy)
            }
        }
    }
}

fn read_local(path: &Path) -> RepoResult<Vec<u8>> {
    debug!(path = %path.display(), "reading local origin");
    let metadata = std::fs::metadata(path).map_err(|e| RepoError::io(path, e))?;
    if metadata.len() > MAX_DOWNLOAD_SIZE {
        return Err(RepoError::Transport {
            origin: path.display().to_string(),
            reason: format!("file exceeds {MAX_DOWNLOAD_SIZE} bytes"),
        });
    }
    std::fs::read(path).map_err(|e| RepoError::io(path, e))
}

/// Blocking HTTP fetcher.
pub struct HttpFetcher {
    strict: reqwest::blocking::Client,
    insecure: reqwest::blocking::Client,
}

impl HttpFetcher {
    /// Creates a fetcher with the default timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::Transport`] if the TLS backend cannot be initialized.
    pub fn new() -> RepoResult<Self> {
        Ok(Self {
            strict: Self::client(false)?,
            insecure: Self::client(true)?,
        })
    }

    fn client(accept_invalid_certs: bool) -> RepoResult<reqwest::blocking::Client> {
        reqwest::blocking::Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|e| RepoError::Transport {
                origin: "http client".to_string(),
                reason: e.to_string(),
            })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch_url(&self, url: &Url, policy: FetchPolicy) -> RepoResult<Vec<u8>> {
        debug!(%url, "fetching");

        let client = if policy.allow_insecure {
            &self.insecure
        } else {
            &self.strict
        };

        let transport = |reason: String| RepoError::Transport {
            origin: url.to_string(),
            reason,
        };

        let response = client
            .get(url.clone())
            .send()
            .map_err(|e| transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RepoError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(transport(format!("HTTP {status}")));
        }
        if response
            .content_length()
            .is_some_and(|len| len > MAX_DOWNLOAD_SIZE)
        {
            return Err(transport(format!(
                "response exceeds {MAX_DOWNLOAD_SIZE} bytes"
            )));
        }

        let mut bytes = Vec::new();
        response
            .take(MAX_DOWNLOAD_SIZE + 1)
            .read_to_end(&mut bytes)
            .map_err(|e| transport(format!("failed to read body: {e}")))?;

        if bytes.len() as u64 > MAX_DOWNLOAD_SIZE {
            return Err(transport(format!(
                "response exceeds {MAX_DOWNLOAD_SIZE} bytes"
            )));
        }

        Ok(bytes)
    }
}
