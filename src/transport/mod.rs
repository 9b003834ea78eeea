//! Fetch transport: bring a plan file from some location into a directory.
//!
//! Local paths and `file://` URLs are copied; `http(s)://` URLs are
//! downloaded with a blocking `reqwest` client.

pub mod http;
pub mod local;

use crate::error::FetchError;
use std::path::{Path, PathBuf};

/// Output of an external command.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Places the file named by `url` into `dest_dir`.
pub trait Fetcher {
    /// Returns the path of the fetched file.
    fn fetch(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, FetchError>;
}

/// Dispatches to [`local`] or [`http`] based on the URL scheme.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFetcher;

impl Fetcher for DefaultFetcher {
    fn fetch(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, FetchError> {
        tracing::info!(url, dest = %dest_dir.display(), "fetching");
        if is_remote(url) {
            http::download(url, dest_dir)
        } else {
            local::copy_into(url, dest_dir)
        }
    }
}

pub fn is_remote(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// `origin/relative`, without doubling the separator.
pub fn join_url(origin: &str, relative: &str) -> String {
    format!(
        "{}/{}",
        origin.trim_end_matches('/'),
        relative.trim_start_matches("./")
    )
}

/// Last path segment of a URL, query string and fragment dropped.
pub fn file_name(url: &str) -> Result<String, FetchError> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => Err(FetchError::Failed {
            url: url.to_string(),
            message: "no file name in location".to_string(),
        }),
    }
}
