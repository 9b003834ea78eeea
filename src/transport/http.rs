//! HTTP(S) downloads.

use super::file_name;
use crate::error::FetchError;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Download `url` into `dest_dir`, keeping its file name.
pub fn download(url: &str, dest_dir: &Path) -> Result<PathBuf, FetchError> {
    let client = reqwest::blocking::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| FetchError::Failed {
            url: url.to_string(),
            message: e.to_string(),
        })?;
    download_with(&client, url, dest_dir)
}

fn download_with(
    client: &reqwest::blocking::Client,
    url: &str,
    dest_dir: &Path,
) -> Result<PathBuf, FetchError> {
    let dest = dest_dir.join(file_name(url)?);
    let failed = |e: reqwest::Error| FetchError::Failed {
        url: url.to_string(),
        message: e.to_string(),
    };
    let body = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .and_then(|r| r.bytes())
        .map_err(failed)?;

    std::fs::create_dir_all(dest_dir).map_err(|e| FetchError::Io {
        url: url.to_string(),
        source: e,
    })?;
    std::fs::write(&dest, &body).map_err(|e| FetchError::Io {
        url: url.to_string(),
        source: e,
    })?;
    tracing::debug!(url, dest = %dest.display(), bytes = body.len(), "downloaded");
    Ok(dest)
}
