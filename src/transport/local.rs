//! Local transport: file copies and external commands.

use super::{file_name, ExecOutput};
use crate::core::parser::expand_home;
use crate::error::FetchError;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Copy a local path or `file://` URL into `dest_dir`.
pub fn copy_into(url: &str, dest_dir: &Path) -> Result<PathBuf, FetchError> {
    let source = expand_home(url.strip_prefix("file://").unwrap_or(url));
    let dest = dest_dir.join(file_name(url)?);
    if !source.is_file() {
        return Err(FetchError::Failed {
            url: url.to_string(),
            message: format!("{} is not a file", source.display()),
        });
    }
    let io_err = |e| FetchError::Io {
        url: url.to_string(),
        source: e,
    };
    std::fs::create_dir_all(dest_dir).map_err(io_err)?;
    if same_file(&source, &dest) {
        return Ok(dest);
    }
    std::fs::copy(&source, &dest).map_err(io_err)?;
    Ok(dest)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Run `program args...` in `cwd`, capturing its output.
pub fn run(program: &str, args: &[&str], cwd: &Path) -> std::io::Result<ExecOutput> {
    let output = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()?;
    Ok(ExecOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}
