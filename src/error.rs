//! Error taxonomy shared by the settings store, the client resolver, the
//! template renderer and the parameter resolver.
//!
//! Every failure is returned to the caller; only the binary decides the
//! process exit code.

use std::path::PathBuf;

/// Malformed or missing settings, bad secrets, invalid client selection.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("couldn't parse yaml in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("couldn't parse empty {0}")]
    EmptyConfig(PathBuf),

    #[error("no configuration found nor local hypervisor")]
    NoLocalHypervisor,

    #[error("missing secret for {section}/{key}")]
    MissingSecret { section: String, key: String },

    #[error("missing default section in config file")]
    MissingDefaultSection,

    #[error("missing section for client {0} in config file")]
    MissingClientSection(String),

    #[error("client {0} not found in config")]
    UnknownClient(String),

    #[error("client {0} is currently the default")]
    ClientIsDefault(String),

    #[error("no enabled client found in config")]
    NoEnabledClients,

    #[error("disabled hypervisor {0}")]
    DisabledClient(String),

    #[error("disabled group {0}")]
    DisabledGroup(String),

    #[error("empty group {0}")]
    EmptyGroup(String),

    #[error("group {group} has member {member} which is itself a group")]
    NestedGroup { group: String, member: String },

    #[error("invalid algorithm {0}. Choose between random, balance and free")]
    InvalidAlgorithm(String),

    #[error("incorrect type in profiles {0}")]
    InvalidProfileType(String),

    #[error("profile {0} not found")]
    UnknownProfile(String),

    #[error("profile {profile} has unknown base {base}")]
    UnknownBaseProfile { profile: String, base: String },

    #[error("profile {0} needs at least one option")]
    EmptyProfile(String),

    #[error("invalid value {value} for option {key}: expected {expected}")]
    InvalidOption {
        key: String,
        value: String,
        expected: &'static str,
    },

    #[error("incorrect jenkins mode {0}. Choose between docker, podman or kubernetes")]
    InvalidJenkinsMode(String),
}

/// Template syntax errors and render-time failures.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("cannot read template {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("error rendering {}of file {file}. Got: {message}", line_prefix(.line))]
    Syntax {
        file: String,
        line: Option<usize>,
        message: String,
    },

    #[error("error rendering {}of file {file}. Got: {message}", line_prefix(.line))]
    Render {
        file: String,
        line: Option<usize>,
        message: String,
    },

    #[error("parameters for {file} cannot be used as template context: {message}")]
    Context { file: String, message: String },
}

impl RenderError {
    /// Line of the offending construct, when the engine or the source scan found one.
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Syntax { line, .. } | Self::Render { line, .. } => *line,
            _ => None,
        }
    }
}

fn line_prefix(line: &Option<usize>) -> String {
    line.map(|l| format!("line {} ", l)).unwrap_or_default()
}

/// Failures while fetching a remote base plan or other file.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("fetch of {url} failed: {message}")]
    Failed { url: String, message: String },

    #[error("IO error while fetching {url}: {source}")]
    Io {
        url: String,
        source: std::io::Error,
    },
}

/// Failures of the parameter cascade itself.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("no input file found at {0}")]
    NotFound(PathBuf),

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("couldn't parse yaml in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("{}", hyphen_message(.0))]
    HyphenatedParameters(Vec<String>),

    #[error("rendered plan {path} is not a mapping of resources")]
    NotAMapping { path: PathBuf },

    #[error("cyclic baseplan inheritance: {}", display_chain(.0))]
    CyclicBaseplan(Vec<PathBuf>),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

fn hyphen_message(names: &[String]) -> String {
    names
        .iter()
        .map(|n| format!("Incorrect parameter {}. Hyphens are not allowed.", n))
        .collect::<Vec<_>>()
        .join("\n")
}

fn display_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Top-level error surfaced by the CLI.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("{0}")]
    Usage(String),

    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot serialize output: {0}")]
    Serialize(#[from] serde_yaml_ng::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hyphen_message_names_every_key() {
        let err = ResolveError::HyphenatedParameters(vec!["vm-count".into(), "a-b".into()]);
        let msg = err.to_string();
        assert!(msg.contains("Incorrect parameter vm-count. Hyphens are not allowed."));
        assert!(msg.contains("Incorrect parameter a-b. Hyphens are not allowed."));
    }

    #[test]
    fn test_render_error_line_in_message() {
        let err = RenderError::Render {
            file: "kcli_plan.yml".into(),
            line: Some(7),
            message: "Variable `x` not found".into(),
        };
        assert_eq!(err.line(), Some(7));
        assert!(err.to_string().contains("line 7 of file kcli_plan.yml"));
    }

    #[test]
    fn test_render_error_without_line() {
        let err = RenderError::Syntax {
            file: "a.yml".into(),
            line: None,
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "error rendering of file a.yml. Got: boom");
    }

    #[test]
    fn test_cycle_chain_display() {
        let err = ResolveError::CyclicBaseplan(vec!["a.yml".into(), "b.yml".into(), "a.yml".into()]);
        assert_eq!(err.to_string(), "cyclic baseplan inheritance: a.yml -> b.yml -> a.yml");
    }
}
