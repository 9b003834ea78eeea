//! Data model for settings, clients, parameters and rendered plans.
//!
//! All YAML-facing maps are `IndexMap` so file order survives a
//! load/save cycle and parameter listings stay stable.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml_ng::Value;
use std::fmt;
use std::path::PathBuf;

/// Sentinel string in `config.yml` meaning "read this from `secrets.yml`".
pub const SECRET_SENTINEL: &str = "?secret";

// ============================================================================
// Parameters
// ============================================================================

/// Parameter name → value. Values may be scalars, lists or nested maps.
pub type ParamMap = IndexMap<String, Value>;

/// Where a parameter value came from, lowest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterSource {
    /// `<basedir>/<plan>_default.yml`
    PlanDefaults,
    /// `<basedir>/kcli_default.yml`
    SharedDefaults,
    /// `<basedir>/<stem>_default.<ext>`
    InputDefaults,
    /// `parameters:` prologue of the template itself
    Prologue,
    /// Inherited from the base plan (fill-only)
    Baseplan,
    /// Caller-supplied overrides (always win)
    Override,
}

impl fmt::Display for ParameterSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlanDefaults => write!(f, "plan defaults"),
            Self::SharedDefaults => write!(f, "kcli_default.yml"),
            Self::InputDefaults => write!(f, "input file defaults"),
            Self::Prologue => write!(f, "parameters prologue"),
            Self::Baseplan => write!(f, "baseplan"),
            Self::Override => write!(f, "override"),
        }
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Reference into the secrets store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRef {
    pub section: String,
    pub key: String,
}

/// A raw option value in `config.yml`, before secrets are substituted.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Literal(Value),
    Secret(SecretRef),
}

impl SettingValue {
    /// Classify a raw YAML value found at `section.key`.
    pub fn classify(section: &str, key: &str, value: Value) -> Self {
        match value {
            Value::String(ref s) if s == SECRET_SENTINEL => Self::Secret(SecretRef {
                section: section.to_string(),
                key: key.to_string(),
            }),
            other => Self::Literal(other),
        }
    }
}

/// Option name → value for one settings scope (`default` or a client).
pub type Section = IndexMap<String, Value>;

/// Section → key → secret value, as read from `secrets.yml`.
pub type Secrets = IndexMap<String, IndexMap<String, Value>>;

/// Group member selection algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Random,
    Balance,
    Free,
}

impl Algorithm {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "random" => Some(Self::Random),
            "balance" => Some(Self::Balance),
            "free" => Some(Self::Free),
            _ => None,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Random => write!(f, "random"),
            Self::Balance => write!(f, "balance"),
            Self::Free => write!(f, "free"),
        }
    }
}

/// A concrete connection target derived from a client section.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientTarget {
    pub name: String,
    pub host: String,
    pub port: u64,
    pub user: String,
    pub protocol: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: Option<String>,
    pub pool: String,
    pub tunnel: bool,
    pub tunnelhost: Option<String>,
    pub tunnelport: u64,
    pub tunneluser: String,
}

/// Outcome of client resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedClient {
    pub active: ClientTarget,
    /// Secondary clients used for load distribution.
    pub extras: Vec<String>,
    /// Group the active client was picked from, if any.
    pub group: Option<String>,
    #[serde(skip)]
    pub algorithm: Option<Algorithm>,
}

// ============================================================================
// Profiles and flavors
// ============================================================================

/// Allowed values of a profile's `type`.
pub const PROFILE_TYPES: [&str; 2] = ["vm", "container"];

/// A reusable named bundle of resource options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Profile to inherit unset options from (single level)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,

    /// `vm` or `container`
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Every other option, in file order
    #[serde(flatten)]
    pub options: IndexMap<String, Value>,
}

/// A named sizing preset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Flavor {
    #[serde(default)]
    pub numcpus: Option<u64>,
    #[serde(default)]
    pub memory: Option<u64>,
    #[serde(default)]
    pub disk: Option<u64>,
}

// ============================================================================
// Rendering and resolution
// ============================================================================

/// Undefined-variable behavior of the template renderer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RenderMode {
    /// Undefined variables are fatal.
    #[default]
    Strict,
    /// Undefined variables render as an empty string.
    Lenient,
}

/// Rendered plan: resource name → resource specification.
pub type PlanDocument = IndexMap<String, Value>;

/// Result of a full resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Parsed plan document (the `parameters` prologue removed)
    pub document: PlanDocument,
    /// Every parameter the template was rendered with
    pub parameters: ParamMap,
    /// `baseplan` value, if the plan inherits from one
    pub baseplan: Option<String>,
    /// Directory the input file lives in
    pub basedir: PathBuf,
}

/// Description of a plan's parameters without rendering it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanInfo {
    pub file: PathBuf,
    pub description: Option<String>,
    pub info: Option<String>,
    /// Sorted by name
    pub parameters: Vec<(String, Value)>,
    pub base: Option<Box<PlanInfo>>,
}

/// Short type name of a YAML value (`str`, `int`, `bool`, ...).
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "none",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Sequence(_) => "list",
        Value::Mapping(_) => "dict",
        Value::Tagged(_) => "tagged",
    }
}

/// Render a scalar YAML value as plain text (strings unquoted).
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => serde_yaml_ng::to_string(other)
            .unwrap_or_default()
            .trim_end()
            .to_string(),
    }
}
