//! YAML loading for parameter sources and rendered plans.
//!
//! Parameter files are flat mappings. A plan template may open with a
//! `parameters:` prologue: the first line is `parameters:` and the block
//! runs until the first non-blank line that starts in column 0.

use super::types::{ParamMap, PlanDocument};
use crate::error::ResolveError;
use serde_yaml_ng::Value;
use std::path::{Path, PathBuf};

/// Key of the prologue block in plan templates.
pub const PROLOGUE_KEY: &str = "parameters";

/// Read a flat parameter file (`*_default.yml`, `--paramfile`).
///
/// An empty file yields an empty map. A file whose only key is
/// `parameters` holding a mapping is unwrapped.
pub fn load_parameter_file(path: &Path) -> Result<ParamMap, ResolveError> {
    let content = read(path)?;
    parse_parameters(&content).map_err(|message| ResolveError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

/// Parse flat parameters from a YAML string.
pub fn parse_parameters(yaml: &str) -> Result<ParamMap, String> {
    let value: Value = serde_yaml_ng::from_str(yaml).map_err(|e| e.to_string())?;
    let map = match value {
        Value::Null => return Ok(ParamMap::new()),
        Value::Mapping(_) => mapping_to_params(value)?,
        _ => return Err("parameter file must be a mapping".to_string()),
    };
    if map.len() == 1 {
        if let Some(Value::Mapping(_)) = map.get(PROLOGUE_KEY) {
            let inner = map.get(PROLOGUE_KEY).cloned().unwrap_or(Value::Null);
            return mapping_to_params(inner);
        }
    }
    Ok(map)
}

/// Split the raw text of the `parameters:` prologue off a template source.
///
/// Returns `None` when the first line is not `parameters:`.
pub fn prologue_text(source: &str) -> Option<String> {
    let mut lines = source.lines();
    let first = lines.next()?;
    if !first.starts_with("parameters:") {
        return None;
    }
    let mut block = vec![first];
    for line in lines {
        if !line.trim().is_empty() && !line.starts_with(char::is_whitespace) {
            break;
        }
        block.push(line);
    }
    Some(block.join("\n"))
}

/// Parameters declared in a template's prologue (empty when there is none).
pub fn load_prologue(path: &Path) -> Result<ParamMap, ResolveError> {
    let content = read(path)?;
    parse_prologue(&content).map_err(|message| ResolveError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

/// Parse the prologue of a template source string.
pub fn parse_prologue(source: &str) -> Result<ParamMap, String> {
    let Some(block) = prologue_text(source) else {
        return Ok(ParamMap::new());
    };
    let value: Value = serde_yaml_ng::from_str(&block).map_err(|e| e.to_string())?;
    match value {
        Value::Mapping(mut m) => match m.remove(PROLOGUE_KEY) {
            Some(Value::Null) | None => Ok(ParamMap::new()),
            Some(inner @ Value::Mapping(_)) => mapping_to_params(inner),
            Some(_) => Err("parameters prologue must be a mapping".to_string()),
        },
        _ => Ok(ParamMap::new()),
    }
}

/// Text following the prologue of a rendered document.
///
/// When the first line starts with `parameters:`, everything up to the first
/// later line that starts with a non-whitespace character is dropped.
pub fn strip_prologue(rendered: &str) -> String {
    let lines: Vec<&str> = rendered.split('\n').collect();
    if lines.first().is_some_and(|l| l.starts_with("parameters:")) {
        if let Some(idx) = lines
            .iter()
            .skip(1)
            .position(|l| l.starts_with(|c: char| !c.is_whitespace()))
        {
            return lines[idx + 1..].join("\n");
        }
    }
    rendered.to_string()
}

/// Parse a rendered plan into its resource mapping.
pub fn parse_document(rendered: &str, path: &Path) -> Result<PlanDocument, ResolveError> {
    let value: Value = serde_yaml_ng::from_str(rendered).map_err(|e| ResolveError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let mut document = match value {
        Value::Null => PlanDocument::new(),
        Value::Mapping(_) => mapping_to_params(value).map_err(|_| ResolveError::NotAMapping {
            path: path.to_path_buf(),
        })?,
        _ => {
            return Err(ResolveError::NotAMapping {
                path: path.to_path_buf(),
            })
        }
    };
    document.shift_remove(PROLOGUE_KEY);
    Ok(document)
}

/// Plan name derived from a template file name (`kcli_plan.yml` → `kcli_plan`).
pub fn plan_name(inputfile: &Path) -> String {
    let name = inputfile
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    name.replace(".yml", "").replace(".yaml", "")
}

/// Directory holding `inputfile`, `.` for bare file names.
pub fn base_dir(inputfile: &Path) -> PathBuf {
    match inputfile.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// `<stem>_default.<ext>` companion file name of an input file.
pub fn input_defaults_name(inputfile: &Path) -> String {
    let stem = inputfile
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    match inputfile.extension() {
        Some(ext) => format!("{}_default.{}", stem, ext.to_string_lossy()),
        None => format!("{}_default", stem),
    }
}

/// Expand a leading `~/` against `$HOME`.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

fn mapping_to_params(value: Value) -> Result<ParamMap, String> {
    let Value::Mapping(mapping) = value else {
        return Err("expected a mapping".to_string());
    };
    let mut params = ParamMap::new();
    for (k, v) in mapping {
        let key = match k {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => return Err(format!("unsupported parameter name {:?}", other)),
        };
        params.insert(key, v);
    }
    Ok(params)
}

fn read(path: &Path) -> Result<String, ResolveError> {
    std::fs::read_to_string(path).map_err(|e| ResolveError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}
