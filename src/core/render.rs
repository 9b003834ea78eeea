//! Template renderer.
//!
//! Wraps a `tera` environment carrying the fixed filter set. Strict mode
//! fails on any undefined variable. Lenient mode renders with the real
//! parameters and, each time tera reports an undefined top-level name,
//! declares that name as an empty string and renders again, so `default`
//! and `is defined` behave as in strict mode.

use super::filters::{FilterFn, FILTERS};
use super::parser;
use super::types::{ParamMap, RenderMode};
use crate::error::RenderError;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::Path;
use tera::{Context, Tera};

/// Words that can appear bare inside a tag without naming a variable.
const KEYWORDS: &[&str] = &[
    "and", "or", "not", "in", "is", "if", "elif", "else", "endif", "for", "endfor", "set",
    "set_global", "endset", "true", "false", "True", "False", "none", "None", "loop", "macro",
    "endmacro", "block", "endblock", "extends", "include", "import", "as", "filter",
    "endfilter", "raw", "endraw", "break", "continue", "super", "self", "ignore", "missing",
];

/// Renders plan, pipeline and script templates.
#[derive(Debug, Clone, Default)]
pub struct TemplateRenderer {
    mode: RenderMode,
    extra_filters: Vec<(String, FilterFn)>,
}

impl TemplateRenderer {
    pub fn new(mode: RenderMode) -> Self {
        Self {
            mode,
            extra_filters: Vec::new(),
        }
    }

    pub fn strict() -> Self {
        Self::new(RenderMode::Strict)
    }

    pub fn lenient() -> Self {
        Self::new(RenderMode::Lenient)
    }

    /// Register an additional filter next to the built-in set.
    pub fn with_filter(mut self, name: &str, filter: FilterFn) -> Self {
        self.extra_filters.push((name.to_string(), filter));
        self
    }

    /// Render `template_dir/template_name` against `params`.
    pub fn render(
        &self,
        template_dir: &Path,
        template_name: &str,
        params: &ParamMap,
    ) -> Result<String, RenderError> {
        let path = template_dir.join(template_name);
        let source = std::fs::read_to_string(&path).map_err(|e| RenderError::Io {
            path: path.clone(),
            source: e,
        })?;
        self.render_str(template_name, &source, params)
    }

    /// Render the template but keep only what follows its `parameters:` prologue.
    pub fn render_partial(
        &self,
        template_dir: &Path,
        template_name: &str,
        params: &ParamMap,
    ) -> Result<String, RenderError> {
        let rendered = self.render(template_dir, template_name, params)?;
        Ok(parser::strip_prologue(&rendered))
    }

    /// Render an in-memory template. `name` is used in error messages.
    pub fn render_str(
        &self,
        name: &str,
        source: &str,
        params: &ParamMap,
    ) -> Result<String, RenderError> {
        let mut tera = self.environment();
        tera.add_raw_template(name, source).map_err(|e| {
            let message = error_chain(&e);
            RenderError::Syntax {
                file: name.to_string(),
                line: syntax_line(&message),
                message,
            }
        })?;

        let mut context = Context::new();
        for (key, value) in params {
            let json = serde_json::to_value(value).map_err(|e| RenderError::Context {
                file: name.to_string(),
                message: format!("parameter {}: {}", key, e),
            })?;
            context.insert(key.as_str(), &json);
        }

        let mut declared = BTreeSet::new();
        loop {
            let err = match tera.render(name, &context) {
                Ok(out) => return Ok(out),
                Err(e) => e,
            };
            let message = error_chain(&err);
            let missing = undefined_variable(&message);
            if self.mode == RenderMode::Lenient {
                if let Some(root) = missing.as_deref().map(root_name) {
                    if !params.contains_key(root) && declared.insert(root.to_string()) {
                        tracing::debug!(template = name, variable = root, "undefined variable rendered empty");
                        context.insert(root, "");
                        continue;
                    }
                }
            }
            return Err(RenderError::Render {
                file: name.to_string(),
                line: missing.and_then(|v| first_reference_line(source, root_name(&v))),
                message,
            });
        }
    }

    fn environment(&self) -> Tera {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        for (name, filter) in FILTERS {
            tera.register_filter(name, *filter);
        }
        for (name, filter) in &self.extra_filters {
            tera.register_filter(name, *filter);
        }
        tera
    }
}

// ============================================================================
// Source scanning
// ============================================================================

/// Variable-position identifiers of one tag body.
fn tag_identifiers(body: &str) -> Vec<String> {
    let (Ok(literals), Ok(idents)) = (
        Regex::new(r#""[^"]*"|'[^']*'|`[^`]*`"#),
        Regex::new(r"[A-Za-z_][A-Za-z0-9_]*"),
    ) else {
        return Vec::new();
    };
    let body = literals.replace_all(body, " ");
    let mut found = Vec::new();
    let mut after_is = false;
    for m in idents.find_iter(&body) {
        let word = m.as_str();
        let before = body[..m.start()].trim_end();
        let after = body[m.end()..].trim_start();

        if after_is {
            if word != "not" {
                after_is = false;
            }
            continue;
        }
        if word == "is" {
            after_is = true;
            continue;
        }
        if KEYWORDS.contains(&word) {
            continue;
        }
        if before.ends_with('.') || before.ends_with('|') || before.ends_with("::") {
            continue;
        }
        if after.starts_with('(') || after.starts_with("::") {
            continue;
        }
        if after.starts_with('=') && !after.starts_with("==") {
            continue;
        }
        found.push(word.to_string());
    }
    found
}

/// 1-based line of the first tag referencing `name`.
fn first_reference_line(source: &str, name: &str) -> Option<usize> {
    let tags = Regex::new(r"\{\{-?(.*?)-?\}\}|\{%-?(.*?)-?%\}").ok()?;
    source.lines().enumerate().find_map(|(idx, line)| {
        let hit = tags.captures_iter(line).any(|caps| {
            caps.get(1)
                .or_else(|| caps.get(2))
                .is_some_and(|body| tag_identifiers(body.as_str()).iter().any(|w| w == name))
        });
        hit.then_some(idx + 1)
    })
}

/// Name reported by an undefined-variable error, if that is the failure.
fn undefined_variable(message: &str) -> Option<String> {
    let re = Regex::new(r"Variable `([^`]+)` not found").ok()?;
    Some(re.captures(message)?.get(1)?.as_str().to_string())
}

/// `vm.name` and `disks[0]` → the context key they live under.
fn root_name(variable: &str) -> &str {
    variable.split(['.', '[']).next().unwrap_or(variable)
}

fn syntax_line(message: &str) -> Option<usize> {
    let re = Regex::new(r"-->\s*(\d+):(\d+)").ok()?;
    re.captures(message)?.get(1)?.as_str().parse().ok()
}

/// Flatten a tera error and its sources into one message.
fn error_chain(err: &tera::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        parts.push(inner.to_string());
        source = inner.source();
    }
    parts.join(": ")
}
