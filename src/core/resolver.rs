//! Parameter resolver: the default-source cascade, base-plan inheritance
//! and the final strict render of a plan template.
//!
//! Sources, lowest precedence first:
//! `<plan>_default.yml`, `kcli_default.yml`, `<stem>_default.<ext>`, the
//! template's `parameters:` prologue, the base plan (fill-only), and the
//! caller's overrides (never overwritten).

use super::parser::{
    base_dir, input_defaults_name, load_parameter_file, load_prologue, parse_document, plan_name,
    strip_prologue,
};
use super::render::TemplateRenderer;
use super::types::{
    value_to_string, ParamMap, ParameterSource, PlanInfo, RenderMode, Resolution,
};
use crate::error::ResolveError;
use crate::transport::{join_url, DefaultFetcher, Fetcher};
use serde_yaml_ng::Value;
use std::path::{Path, PathBuf};

/// Parameter naming the parent template of a plan.
pub const BASEPLAN_KEY: &str = "baseplan";

/// Per-call switches of [`ParameterResolver::resolve`].
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Parse the rendered document; otherwise only the text after the
    /// prologue is returned.
    pub full: bool,
    /// Force every boolean parameter to `true`.
    pub download_mode: bool,
    /// Undefined-variable handling of the final render.
    pub mode: RenderMode,
    /// Location base plans are fetched from before being resolved.
    pub origin: Option<String>,
}

impl ResolveOptions {
    pub fn full() -> Self {
        Self {
            full: true,
            ..Self::default()
        }
    }
}

/// What [`ParameterResolver::resolve`] produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Full(Resolution),
    /// Rendered text following the `parameters:` prologue.
    Partial(String),
}

/// Resolves plan parameters and renders plan templates.
pub struct ParameterResolver {
    global_overrides: ParamMap,
    fetcher: Box<dyn Fetcher>,
}

impl Default for ParameterResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterResolver {
    pub fn new() -> Self {
        Self {
            global_overrides: ParamMap::new(),
            fetcher: Box::new(DefaultFetcher),
        }
    }

    pub fn with_fetcher(mut self, fetcher: Box<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Process-wide overrides merged into every render.
    pub fn with_global_overrides(mut self, overrides: ParamMap) -> Self {
        self.global_overrides = overrides;
        self
    }

    /// Resolve and render `inputfile` as plan `plan`.
    pub fn resolve(
        &self,
        plan: &str,
        inputfile: &Path,
        overrides: &ParamMap,
        opts: &ResolveOptions,
    ) -> Result<Resolved, ResolveError> {
        if opts.full {
            return self.resolve_document(plan, inputfile, overrides, opts).map(Resolved::Full);
        }
        let mut chain = Vec::new();
        let rendered = self.render_inner(plan, inputfile, overrides.clone(), opts, &mut chain)?;
        Ok(Resolved::Partial(strip_prologue(&rendered.text)))
    }

    /// [`resolve`](Self::resolve) with a full strict render.
    pub fn resolve_full(
        &self,
        plan: &str,
        inputfile: &Path,
        overrides: &ParamMap,
        download_mode: bool,
    ) -> Result<Resolution, ResolveError> {
        let opts = ResolveOptions {
            download_mode,
            ..ResolveOptions::full()
        };
        self.resolve_document(plan, inputfile, overrides, &opts)
    }

    fn resolve_document(
        &self,
        plan: &str,
        inputfile: &Path,
        overrides: &ParamMap,
        opts: &ResolveOptions,
    ) -> Result<Resolution, ResolveError> {
        let mut chain = Vec::new();
        let rendered = self.render_inner(plan, inputfile, overrides.clone(), opts, &mut chain)?;
        complete(inputfile, rendered)
    }

    fn render_inner(
        &self,
        plan: &str,
        inputfile: &Path,
        mut overrides: ParamMap,
        opts: &ResolveOptions,
        chain: &mut Vec<PathBuf>,
    ) -> Result<Rendered, ResolveError> {
        if !inputfile.is_file() {
            return Err(ResolveError::NotFound(inputfile.to_path_buf()));
        }
        enter(inputfile, chain)?;
        tracing::debug!(source = %ParameterSource::Override, count = overrides.len(), "applied parameters");
        let basedir = base_dir(inputfile);
        let mut parameters = default_sources(plan, inputfile)?;

        let mut baseplan = None;
        if let Some(base) = parameters.get(BASEPLAN_KEY).map(value_to_string) {
            let basefile = self.locate_base(&base, &basedir, opts.origin.as_deref())?;
            let base_opts = ResolveOptions {
                full: true,
                download_mode: opts.download_mode,
                mode: RenderMode::Strict,
                origin: opts.origin.clone(),
            };
            let base_rendered =
                self.render_inner(plan, &basefile, overrides.clone(), &base_opts, chain)?;
            let base_resolution = complete(&basefile, base_rendered)?;
            for (key, value) in base_resolution.parameters {
                if !parameters.contains_key(&key) {
                    tracing::trace!(%key, source = %ParameterSource::Baseplan, "inherited");
                    parameters.insert(key, value);
                }
            }
            baseplan = Some(base);
        }

        for (key, value) in parameters {
            if overrides.contains_key(&key) {
                continue;
            }
            let value = match value {
                Value::Bool(_) if opts.download_mode => Value::Bool(true),
                other => other,
            };
            overrides.insert(key, value);
        }
        for (key, value) in &self.global_overrides {
            overrides.insert(key.clone(), value.clone());
        }
        overrides.insert("plan".to_string(), Value::String(plan.to_string()));

        let template_name = inputfile
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let text = TemplateRenderer::new(opts.mode).render(&basedir, &template_name, &overrides)?;
        chain.pop();
        Ok(Rendered {
            text,
            parameters: overrides,
            baseplan,
            basedir,
        })
    }

    /// Describe the parameters of `inputfile` without rendering it.
    pub fn describe(&self, inputfile: &Path, origin: Option<&str>) -> Result<PlanInfo, ResolveError> {
        let mut chain = Vec::new();
        self.describe_inner(inputfile, origin, &mut chain)
    }

    fn describe_inner(
        &self,
        inputfile: &Path,
        origin: Option<&str>,
        chain: &mut Vec<PathBuf>,
    ) -> Result<PlanInfo, ResolveError> {
        if !inputfile.is_file() {
            return Err(ResolveError::NotFound(inputfile.to_path_buf()));
        }
        enter(inputfile, chain)?;
        let plan = plan_name(inputfile);
        let mut parameters = default_sources(&plan, inputfile)?;
        let text = |v: Value| value_to_string(&v).trim().to_string();
        let description = parameters.shift_remove("description").map(text);
        let info = parameters.shift_remove("info").map(text);

        let base = match parameters.get(BASEPLAN_KEY).map(value_to_string) {
            Some(name) => {
                let basefile = self.locate_base(&name, &base_dir(inputfile), origin)?;
                Some(Box::new(self.describe_inner(&basefile, origin, chain)?))
            }
            None => None,
        };
        chain.pop();

        let mut sorted: Vec<(String, Value)> = parameters.into_iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(PlanInfo {
            file: inputfile.to_path_buf(),
            description,
            info,
            parameters: sorted,
            base,
        })
    }

    /// Path of a base plan named relative to `basedir`, fetched first when
    /// an origin is set.
    fn locate_base(
        &self,
        name: &str,
        basedir: &Path,
        origin: Option<&str>,
    ) -> Result<PathBuf, ResolveError> {
        if let Some(origin) = origin {
            let fetched = self.fetcher.fetch(&join_url(origin, name), basedir)?;
            tracing::info!(baseplan = name, path = %fetched.display(), "fetched base plan");
            return Ok(fetched);
        }
        Ok(basedir.join(name))
    }
}

/// Rendered text of one template level, before validation and parsing.
struct Rendered {
    text: String,
    parameters: ParamMap,
    baseplan: Option<String>,
    basedir: PathBuf,
}

/// Reject hyphenated names, then parse the rendered document.
fn complete(inputfile: &Path, rendered: Rendered) -> Result<Resolution, ResolveError> {
    let hyphenated: Vec<String> = rendered
        .parameters
        .keys()
        .filter(|k| k.contains('-'))
        .cloned()
        .collect();
    if !hyphenated.is_empty() {
        return Err(ResolveError::HyphenatedParameters(hyphenated));
    }
    let document = parse_document(&rendered.text, inputfile)?;
    tracing::debug!(
        file = %inputfile.display(),
        resources = document.len(),
        parameters = rendered.parameters.len(),
        "resolved plan"
    );
    Ok(Resolution {
        document,
        parameters: rendered.parameters,
        baseplan: rendered.baseplan,
        basedir: rendered.basedir,
    })
}

/// Record `inputfile` in the inheritance chain, failing on a revisit.
fn enter(inputfile: &Path, chain: &mut Vec<PathBuf>) -> Result<(), ResolveError> {
    let key = inputfile
        .canonicalize()
        .unwrap_or_else(|_| inputfile.to_path_buf());
    if chain.contains(&key) {
        let mut cycle = chain.clone();
        cycle.push(key);
        return Err(ResolveError::CyclicBaseplan(cycle));
    }
    chain.push(key);
    Ok(())
}

/// Default-file candidates of `inputfile`, lowest precedence first.
pub fn default_files(plan: &str, inputfile: &Path) -> Vec<(ParameterSource, PathBuf)> {
    let basedir = base_dir(inputfile);
    vec![
        (
            ParameterSource::PlanDefaults,
            basedir.join(format!("{}_default.yml", plan)),
        ),
        (ParameterSource::SharedDefaults, basedir.join("kcli_default.yml")),
        (
            ParameterSource::InputDefaults,
            basedir.join(input_defaults_name(inputfile)),
        ),
    ]
}

/// Sources 1 to 4 applied by sequential overwrite.
pub fn default_sources(plan: &str, inputfile: &Path) -> Result<ParamMap, ResolveError> {
    let mut parameters = ParamMap::new();
    for (source, path) in default_files(plan, inputfile) {
        if path.is_file() {
            let loaded = load_parameter_file(&path)?;
            tracing::debug!(%source, path = %path.display(), count = loaded.len(), "applied parameters");
            parameters.extend(loaded);
        }
    }
    let prologue = load_prologue(inputfile)?;
    tracing::debug!(source = %ParameterSource::Prologue, count = prologue.len(), "applied parameters");
    parameters.extend(prologue);
    Ok(parameters)
}
