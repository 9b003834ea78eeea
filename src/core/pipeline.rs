//! CI pipeline generation for plans: Jenkinsfiles and GitHub workflows.
//!
//! Both manifests are rendered through [`TemplateRenderer`] from templates
//! compiled into the binary.

use super::parser::{base_dir, plan_name};
use super::render::TemplateRenderer;
use super::resolver::default_sources;
use super::types::{value_to_string, ParamMap};
use crate::error::{ConfigError, Error, RenderError, ResolveError};
use crate::transport::local;
use serde::Serialize;
use serde_yaml_ng::Value;
use std::path::Path;

const JENKINSFILE: &str = include_str!("../templates/Jenkinsfile.tera");
const WORKFLOW: &str = include_str!("../templates/workflow.yml.tera");

/// Agents a Jenkinsfile can target.
pub const JENKINS_MODES: [&str; 3] = ["docker", "podman", "kubernetes"];

#[derive(Debug, Serialize)]
struct PipelineParam {
    name: String,
    value: String,
    boolean: bool,
}

/// Render a Jenkinsfile running `inputfile` with one build parameter per
/// plan parameter. `jenkinsmode` in `overrides` wins over `default_mode`.
pub fn jenkins_pipeline(
    inputfile: &Path,
    overrides: &ParamMap,
    default_mode: &str,
) -> Result<String, Error> {
    let mut overrides = overrides.clone();
    let mode = match overrides.shift_remove("jenkinsmode") {
        Some(v) => value_to_string(&v),
        None => default_mode.to_string(),
    };
    if !JENKINS_MODES.contains(&mode.as_str()) {
        return Err(ConfigError::InvalidJenkinsMode(mode).into());
    }
    if !inputfile.is_file() {
        return Err(ResolveError::NotFound(inputfile.to_path_buf()).into());
    }
    let plan = plan_name(inputfile);
    let mut parameters = default_sources(&plan, inputfile)?;
    parameters.extend(overrides);
    parameters.shift_remove("plan");

    let parameterline = parameters
        .keys()
        .map(|k| format!("-P {k}=${{params.{k}}}"))
        .collect::<Vec<_>>()
        .join(" ");
    let params: Vec<PipelineParam> = parameters
        .iter()
        .map(|(name, value)| PipelineParam {
            name: name.clone(),
            value: value_to_string(value).replace('\'', "\\'"),
            boolean: value.is_bool(),
        })
        .collect();

    let mut context = ParamMap::new();
    context.insert("plan".into(), Value::String(plan));
    context.insert("jenkinsmode".into(), Value::String(mode));
    context.insert(
        "inputfile".into(),
        Value::String(inputfile.display().to_string()),
    );
    context.insert("parameterline".into(), Value::String(parameterline));
    context.insert("parameters".into(), to_value("Jenkinsfile", &params)?);
    Ok(TemplateRenderer::strict().render_str("Jenkinsfile", JENKINSFILE, &context)?)
}

/// Inputs of [`github_pipeline`].
#[derive(Debug, Clone)]
pub struct GithubPipeline<'a> {
    pub inputfile: &'a Path,
    pub paramfile: Option<&'a str>,
    pub overrides: ParamMap,
    /// Generate a workflow running `inputfile` as a script instead of a plan.
    pub script: bool,
}

/// Render a GitHub Actions workflow deploying a plan on `workflow_dispatch`.
pub fn github_pipeline(job: &GithubPipeline<'_>) -> Result<String, Error> {
    if !job.inputfile.is_file() {
        return Err(ResolveError::NotFound(job.inputfile.to_path_buf()).into());
    }
    let mut overrides = job.overrides.clone();
    let mut take = |key: &str, default: String| {
        overrides
            .shift_remove(key)
            .map(|v| value_to_string(&v))
            .unwrap_or(default)
    };
    let plan = take("plan", plan_name(job.inputfile));
    let runner = take("runner", "ubuntu-latest".to_string());
    let client = take("client", "local".to_string());
    let runscript = if job.script {
        take("runscript", "true".to_string()).to_lowercase()
    } else {
        "true".to_string()
    };

    let parameterline = overrides
        .iter()
        .map(|(k, v)| {
            let input = format!("${{{{github.event.inputs.{}}}}}", k.to_uppercase());
            if v.is_string() {
                format!("-P {k}='{input}'")
            } else {
                format!("-P {k}={input}")
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    let paramfileline = match job.paramfile {
        Some(_) => "--paramfile ${{github.event.inputs.PARAMFILE}}".to_string(),
        None => String::new(),
    };
    let params: Vec<PipelineParam> = overrides
        .iter()
        .map(|(name, value)| PipelineParam {
            name: name.clone(),
            value: value_to_string(value),
            boolean: value.is_bool(),
        })
        .collect();
    let filename = job
        .inputfile
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut context = ParamMap::new();
    context.insert("plan".into(), Value::String(plan));
    context.insert("runner".into(), Value::String(runner));
    context.insert("client".into(), Value::String(client));
    context.insert("runscript".into(), Value::String(runscript));
    context.insert("script".into(), Value::Bool(job.script));
    context.insert(
        "paramfile".into(),
        job.paramfile
            .map(|p| Value::String(p.to_string()))
            .unwrap_or(Value::Null),
    );
    context.insert("paramfileline".into(), Value::String(paramfileline));
    context.insert("parameterline".into(), Value::String(parameterline));
    context.insert("gitbase".into(), Value::String(git_prefix(&base_dir(job.inputfile))));
    context.insert("inputfile".into(), Value::String(filename));
    context.insert("parameters".into(), to_value("workflow.yml", &params)?);
    Ok(TemplateRenderer::strict().render_str("workflow.yml", WORKFLOW, &context)?)
}

/// Path of `dir` inside its git checkout (`git rev-parse --show-prefix`),
/// empty outside of one.
pub fn git_prefix(dir: &Path) -> String {
    match local::run("git", &["rev-parse", "--show-prefix"], dir) {
        Ok(out) if out.success() => out.stdout.trim().to_string(),
        _ => String::new(),
    }
}

fn to_value(file: &str, params: &[PipelineParam]) -> Result<Value, RenderError> {
    serde_yaml_ng::to_value(params).map_err(|e| RenderError::Context {
        file: file.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn plan_dir() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("kcli_default.yml"), "memory: 2048\nwait_ready: false\n").unwrap();
        let plan = dir.path().join("lab.yml");
        std::fs::write(&plan, "parameters:\n  image: centos8\nvm1:\n  image: {{ image }}\n").unwrap();
        (dir, plan)
    }

    #[test]
    fn test_jenkins_pipeline_parameters() {
        let (_dir, plan) = plan_dir();
        let out = jenkins_pipeline(&plan, &ParamMap::new(), "podman").unwrap();
        assert!(out.contains("agent any"));
        assert!(out.contains("KCLI = \"podman run ${CONTAINER_OPTIONS} quay.io/karmab/kcli\""));
        assert!(out.contains("string(name: 'memory', defaultValue: '2048', description: '')"));
        assert!(out.contains("booleanParam(name: 'wait_ready', defaultValue: false, description: '')"));
        assert!(out.contains("string(name: 'image', defaultValue: 'centos8', description: '')"));
        assert!(out.contains("-P memory=${params.memory} -P wait_ready=${params.wait_ready} -P image=${params.image}"));
        assert!(out.contains("defaultValue: 'lab'"));
    }

    #[test]
    fn test_jenkins_kubernetes_mode_from_overrides() {
        let (_dir, plan) = plan_dir();
        let mut overrides = ParamMap::new();
        overrides.insert("jenkinsmode".into(), Value::String("kubernetes".into()));
        overrides.insert("image".into(), Value::String("fedora".into()));
        let out = jenkins_pipeline(&plan, &overrides, "podman").unwrap();
        assert!(out.contains("kubernetes {"));
        assert!(out.contains("KCLI = \"kcli\""));
        assert!(!out.contains("jenkinsmode"));
        assert!(out.contains("string(name: 'image', defaultValue: 'fedora', description: '')"));
    }

    #[test]
    fn test_jenkins_invalid_mode() {
        let (_dir, plan) = plan_dir();
        let err = jenkins_pipeline(&plan, &ParamMap::new(), "lxc").unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::InvalidJenkinsMode(_))));
    }

    #[test]
    fn test_jenkins_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = jenkins_pipeline(&dir.path().join("none.yml"), &ParamMap::new(), "docker").unwrap_err();
        assert!(matches!(err, Error::Resolve(ResolveError::NotFound(_))));
    }

    #[test]
    fn test_github_pipeline() {
        let (_dir, plan) = plan_dir();
        let mut overrides = ParamMap::new();
        overrides.insert("runner".into(), Value::String("self-hosted".into()));
        overrides.insert("client".into(), Value::String("kvm1".into()));
        overrides.insert("image".into(), Value::String("rhel9".into()));
        overrides.insert("replicas".into(), Value::from(3));
        let out = github_pipeline(&GithubPipeline {
            inputfile: &plan,
            paramfile: Some("lab_parameters.yml"),
            overrides,
            script: false,
        })
        .unwrap();
        assert!(out.starts_with("name: lab\n"));
        assert!(out.contains("runs-on: self-hosted"));
        assert!(out.contains("CLIENT: kvm1"));
        assert!(out.contains("      IMAGE:\n        description: 'image'\n        required: true\n        default: rhel9"));
        assert!(out.contains("-P image='${{github.event.inputs.IMAGE}}' -P replicas=${{github.event.inputs.REPLICAS}}"));
        assert!(out.contains("--paramfile ${{github.event.inputs.PARAMFILE}}"));
        assert!(out.contains("PLAN: ${{github.event.inputs.PLAN}}"));
        assert!(out.contains("create plan -f lab.yml"));
        assert!(!out.contains("RUNSCRIPT"));
        let parsed: Value = serde_yaml_ng::from_str(&out).unwrap();
        assert!(parsed.get("jobs").is_some());
    }

    #[test]
    fn test_github_script_workflow() {
        let (dir, _plan) = plan_dir();
        let script = dir.path().join("deploy.sh");
        std::fs::write(&script, "#!/bin/bash\necho hi\n").unwrap();
        let mut overrides = ParamMap::new();
        overrides.insert("runscript".into(), Value::Bool(false));
        let out = github_pipeline(&GithubPipeline {
            inputfile: &script,
            paramfile: None,
            overrides,
            script: true,
        })
        .unwrap();
        assert!(out.contains("default: false"));
        assert!(out.contains("run: bash deploy.sh"));
        assert!(!out.contains("PARAMFILE"));
    }

    #[test]
    fn test_git_prefix_outside_repo() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(git_prefix(dir.path()), "");
    }
}
