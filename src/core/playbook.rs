//! Ansible playbook generation for plans.
//!
//! Each kvm resource of the resolved plan that carries `scripts`, `files`
//! or `cmds` gets its own play, rendered through [`TemplateRenderer`].

use super::parser::plan_name;
use super::render::TemplateRenderer;
use super::resolver::ParameterResolver;
use super::types::{value_to_string, ClientTarget, ParamMap};
use crate::error::{Error, RenderError};
use serde::Serialize;
use serde_yaml_ng::{Mapping, Value};
use std::path::{Path, PathBuf};

const PLAYBOOK: &str = include_str!("../templates/playbook.yml.tera");

/// Mode of files given by bare name.
const DEFAULT_MODE: &str = "0700";

/// A rendered playbook for one host.
#[derive(Debug, Clone, PartialEq)]
pub struct Playbook {
    pub hostname: String,
    pub text: String,
}

impl Playbook {
    /// `playbook_<hostname>.yml`
    pub fn file_name(&self) -> String {
        format!("playbook_{}.yml", self.hostname)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct FileEntry {
    path: String,
    origin: String,
    mode: String,
}

/// Resolve `inputfile` and render a playbook for every kvm resource with
/// scripts, files or commands. `target` supplies the `config_host`,
/// `config_type` and `config_user` parameters.
pub fn plan_playbooks(
    resolver: &ParameterResolver,
    inputfile: &Path,
    overrides: &ParamMap,
    target: &ClientTarget,
) -> Result<Vec<Playbook>, Error> {
    let mut overrides = overrides.clone();
    for (key, value) in config_parameters(target) {
        overrides.insert(key.to_string(), Value::String(value));
    }
    let plan = plan_name(inputfile);
    let resolution = resolver.resolve_full(&plan, inputfile, &overrides, false)?;

    let mut playbooks = Vec::new();
    for (name, resource) in &resolution.document {
        let Some(resource) = resource.as_mapping() else {
            continue;
        };
        if !wants_playbook(resource) {
            tracing::debug!(resource = %name, "no playbook needed");
            continue;
        }
        playbooks.push(vm_playbook(
            name,
            resource,
            &resolution.parameters,
            &resolution.basedir,
        )?);
    }
    tracing::info!(plan = %plan, count = playbooks.len(), "generated playbooks");
    Ok(playbooks)
}

/// kvm (or untyped) resources carrying scripts, files or commands.
fn wants_playbook(resource: &Mapping) -> bool {
    let kind = resource.get("type").map(value_to_string);
    if kind.is_some_and(|k| k != "kvm") {
        return false;
    }
    ["scripts", "files", "cmds"]
        .iter()
        .any(|key| resource.contains_key(*key))
}

/// Connection facts of the active client, as plan parameters.
fn config_parameters(target: &ClientTarget) -> [(&'static str, String); 3] {
    let local = matches!(target.host.as_str(), "127.0.0.1" | "localhost");
    let user = if target.kind == "kvm" && local {
        std::env::var("USER").unwrap_or_else(|_| "root".to_string())
    } else {
        "root".to_string()
    };
    [
        ("config_host", target.host.clone()),
        ("config_type", target.kind.clone()),
        ("config_user", user),
    ]
}

/// Render the playbook of a single resource.
///
/// `hostname` in `parameters` renames the play's host. Directories listed
/// as file origins become directory tasks, as do parents of nested
/// destinations.
pub fn vm_playbook(
    name: &str,
    resource: &Mapping,
    parameters: &ParamMap,
    basedir: &Path,
) -> Result<Playbook, Error> {
    let hostname = parameters
        .get("hostname")
        .map(value_to_string)
        .unwrap_or_else(|| name.to_string());

    let mut dirs: Vec<String> = Vec::new();
    let mut files = Vec::new();
    for entry in strings_or_mappings(resource.get("files")) {
        let entry = match entry {
            Value::String(origin) => FileEntry {
                path: format!("/root/{origin}"),
                origin,
                mode: DEFAULT_MODE.to_string(),
            },
            Value::Mapping(m) => {
                let field = |key: &str| m.get(key).map(value_to_string);
                let Some(origin) = field("origin") else {
                    continue;
                };
                FileEntry {
                    path: field("path").unwrap_or_else(|| format!("/root/{origin}")),
                    mode: field("mode").unwrap_or_else(|| DEFAULT_MODE.to_string()),
                    origin,
                }
            }
            _ => continue,
        };
        if basedir.join(&entry.origin).is_dir() {
            if !dirs.contains(&entry.origin) {
                dirs.push(entry.origin);
            }
            continue;
        }
        if entry.path.matches('/').count() > 2 {
            let parent = PathBuf::from(&entry.path)
                .parent()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            if !dirs.contains(&parent) {
                dirs.push(parent);
            }
        }
        files.push(entry);
    }

    let scripts: Vec<String> = strings_or_mappings(resource.get("scripts"))
        .iter()
        .map(value_to_string)
        .collect();
    let cmds: Vec<String> = strings_or_mappings(resource.get("cmds"))
        .iter()
        .map(value_to_string)
        .collect();
    let mut vars = parameters.clone();
    vars.shift_remove("info");

    let mut context = ParamMap::new();
    context.insert("hostname".into(), Value::String(hostname.clone()));
    context.insert("dirs".into(), to_value(&dirs)?);
    context.insert("files".into(), to_value(&files)?);
    context.insert("scripts".into(), to_value(&scripts)?);
    context.insert("cmds".into(), to_value(&cmds)?);
    context.insert("overrides".into(), to_value(&vars)?);
    let rendered = TemplateRenderer::strict().render_str("playbook.yml", PLAYBOOK, &context)?;

    let text = rendered
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| format!("{line}\n"))
        .collect();
    Ok(Playbook { hostname, text })
}

/// Items of a list option; a lone scalar counts as a one-item list.
fn strings_or_mappings(value: Option<&Value>) -> Vec<Value> {
    match value {
        Some(Value::Sequence(items)) => items.clone(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other.clone()],
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, RenderError> {
    serde_yaml_ng::to_value(value).map_err(|e| RenderError::Context {
        file: "playbook.yml".to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(host: &str, kind: &str) -> ClientTarget {
        ClientTarget {
            name: "lab".into(),
            host: host.into(),
            port: 22,
            user: "root".into(),
            protocol: "ssh".into(),
            kind: kind.into(),
            url: None,
            pool: "default".into(),
            tunnel: false,
            tunnelhost: None,
            tunnelport: 22,
            tunneluser: "root".into(),
        }
    }

    fn play(text: &str) -> Value {
        let doc: Value = serde_yaml_ng::from_str(text).unwrap();
        doc.as_sequence().unwrap()[0].clone()
    }

    fn task_names(play: &Value) -> Vec<String> {
        play["tasks"]
            .as_sequence()
            .unwrap()
            .iter()
            .map(|t| value_to_string(&t["name"]))
            .collect()
    }

    #[test]
    fn test_plan_playbooks_selects_kvm_resources() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("conf")).unwrap();
        let plan = dir.path().join("lab.yml");
        std::fs::write(
            &plan,
            "parameters:\n  domain: lab.local\n  info: demo\nweb:\n  scripts:\n  - install.sh\n  files:\n  - motd\n  - origin: conf\n  - origin: nginx.conf\n    path: /etc/nginx/conf.d/site.conf\n    mode: '0644'\n  cmds:\n  - echo {{ domain }} > /tmp/domain\ndb:\n  image: centos8\nrouter:\n  type: container\n  cmds:\n  - true\n",
        )
        .unwrap();
        let playbooks = plan_playbooks(
            &ParameterResolver::new(),
            &plan,
            &ParamMap::new(),
            &target("10.0.0.5", "kvm"),
        )
        .unwrap();
        assert_eq!(playbooks.len(), 1);
        assert_eq!(playbooks[0].hostname, "web");
        assert_eq!(playbooks[0].file_name(), "playbook_web.yml");

        let web = play(&playbooks[0].text);
        assert_eq!(web["hosts"], Value::from("web"));
        let vars = &web["vars"];
        assert_eq!(vars["domain"], Value::from("lab.local"));
        assert_eq!(vars["config_host"], Value::from("10.0.0.5"));
        assert_eq!(vars["config_user"], Value::from("root"));
        assert!(vars.get("info").is_none());
        assert_eq!(
            task_names(&web),
            vec![
                "Create directory conf",
                "Create directory /etc/nginx/conf.d",
                "Copy motd",
                "Copy nginx.conf",
                "Run script install.sh",
                "Run commands",
            ]
        );
        let tasks = web["tasks"].as_sequence().unwrap();
        assert_eq!(tasks[2]["template"]["dest"], Value::from("/root/motd"));
        assert_eq!(tasks[3]["template"]["mode"], Value::from("0644"));
        assert_eq!(
            tasks[5]["shell"],
            Value::from("echo lab.local > /tmp/domain\n")
        );
        assert!(!playbooks[0].text.lines().any(|l| l.trim().is_empty()));
    }

    #[test]
    fn test_hostname_parameter_renames_host() {
        let mut resource = Mapping::new();
        resource.insert("cmds".into(), Value::Sequence(vec!["uptime".into()]));
        let mut parameters = ParamMap::new();
        parameters.insert("hostname".into(), Value::from("edge01"));
        let pb = vm_playbook("vm1", &resource, &parameters, Path::new(".")).unwrap();
        assert_eq!(pb.hostname, "edge01");
        assert_eq!(play(&pb.text)["hosts"], Value::from("edge01"));
    }

    #[test]
    fn test_resource_without_tasks_is_skipped() {
        let mut resource = Mapping::new();
        resource.insert("image".into(), Value::from("centos8"));
        assert!(!wants_playbook(&resource));
        resource.insert("type".into(), Value::from("kvm"));
        resource.insert("files".into(), Value::Sequence(vec![]));
        assert!(wants_playbook(&resource));
    }

    #[test]
    fn test_config_user_for_remote_and_local() {
        let remote = config_parameters(&target("10.0.0.5", "kvm"));
        assert_eq!(remote[2], ("config_user", "root".to_string()));
        let container = config_parameters(&target("127.0.0.1", "podman"));
        assert_eq!(container[1], ("config_type", "podman".to_string()));
        assert_eq!(container[2], ("config_user", "root".to_string()));
    }
}
