//! Starter plan tree generation.

use super::types::ParamMap;
use crate::error::{Error, RenderError};
use serde_yaml_ng::Value;
use std::collections::BTreeMap;
use std::path::Path;

const DEFAULTS_HEADER: &str =
    "# Default parameter values for your plan\n# This is a YAML-formatted file\n";
const SAMPLE_HEADER: &str =
    "# Optional runtime parameter values for your plan\n# This is a YAML-formatted file\n";

const FILES_SECTION: &str = "  files:
  - path: /etc/motd
    content: Welcome to cluster {{ cluster }}
  - path: /etc/myfile01
    origin: files/myfile01
";

const SCRIPTS_SECTION: &str = "  scripts:
  - scripts/script01.sh
{%- if num == 0 %}
  - scripts/script02.sh
{%- endif %}
";

const SCRIPT01: &str = "#!/bin/bash\necho best guitarist is {{ bestguitarist }}\n";
const SCRIPT02: &str = "#!/bin/bash\necho i am vm {{ name }} >/tmp/plan.txt\n";
const MYFILE01: &str = "a good movie to see is {{ bestmovie }}\n";

/// Parameters every scaffolded plan starts from.
pub fn starter_parameters() -> ParamMap {
    let mut data = ParamMap::new();
    let nets: Value = serde_yaml_ng::from_str("[default, {name: default, type: e1000}]")
        .unwrap_or(Value::Null);
    let disks: Value =
        serde_yaml_ng::from_str("[10, {size: 20, interface: scsi}]").unwrap_or(Value::Null);
    data.insert("cluster".into(), Value::from("testk"));
    data.insert("image".into(), Value::from("centos8"));
    data.insert("vms_number".into(), Value::from(3));
    data.insert("memory".into(), Value::from(8192));
    data.insert("numcpus".into(), Value::from(4));
    data.insert("nets".into(), nets);
    data.insert("disks".into(), disks);
    data.insert("bestguitarist".into(), Value::from("jimihendrix"));
    data.insert("bestmovie".into(), Value::from("interstellar"));
    data
}

/// Write a starter plan into `directory`.
///
/// `overrides` replace starter values; keys that are not starter parameters
/// are also added to every VM of the generated plan.
pub fn scaffold(
    directory: &Path,
    overrides: &ParamMap,
    skip_files: bool,
    skip_scripts: bool,
) -> Result<(), Error> {
    tracing::info!("Creating plan template in {}", directory.display());
    if directory.exists() {
        tracing::warn!("Directory {} already exists", directory.display());
    }
    create_dir(directory)?;
    if !skip_scripts {
        create_dir(&directory.join("scripts"))?;
    }
    if !skip_files {
        create_dir(&directory.join("files"))?;
    }

    let starter = starter_parameters();
    let mut data: BTreeMap<String, Value> = starter.clone().into_iter().collect();
    data.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    let dump = serde_yaml_ng::to_string(&data).map_err(|e| RenderError::Context {
        file: "kcli_default.yml".into(),
        message: e.to_string(),
    })?;
    write(&directory.join("kcli_default.yml"), &format!("{DEFAULTS_HEADER}{dump}"))?;
    write(
        &directory.join("kcli_parameters.yml.sample"),
        &format!("{SAMPLE_HEADER}{dump}"),
    )?;

    let extra: BTreeMap<&String, &Value> = overrides
        .iter()
        .filter(|(k, _)| !starter.contains_key(k.as_str()))
        .collect();
    write(
        &directory.join("kcli_plan.yml"),
        &plan_template(&extra, skip_files, skip_scripts),
    )?;

    if !skip_scripts {
        write(&directory.join("scripts").join("script01.sh"), SCRIPT01)?;
        write(&directory.join("scripts").join("script02.sh"), SCRIPT02)?;
    }
    if !skip_files {
        write(&directory.join("files").join("myfile01"), MYFILE01)?;
    }
    Ok(())
}

fn plan_template(extra: &BTreeMap<&String, &Value>, skip_files: bool, skip_scripts: bool) -> String {
    let mut out = String::from("{% for num in range(end=vms_number) %}\n");
    out.push_str("{{ cluster }}-{{ num }}:\n");
    out.push_str("  image: {{ image }}\n");
    out.push_str("  memory: {{ memory }}\n");
    out.push_str("  numcpus: {{ numcpus }}\n");
    out.push_str("  disks: {{ disks | json_encode }}\n");
    out.push_str("  nets: {{ nets | json_encode }}\n");
    if !skip_files {
        out.push_str(FILES_SECTION);
    }
    if !skip_scripts {
        out.push_str(SCRIPTS_SECTION);
    }
    for (key, value) in extra {
        match value {
            Value::Sequence(_) | Value::Mapping(_) => {
                out.push_str(&format!("  {key}: {{{{ {key} | json_encode }}}}\n"))
            }
            _ => out.push_str(&format!("  {key}: {{{{ {key} }}}}\n")),
        }
    }
    out.push_str("{% endfor %}\n");
    out
}

fn create_dir(path: &Path) -> Result<(), Error> {
    std::fs::create_dir_all(path).map_err(|source| Error::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn write(path: &Path, content: &str) -> Result<(), Error> {
    std::fs::write(path, content).map_err(|source| Error::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resolver::ParameterResolver;

    fn resolve(dir: &Path) -> crate::core::types::Resolution {
        ParameterResolver::new()
            .resolve_full("demo", &dir.join("kcli_plan.yml"), &ParamMap::new(), false)
            .unwrap()
    }

    #[test]
    fn test_scaffold_writes_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("demo");
        scaffold(&dir, &ParamMap::new(), false, false).unwrap();
        for f in [
            "kcli_default.yml",
            "kcli_parameters.yml.sample",
            "kcli_plan.yml",
            "scripts/script01.sh",
            "scripts/script02.sh",
            "files/myfile01",
        ] {
            assert!(dir.join(f).is_file(), "missing {f}");
        }
        let defaults = std::fs::read_to_string(dir.join("kcli_default.yml")).unwrap();
        assert!(defaults.starts_with("# Default parameter values for your plan\n"));
        let body: Vec<&str> = defaults
            .lines()
            .filter(|l| !l.starts_with('#') && !l.starts_with(' ') && !l.starts_with('-'))
            .collect();
        assert_eq!(body.first().copied(), Some("bestguitarist: jimihendrix"));
    }

    #[test]
    fn test_scaffolded_plan_renders() {
        let tmp = tempfile::tempdir().unwrap();
        scaffold(tmp.path(), &ParamMap::new(), false, false).unwrap();
        let res = resolve(tmp.path());
        let names: Vec<&str> = res.document.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["testk-0", "testk-1", "testk-2"]);
        let first = &res.document["testk-0"];
        assert_eq!(first["image"], Value::from("centos8"));
        assert_eq!(first["memory"], Value::from(8192));
        assert_eq!(first["disks"][1]["size"], Value::from(20));
        assert_eq!(first["scripts"].as_sequence().unwrap().len(), 2);
        assert_eq!(res.document["testk-1"]["scripts"].as_sequence().unwrap().len(), 1);
        assert_eq!(
            first["files"][0]["content"],
            Value::from("Welcome to cluster testk")
        );
    }

    #[test]
    fn test_scaffold_overrides_and_extra_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let mut overrides = ParamMap::new();
        overrides.insert("vms_number".into(), Value::from(2));
        overrides.insert("role".into(), Value::from("worker"));
        scaffold(tmp.path(), &overrides, false, false).unwrap();
        let plan = std::fs::read_to_string(tmp.path().join("kcli_plan.yml")).unwrap();
        assert!(plan.contains("  role: {{ role }}\n"));
        assert!(!plan.contains("vms_number }}\n"));
        let res = resolve(tmp.path());
        assert_eq!(res.document.len(), 2);
        assert_eq!(res.document["testk-1"]["role"], Value::from("worker"));
    }

    #[test]
    fn test_scaffold_skip_files_and_scripts() {
        let tmp = tempfile::tempdir().unwrap();
        scaffold(tmp.path(), &ParamMap::new(), true, true).unwrap();
        assert!(!tmp.path().join("scripts").exists());
        assert!(!tmp.path().join("files").exists());
        let plan = std::fs::read_to_string(tmp.path().join("kcli_plan.yml")).unwrap();
        assert!(!plan.contains("scripts:"));
        assert!(!plan.contains("files:"));
        let res = resolve(tmp.path());
        assert!(res.document["testk-0"].get("scripts").is_none());
    }

    #[test]
    fn test_scaffold_existing_directory_is_not_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        scaffold(tmp.path(), &ParamMap::new(), false, false).unwrap();
        scaffold(tmp.path(), &ParamMap::new(), false, false).unwrap();
        assert!(tmp.path().join("kcli_plan.yml").is_file());
    }
}
