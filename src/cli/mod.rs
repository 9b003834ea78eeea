//! CLI subcommands: render, info, client, keywords, profile, flavors,
//! scaffold, pipeline, playbook, set-defaults, switch, enable, disable.

use crate::core::client::{self, RandomSelector};
use crate::core::defaults::Tunable;
use crate::core::parser::{load_parameter_file, plan_name};
use crate::core::pipeline::{self, GithubPipeline};
use crate::core::playbook;
use crate::core::resolver::{ParameterResolver, ResolveOptions, Resolved};
use crate::core::scaffold;
use crate::core::settings::{LoadOptions, Settings};
use crate::core::types::{value_to_string, ParamMap, PlanInfo, RenderMode};
use crate::error::Error;
use clap::{Args, Subcommand};
use serde_yaml_ng::Value;
use std::path::{Path, PathBuf};

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalOpts {
    /// Home directory holding `.kcli/` (default: $HOME)
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// Client or group to operate on
    #[arg(short = 'C', long, global = true)]
    pub client: Option<String>,

    /// Do not require a local hypervisor when no config file exists
    #[arg(long, global = true)]
    pub offline: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Parameter forced on every plan rendered by this run, as key=value
    #[arg(long = "set", value_name = "KEY=VALUE", global = true)]
    pub set: Vec<String>,
}

/// Parameter overrides: a parameter file plus `-P key=value` flags.
#[derive(Args, Debug, Clone, Default)]
pub struct ParamArgs {
    /// Parameter override as key=value (value parsed as YAML)
    #[arg(short = 'P', long = "param")]
    pub params: Vec<String>,

    /// YAML file of parameter overrides, applied before -P flags
    #[arg(long)]
    pub paramfile: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render a plan template with its resolved parameters
    Render {
        /// Plan template
        file: PathBuf,

        /// Plan name (default: file stem)
        #[arg(long)]
        plan: Option<String>,

        #[command(flatten)]
        params: ParamArgs,

        /// Force every boolean parameter to true
        #[arg(long)]
        download_mode: bool,

        /// Render undefined variables as empty strings
        #[arg(long)]
        lenient: bool,

        /// Print the rendered text after the parameters prologue, unparsed
        #[arg(long)]
        partial: bool,

        /// URL the plan was fetched from, for remote base plans
        #[arg(long)]
        origin: Option<String>,
    },

    /// Show the parameters a plan accepts
    Info {
        /// Plan template
        file: PathBuf,

        /// URL the plan was fetched from, for remote base plans
        #[arg(long)]
        origin: Option<String>,

        /// Print parameters as a Markdown table
        #[arg(long)]
        doc: bool,
    },

    /// Show the client a command would target
    Client,

    /// List every setting with its effective value
    Keywords,

    /// Manage profiles
    Profile {
        #[command(subcommand)]
        action: ProfileCommands,
    },

    /// List flavors
    Flavors,

    /// Create a starter plan directory
    Scaffold {
        /// Directory to create
        directory: PathBuf,

        #[command(flatten)]
        params: ParamArgs,

        /// Do not generate the files section and files/
        #[arg(long)]
        skip_files: bool,

        /// Do not generate the scripts section and scripts/
        #[arg(long)]
        skip_scripts: bool,
    },

    /// Generate a CI pipeline for a plan
    Pipeline {
        #[command(subcommand)]
        target: PipelineCommands,
    },

    /// Generate Ansible playbooks for the VMs of a plan
    Playbook {
        /// Plan template
        file: PathBuf,

        #[command(flatten)]
        params: ParamArgs,

        /// Write playbook_<host>.yml files into this directory instead of printing
        #[arg(long)]
        outdir: Option<PathBuf>,
    },

    /// Write the effective defaults into the default section of the config
    SetDefaults,

    /// Make a client the default
    Switch { name: String },

    /// Enable a client
    Enable { name: String },

    /// Disable a client
    Disable { name: String },
}

#[derive(Subcommand, Debug)]
pub enum ProfileCommands {
    /// List profiles
    List,
    /// Show a profile with its base applied
    Show { name: String },
    /// Create a profile from -P options
    Create {
        name: String,
        #[command(flatten)]
        params: ParamArgs,
    },
    /// Update a profile with -P options
    Update {
        name: String,
        #[command(flatten)]
        params: ParamArgs,
    },
    /// Delete a profile
    Delete { name: String },
}

#[derive(Subcommand, Debug)]
pub enum PipelineCommands {
    /// Jenkinsfile
    Jenkins {
        /// Plan template
        file: PathBuf,

        #[command(flatten)]
        params: ParamArgs,
    },
    /// GitHub Actions workflow
    Github {
        /// Plan template or script
        file: PathBuf,

        /// Parameter file exposed as a workflow input
        #[arg(long)]
        paramfile: Option<String>,

        /// Run the file as a script instead of creating a plan
        #[arg(long)]
        script: bool,

        /// Workflow input as key=value (value parsed as YAML)
        #[arg(short = 'P', long = "param")]
        params: Vec<String>,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(global: &GlobalOpts, cmd: Commands) -> Result<(), Error> {
    match cmd {
        Commands::Render {
            file,
            plan,
            params,
            download_mode,
            lenient,
            partial,
            origin,
        } => {
            let plan = plan.unwrap_or_else(|| plan_name(&file));
            let opts = ResolveOptions {
                full: !partial,
                download_mode,
                mode: if lenient {
                    RenderMode::Lenient
                } else {
                    RenderMode::Strict
                },
                origin,
            };
            let text = cmd_render(&resolver(global)?, &plan, &file, &params.collect()?, &opts)?;
            print!("{text}");
            Ok(())
        }
        Commands::Info { file, origin, doc } => {
            let info = ParameterResolver::new().describe(&file, origin.as_deref())?;
            print!("{}", format_info(&info, doc));
            Ok(())
        }
        Commands::Client => cmd_client(global),
        Commands::Keywords => {
            let settings = load_settings(global)?;
            for (key, value) in settings.keywords(global.client.as_deref()) {
                println!("{}: {}", key, value_to_string(&value));
            }
            Ok(())
        }
        Commands::Profile { action } => cmd_profile(global, action),
        Commands::Flavors => {
            let settings = load_settings(global)?;
            for (name, flavor) in settings.flavors() {
                println!(
                    "{}: numcpus={} memory={} disk={}",
                    name,
                    flavor.numcpus.unwrap_or_default(),
                    flavor.memory.unwrap_or_default(),
                    flavor
                        .disk
                        .map(|d| d.to_string())
                        .unwrap_or_else(|| "-".into())
                );
            }
            Ok(())
        }
        Commands::Scaffold {
            directory,
            params,
            skip_files,
            skip_scripts,
        } => {
            scaffold::scaffold(&directory, &params.collect()?, skip_files, skip_scripts)?;
            println!("Created plan template in {}", directory.display());
            Ok(())
        }
        Commands::Pipeline { target } => cmd_pipeline(global, target),
        Commands::Playbook {
            file,
            params,
            outdir,
        } => cmd_playbook(global, &file, &params.collect()?, outdir.as_deref()),
        Commands::SetDefaults => {
            let mut settings = load_settings(global)?;
            settings.set_defaults()?;
            println!("Defaults written to {}", settings.config_path().display());
            Ok(())
        }
        Commands::Switch { name } => {
            let mut settings = load_settings(global)?;
            settings.switch_client(&name)?;
            println!("Switched to client {name}");
            Ok(())
        }
        Commands::Enable { name } => {
            let mut settings = load_settings(global)?;
            settings.enable_client(&name)?;
            println!("Enabled client {name}");
            Ok(())
        }
        Commands::Disable { name } => {
            let mut settings = load_settings(global)?;
            settings.disable_client(&name)?;
            println!("Disabled client {name}");
            Ok(())
        }
    }
}

// ============================================================================
// Overrides
// ============================================================================

impl ParamArgs {
    /// Parameter file entries, then `-P` flags (later wins).
    pub fn collect(&self) -> Result<ParamMap, Error> {
        let mut overrides = match &self.paramfile {
            Some(path) => load_parameter_file(path)?,
            None => ParamMap::new(),
        };
        overrides.extend(parse_params(&self.params)?);
        Ok(overrides)
    }
}

/// Parse `key=value` flags; values are read as YAML so `4` is an integer
/// and `false` a boolean.
pub fn parse_params(params: &[String]) -> Result<ParamMap, Error> {
    let mut out = ParamMap::new();
    for param in params {
        let (key, raw) = param
            .split_once('=')
            .ok_or_else(|| Error::Usage(format!("invalid parameter {param}, expected key=value")))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::Usage(format!("invalid parameter {param}, empty key")));
        }
        let value = serde_yaml_ng::from_str::<Value>(raw)
            .unwrap_or_else(|_| Value::String(raw.to_string()));
        out.insert(key.to_string(), value);
    }
    Ok(out)
}

// ============================================================================
// Commands
// ============================================================================

fn home_dir(global: &GlobalOpts) -> Result<PathBuf, Error> {
    global
        .home
        .clone()
        .or_else(|| std::env::var_os("HOME").map(PathBuf::from))
        .ok_or_else(|| Error::Usage("cannot determine home directory, use --home".into()))
}

fn load_settings(global: &GlobalOpts) -> Result<Settings, Error> {
    let opts = LoadOptions {
        offline: global.offline,
        ..LoadOptions::default()
    };
    Ok(Settings::load(&home_dir(global)?, &opts)?)
}

/// Resolver carrying the `--set` overrides.
fn resolver(global: &GlobalOpts) -> Result<ParameterResolver, Error> {
    Ok(ParameterResolver::new().with_global_overrides(parse_params(&global.set)?))
}

fn cmd_render(
    resolver: &ParameterResolver,
    plan: &str,
    file: &Path,
    overrides: &ParamMap,
    opts: &ResolveOptions,
) -> Result<String, Error> {
    match resolver.resolve(plan, file, overrides, opts)? {
        Resolved::Partial(text) => Ok(text),
        Resolved::Full(resolution) => Ok(serde_yaml_ng::to_string(&resolution.document)?),
    }
}

fn format_info(info: &PlanInfo, doc: bool) -> String {
    let mut out = format!("Plan: {}\n", info.file.display());
    if let Some(description) = &info.description {
        out.push_str(&format!("{description}\n"));
    }
    if let Some(text) = &info.info {
        out.push_str(&format!("{}\n", text.trim_end()));
    }
    if doc {
        out.push_str(&doc_table(&info.parameters));
    } else {
        for (name, value) in &info.parameters {
            out.push_str(&format!("  {}: {}\n", name, value_to_string(value)));
        }
    }
    if let Some(base) = &info.base {
        out.push_str(&format!("Base plan parameters ({}):\n", base.file.display()));
        out.push_str(&format_info(base, doc));
    }
    out
}

/// Markdown table of parameter names and default values, columns padded
/// to the widest cell.
fn doc_table(parameters: &[(String, Value)]) -> String {
    const NAME: &str = "Parameter";
    const VALUE: &str = "Default Value";
    let rows: Vec<(&str, String)> = parameters
        .iter()
        .map(|(name, value)| (name.as_str(), value_to_string(value)))
        .collect();
    let name_width = rows.iter().map(|(n, _)| n.len()).fold(NAME.len(), usize::max);
    let value_width = rows.iter().map(|(_, v)| v.len()).fold(VALUE.len(), usize::max);

    let mut out = format!("|{NAME:<name_width$}|{VALUE:<value_width$}|\n");
    out.push_str(&format!("|{}|{}|\n", "-".repeat(name_width), "-".repeat(value_width)));
    for (name, value) in rows {
        out.push_str(&format!("|{name:<name_width$}|{value:<value_width$}|\n"));
    }
    out
}

fn cmd_client(global: &GlobalOpts) -> Result<(), Error> {
    let settings = load_settings(global)?;
    let mut selector = RandomSelector::new();
    let resolved = client::resolve(global.client.as_deref(), &settings, &mut selector)?;
    print!("{}", serde_yaml_ng::to_string(&resolved)?);
    Ok(())
}

fn cmd_profile(global: &GlobalOpts, action: ProfileCommands) -> Result<(), Error> {
    let mut settings = load_settings(global)?;
    match action {
        ProfileCommands::List => {
            for name in settings.profiles().keys() {
                println!("{name}");
            }
        }
        ProfileCommands::Show { name } => {
            let profile = settings.resolve_profile(&name)?;
            print!("{}", serde_yaml_ng::to_string(&profile)?);
        }
        ProfileCommands::Create { name, params } => {
            if settings.create_profile(&name, &params.collect()?)? {
                println!("Profile {name} created");
            } else {
                println!("Profile {name} already there");
            }
        }
        ProfileCommands::Update { name, params } => {
            settings.update_profile(&name, &params.collect()?)?;
            println!("Profile {name} updated");
        }
        ProfileCommands::Delete { name } => {
            settings.delete_profile(&name)?;
            println!("Profile {name} deleted");
        }
    }
    Ok(())
}

fn cmd_playbook(
    global: &GlobalOpts,
    file: &Path,
    overrides: &ParamMap,
    outdir: Option<&Path>,
) -> Result<(), Error> {
    let settings = load_settings(global)?;
    let mut selector = RandomSelector::new();
    let client = client::resolve(global.client.as_deref(), &settings, &mut selector)?;
    let playbooks = playbook::plan_playbooks(&resolver(global)?, file, overrides, &client.active)?;
    for pb in playbooks {
        match outdir {
            Some(dir) => {
                let path = dir.join(pb.file_name());
                std::fs::write(&path, &pb.text).map_err(|e| Error::Write {
                    path: path.clone(),
                    source: e,
                })?;
                println!("Generated {}", path.display());
            }
            None => print!("{}", pb.text),
        }
    }
    Ok(())
}

fn cmd_pipeline(global: &GlobalOpts, target: PipelineCommands) -> Result<(), Error> {
    let text = match target {
        PipelineCommands::Jenkins { file, params } => {
            let settings = load_settings(global)?;
            let mode = value_to_string(
                settings.option(Tunable::Jenkinsmode, global.client.as_deref()),
            );
            pipeline::jenkins_pipeline(&file, &params.collect()?, &mode)?
        }
        PipelineCommands::Github {
            file,
            paramfile,
            script,
            params,
        } => pipeline::github_pipeline(&GithubPipeline {
            inputfile: &file,
            paramfile: paramfile.as_deref(),
            overrides: parse_params(&params)?,
            script,
        })?,
    };
    print!("{text}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, ResolveError};

    fn home_with_config(config: &str) -> tempfile::TempDir {
        let home = tempfile::tempdir().unwrap();
        let kclidir = home.path().join(".kcli");
        std::fs::create_dir_all(&kclidir).unwrap();
        std::fs::write(kclidir.join("config.yml"), config).unwrap();
        home
    }

    fn global(home: &Path) -> GlobalOpts {
        GlobalOpts {
            home: Some(home.to_path_buf()),
            offline: true,
            ..GlobalOpts::default()
        }
    }

    const CONFIG: &str = "default:\n  client: kvm1\nkvm1:\n  host: 10.0.0.1\nkvm2:\n  host: 10.0.0.2\n  enabled: false\n";

    #[test]
    fn test_parse_params_yaml_scalars() {
        let params = parse_params(&[
            "cpus=4".into(),
            "flag=false".into(),
            "image=centos8".into(),
            "disks=[10, 20]".into(),
            "url=http://x/y?a=b".into(),
        ])
        .unwrap();
        assert_eq!(params["cpus"], Value::from(4));
        assert_eq!(params["flag"], Value::Bool(false));
        assert_eq!(params["image"], Value::from("centos8"));
        assert_eq!(params["disks"].as_sequence().map(Vec::len), Some(2));
        assert_eq!(params["url"], Value::from("http://x/y?a=b"));
    }

    #[test]
    fn test_parse_params_rejects_missing_equals() {
        assert!(matches!(parse_params(&["cpus".into()]), Err(Error::Usage(_))));
        assert!(matches!(parse_params(&["=4".into()]), Err(Error::Usage(_))));
    }

    #[test]
    fn test_paramfile_then_flags() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("params.yml");
        std::fs::write(&file, "memory: 1024\nimage: fedora\n").unwrap();
        let args = ParamArgs {
            params: vec!["memory=4096".into()],
            paramfile: Some(file),
        };
        let overrides = args.collect().unwrap();
        assert_eq!(overrides["memory"], Value::from(4096));
        assert_eq!(overrides["image"], Value::from("fedora"));
    }

    #[test]
    fn test_render_full_and_partial() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("lab.yml");
        std::fs::write(
            &file,
            "parameters:\n  memory: 2048\nvm1:\n  memory: {{ memory }}\n  plan: {{ plan }}\n",
        )
        .unwrap();
        let overrides = parse_params(&["memory=512".into()]).unwrap();
        let resolver = ParameterResolver::new();
        let full = cmd_render(&resolver, "lab", &file, &overrides, &ResolveOptions::full()).unwrap();
        let doc: Value = serde_yaml_ng::from_str(&full).unwrap();
        assert_eq!(doc["vm1"]["memory"], Value::from(512));
        assert_eq!(doc["vm1"]["plan"], Value::from("lab"));
        assert!(doc.get("parameters").is_none());

        let partial =
            cmd_render(&resolver, "lab", &file, &ParamMap::new(), &ResolveOptions::default()).unwrap();
        assert!(partial.contains("memory: 2048"));
        assert!(!partial.contains("parameters:"));
    }

    #[test]
    fn test_dispatch_render_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = dispatch(
            &GlobalOpts::default(),
            Commands::Render {
                file: dir.path().join("missing.yml"),
                plan: None,
                params: ParamArgs::default(),
                download_mode: false,
                lenient: false,
                partial: false,
                origin: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::Resolve(ResolveError::NotFound(_))));
    }

    #[test]
    fn test_format_info_lists_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("lab.yml");
        std::fs::write(
            &file,
            "parameters:\n  description: demo lab\n  image: centos8\n  memory: 1024\nvm1:\n  image: {{ image }}\n",
        )
        .unwrap();
        let info = ParameterResolver::new().describe(&file, None).unwrap();
        let text = format_info(&info, false);
        assert!(text.contains("demo lab"));
        assert!(text.contains("  image: centos8\n"));
        assert!(text.contains("  memory: 1024\n"));
    }

    #[test]
    fn test_dispatch_switch_and_disable() {
        let home = home_with_config(CONFIG);
        let g = global(home.path());
        let err = dispatch(&g, Commands::Switch { name: "kvm2".into() }).unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::DisabledClient(_))));

        dispatch(&g, Commands::Enable { name: "kvm2".into() }).unwrap();
        dispatch(&g, Commands::Switch { name: "kvm2".into() }).unwrap();
        let settings = load_settings(&g).unwrap();
        assert_eq!(settings.default_client(), "kvm2");

        dispatch(&g, Commands::Disable { name: "kvm1".into() }).unwrap();
        let settings = load_settings(&g).unwrap();
        assert!(!settings.is_enabled("kvm1"));
    }

    #[test]
    fn test_dispatch_client_and_keywords() {
        let home = home_with_config(CONFIG);
        let g = global(home.path());
        dispatch(&g, Commands::Client).unwrap();
        dispatch(&g, Commands::Keywords).unwrap();
    }

    #[test]
    fn test_dispatch_profile_lifecycle() {
        let home = home_with_config(CONFIG);
        let g = global(home.path());
        let params = ParamArgs {
            params: vec!["memory=2048".into(), "numcpus=2".into()],
            paramfile: None,
        };
        dispatch(
            &g,
            Commands::Profile {
                action: ProfileCommands::Create {
                    name: "small".into(),
                    params,
                },
            },
        )
        .unwrap();
        let settings = load_settings(&g).unwrap();
        assert_eq!(
            settings.resolve_profile("small").unwrap().options["memory"],
            Value::from(2048)
        );
        dispatch(
            &g,
            Commands::Profile {
                action: ProfileCommands::Delete { name: "small".into() },
            },
        )
        .unwrap();
        let settings = load_settings(&g).unwrap();
        assert!(settings.profiles().is_empty());
    }

    #[test]
    fn test_dispatch_scaffold() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("myplan");
        dispatch(
            &GlobalOpts::default(),
            Commands::Scaffold {
                directory: target.clone(),
                params: ParamArgs::default(),
                skip_files: false,
                skip_scripts: true,
            },
        )
        .unwrap();
        assert!(target.join("kcli_plan.yml").is_file());
        assert!(!target.join("scripts").exists());
    }

    #[test]
    fn test_doc_table_pads_columns() {
        let params = vec![
            ("image".to_string(), Value::from("centos8")),
            ("numcpus".to_string(), Value::from(2)),
        ];
        let table = doc_table(&params);
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(
            lines,
            vec![
                "|Parameter|Default Value|",
                "|---------|-------------|",
                "|image    |centos8      |",
                "|numcpus  |2            |",
            ]
        );
    }

    #[test]
    fn test_doc_table_widens_to_longest_cell() {
        let params = vec![
            ("domain".to_string(), Value::from("cluster.example.com")),
            ("api_ip_is_reserved".to_string(), Value::Bool(false)),
        ];
        let table = doc_table(&params);
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines[0], "|Parameter         |Default Value      |");
        assert_eq!(lines[2], "|domain            |cluster.example.com|");
        assert!(lines.iter().all(|l| l.len() == lines[0].len()));
    }

    #[test]
    fn test_format_info_doc_includes_base_plan() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("parent.yml"), "parameters:\n  pool: vms\nbase: {}\n").unwrap();
        let file = dir.path().join("lab.yml");
        std::fs::write(
            &file,
            "parameters:\n  baseplan: parent.yml\n  image: centos8\nvm1:\n  image: {{ image }}\n",
        )
        .unwrap();
        let info = ParameterResolver::new().describe(&file, None).unwrap();
        let text = format_info(&info, true);
        assert_eq!(text.matches("|Parameter").count(), 2);
        assert!(text.contains("|image    |centos8      |\n"));
        assert!(text.contains("|pool     |vms          |\n"));
        assert!(!text.contains("  image: centos8"));
    }

    #[test]
    fn test_set_overrides_win_over_param_flags() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("lab.yml");
        std::fs::write(&file, "parameters:\n  pool: default\nvm1:\n  pool: {{ pool }}\n").unwrap();
        let g = GlobalOpts {
            set: vec!["pool=fast".into()],
            ..GlobalOpts::default()
        };
        let overrides = parse_params(&["pool=slow".into()]).unwrap();
        let text = cmd_render(&resolver(&g).unwrap(), "lab", &file, &overrides, &ResolveOptions::full()).unwrap();
        let doc: Value = serde_yaml_ng::from_str(&text).unwrap();
        assert_eq!(doc["vm1"]["pool"], Value::from("fast"));

        let bad = GlobalOpts {
            set: vec!["pool".into()],
            ..GlobalOpts::default()
        };
        assert!(matches!(resolver(&bad), Err(Error::Usage(_))));
    }

    #[test]
    fn test_dispatch_playbook_writes_files() {
        let home = home_with_config(CONFIG);
        let plan = home.path().join("lab.yml");
        std::fs::write(&plan, "vm1:\n  cmds:\n  - uptime\nvm2:\n  image: centos8\n").unwrap();
        let outdir = tempfile::tempdir().unwrap();
        dispatch(
            &global(home.path()),
            Commands::Playbook {
                file: plan,
                params: ParamArgs::default(),
                outdir: Some(outdir.path().to_path_buf()),
            },
        )
        .unwrap();
        let text = std::fs::read_to_string(outdir.path().join("playbook_vm1.yml")).unwrap();
        assert!(text.starts_with("- hosts: vm1\n"));
        assert!(text.contains("config_host: \"10.0.0.1\""));
        assert!(!outdir.path().join("playbook_vm2.yml").exists());
    }

    #[test]
    fn test_dispatch_set_defaults() {
        let home = home_with_config(CONFIG);
        let g = global(home.path());
        dispatch(&g, Commands::SetDefaults).unwrap();
        let settings = load_settings(&g).unwrap();
        let default = settings.section("default").unwrap();
        assert_eq!(default["client"], Value::from("kvm1"));
        assert_eq!(default["numcpus"], Value::from(2));
        assert_eq!(default["pool"], Value::from("default"));
        assert_eq!(settings.clients(), vec!["kvm1", "kvm2"]);
    }

    #[test]
    fn test_dispatch_jenkins_uses_configured_mode() {
        let home = home_with_config("default:\n  client: kvm1\n  jenkinsmode: lxc\nkvm1:\n  host: 10.0.0.1\n");
        let plan = home.path().join("lab.yml");
        std::fs::write(&plan, "vm1:\n  memory: 512\n").unwrap();
        let err = dispatch(
            &global(home.path()),
            Commands::Pipeline {
                target: PipelineCommands::Jenkins {
                    file: plan,
                    params: ParamArgs::default(),
                },
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::InvalidJenkinsMode(_))));
    }
}
