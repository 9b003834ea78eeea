//! Settings store: `config.yml`, `secrets.yml`, profiles and flavors.
//!
//! Loaded once per process from `<home>/.kcli/` and read-only afterwards,
//! except for the explicit client and profile management calls which
//! rewrite their file atomically.

use super::defaults::{coerce_section, truthy, EffectiveDefaults, Tunable};
use super::parser::expand_home;
use super::types::{
    Flavor, ParamMap, Profile, Section, SettingValue, PROFILE_TYPES,
};
use crate::error::ConfigError;
use indexmap::IndexMap;
use serde_yaml_ng::Value;
use std::path::{Path, PathBuf};

/// Name of the global section.
pub const DEFAULT_SECTION: &str = "default";

/// Client used when nothing else is configured.
pub const LOCAL_CLIENT: &str = "local";

/// Plan name used when `<home>/.kcli/plan` is absent.
pub const DEFAULT_PLAN: &str = "kvirt";

/// Section name → option mapping, in file order.
type Sections = IndexMap<String, Section>;

/// Knobs for [`Settings::load`].
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Skip the local hypervisor check when no config file exists.
    pub offline: bool,
    /// Silence non-fatal warnings.
    pub quiet: bool,
    /// Socket whose presence means a local hypervisor is reachable.
    pub hypervisor_socket: PathBuf,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            offline: false,
            quiet: false,
            hypervisor_socket: PathBuf::from("/var/run/libvirt/libvirt-sock"),
        }
    }
}

/// Layered settings: built-in → `default` section → client section.
#[derive(Debug, Clone)]
pub struct Settings {
    config_path: PathBuf,
    /// Sections as written on disk, secret sentinels intact.
    raw: Sections,
    /// Sections with secrets substituted; tunables of `default` coerced.
    sections: Sections,
    defaults: EffectiveDefaults,
    profiles_path: PathBuf,
    profiles: IndexMap<String, Profile>,
    flavors: IndexMap<String, Flavor>,
    current_plan: String,
}

impl Settings {
    /// Load settings from `<home>/.kcli/`.
    pub fn load(home: &Path, opts: &LoadOptions) -> Result<Self, ConfigError> {
        let kclidir = home.join(".kcli");

        let secrets = match first_existing(&kclidir, &["secrets.yml", "secrets.yaml"]) {
            Some(path) => read_sections(&path)?.unwrap_or_default(),
            None => Sections::new(),
        };

        let (config_path, mut raw) =
            match first_existing(&kclidir, &["config.yml", "config.yaml"]) {
                Some(path) => {
                    let raw = read_sections(&path)?
                        .ok_or_else(|| ConfigError::EmptyConfig(path.clone()))?;
                    tracing::debug!(path = %path.display(), sections = raw.len(), "loaded config");
                    (path, raw)
                }
                None => {
                    if !opts.offline && !opts.hypervisor_socket.exists() {
                        return Err(ConfigError::NoLocalHypervisor);
                    }
                    tracing::debug!("no config file, using implicit local client");
                    (kclidir.join("config.yml"), implicit_local())
                }
            };

        if !raw.contains_key(DEFAULT_SECTION) {
            if raw.len() != 1 {
                return Err(ConfigError::MissingDefaultSection);
            }
            let only = raw.keys().next().cloned().unwrap_or_default();
            let mut default = Section::new();
            default.insert("client".into(), Value::String(only));
            raw.insert(DEFAULT_SECTION.into(), default);
        }
        let has_client = raw
            .get(DEFAULT_SECTION)
            .is_some_and(|d| d.contains_key("client"));
        if !has_client {
            if !opts.quiet {
                tracing::warn!("Using local libvirt as no client was specified...");
            }
            if let Some(default) = raw.get_mut(DEFAULT_SECTION) {
                default.insert("client".into(), Value::String(LOCAL_CLIENT.into()));
            }
            raw.entry(LOCAL_CLIENT.into()).or_default();
        }

        let mut sections = substitute_secrets(&raw, &secrets)?;
        if let Some(default) = sections.get_mut(DEFAULT_SECTION) {
            coerce_section(default)?;
        }
        let default = sections
            .get(DEFAULT_SECTION)
            .ok_or(ConfigError::MissingDefaultSection)?;
        let defaults = EffectiveDefaults::from_default_section(default)?;

        let profiles_path = path_option(default, "profiles")
            .unwrap_or_else(|| kclidir.join("profiles.yml"));
        let profiles = load_profiles(&profiles_path)?;
        let flavors_path =
            path_option(default, "flavors").unwrap_or_else(|| kclidir.join("flavors.yml"));
        let flavors = load_flavors(&flavors_path)?;

        let current_plan = std::fs::read_to_string(kclidir.join("plan"))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_PLAN.to_string());

        Ok(Self {
            config_path,
            raw,
            sections,
            defaults,
            profiles_path,
            profiles,
            flavors,
            current_plan,
        })
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn defaults(&self) -> &EffectiveDefaults {
        &self.defaults
    }

    pub fn current_plan(&self) -> &str {
        &self.current_plan
    }

    /// Every section name except `default`, in file order.
    pub fn clients(&self) -> Vec<&str> {
        self.sections
            .keys()
            .filter(|k| k.as_str() != DEFAULT_SECTION)
            .map(String::as_str)
            .collect()
    }

    /// Resolved section: secrets substituted, and coerced when it is `default`.
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }

    /// `default.client`.
    pub fn default_client(&self) -> &str {
        self.sections
            .get(DEFAULT_SECTION)
            .and_then(|d| d.get("client"))
            .and_then(Value::as_str)
            .unwrap_or(LOCAL_CLIENT)
    }

    /// Whether a section is enabled (absent `enabled` means true).
    pub fn is_enabled(&self, name: &str) -> bool {
        self.sections
            .get(name)
            .and_then(|s| s.get("enabled"))
            .map(truthy)
            .unwrap_or(true)
    }

    /// Effective value of `tunable`: the client section when it sets one,
    /// otherwise the effective default.
    pub fn option(&self, tunable: Tunable, client: Option<&str>) -> &Value {
        client
            .and_then(|c| self.sections.get(c))
            .and_then(|s| s.get(tunable.key()))
            .unwrap_or_else(|| self.defaults.get(tunable))
    }

    /// Every tunable with its effective value for `client`.
    pub fn keywords(&self, client: Option<&str>) -> IndexMap<&'static str, Value> {
        Tunable::ALL
            .iter()
            .map(|t| (t.key(), self.option(*t, client).clone()))
            .collect()
    }

    // ========================================================================
    // Client management
    // ========================================================================

    /// Make `name` the default client.
    pub fn switch_client(&mut self, name: &str) -> Result<(), ConfigError> {
        self.ensure_client(name)?;
        if !self.is_enabled(name) {
            return Err(ConfigError::DisabledClient(name.to_string()));
        }
        tracing::info!(client = name, "switching default client");
        let value = Value::String(name.to_string());
        self.set_option(DEFAULT_SECTION, "client", value);
        self.save_config()
    }

    pub fn enable_client(&mut self, name: &str) -> Result<(), ConfigError> {
        self.ensure_client(name)?;
        tracing::info!(client = name, "enabling client");
        self.set_option(name, "enabled", Value::Bool(true));
        self.save_config()
    }

    /// Disable a client; the current default cannot be disabled.
    pub fn disable_client(&mut self, name: &str) -> Result<(), ConfigError> {
        self.ensure_client(name)?;
        if self.default_client() == name {
            return Err(ConfigError::ClientIsDefault(name.to_string()));
        }
        tracing::info!(client = name, "disabling client");
        self.set_option(name, "enabled", Value::Bool(false));
        self.save_config()
    }

    /// Persist the effective defaults as the `default` section.
    ///
    /// Tunables are written sorted by key, skipping null values and empty
    /// lists. `client` and keys that are not tunables are kept, and options
    /// stored as secret sentinels stay sentinels.
    pub fn set_defaults(&mut self) -> Result<(), ConfigError> {
        let mut tunables: Vec<(&'static str, &Value)> = self
            .defaults
            .iter()
            .filter(|(_, value)| !is_unset(value))
            .collect();
        tunables.sort_by_key(|(key, _)| *key);

        let old_raw = self.raw.get(DEFAULT_SECTION).cloned().unwrap_or_default();
        let old_resolved = self.sections.get(DEFAULT_SECTION).cloned().unwrap_or_default();
        let client = Value::String(self.default_client().to_string());
        let mut raw = Section::new();
        let mut resolved = Section::new();
        raw.insert("client".into(), client.clone());
        resolved.insert("client".into(), client);
        for (key, value) in tunables {
            let stored = match old_raw.get(key) {
                Some(v) => match SettingValue::classify(DEFAULT_SECTION, key, v.clone()) {
                    SettingValue::Secret(_) => v.clone(),
                    SettingValue::Literal(_) => value.clone(),
                },
                None => value.clone(),
            };
            raw.insert(key.to_string(), stored);
            resolved.insert(key.to_string(), value.clone());
        }
        for (key, value) in &old_raw {
            if Tunable::from_key(key).is_none() && !raw.contains_key(key) {
                raw.insert(key.clone(), value.clone());
                if let Some(v) = old_resolved.get(key) {
                    resolved.insert(key.clone(), v.clone());
                }
            }
        }

        tracing::info!(path = %self.config_path.display(), options = raw.len(), "writing defaults");
        self.raw.insert(DEFAULT_SECTION.into(), raw);
        self.sections.insert(DEFAULT_SECTION.into(), resolved);
        self.save_config()
    }

    fn ensure_client(&self, name: &str) -> Result<(), ConfigError> {
        if name == DEFAULT_SECTION || !self.sections.contains_key(name) {
            return Err(ConfigError::UnknownClient(name.to_string()));
        }
        Ok(())
    }

    fn set_option(&mut self, section: &str, key: &str, value: Value) {
        for sections in [&mut self.raw, &mut self.sections] {
            sections
                .entry(section.to_string())
                .or_default()
                .insert(key.to_string(), value.clone());
        }
    }

    fn save_config(&self) -> Result<(), ConfigError> {
        let yaml = serde_yaml_ng::to_string(&self.raw).map_err(|e| ConfigError::Parse {
            path: self.config_path.clone(),
            message: e.to_string(),
        })?;
        write_atomic(&self.config_path, &yaml)
    }

    // ========================================================================
    // Profiles and flavors
    // ========================================================================

    pub fn profiles(&self) -> &IndexMap<String, Profile> {
        &self.profiles
    }

    pub fn profiles_path(&self) -> &Path {
        &self.profiles_path
    }

    /// A profile with unset options taken from its `base` (one level only).
    pub fn resolve_profile(&self, name: &str) -> Result<Profile, ConfigError> {
        let profile = self
            .profiles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))?;
        let Some(base_name) = profile.base.as_deref() else {
            return Ok(profile.clone());
        };
        let base = self
            .profiles
            .get(base_name)
            .ok_or_else(|| ConfigError::UnknownBaseProfile {
                profile: name.to_string(),
                base: base_name.to_string(),
            })?;
        let mut merged = profile.clone();
        if merged.kind.is_none() {
            merged.kind = base.kind.clone();
        }
        for (key, value) in &base.options {
            merged
                .options
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        Ok(merged)
    }

    /// Flavors defining both `numcpus` and `memory`, sorted by name.
    pub fn flavors(&self) -> Vec<(&str, &Flavor)> {
        let mut complete: Vec<_> = self
            .flavors
            .iter()
            .filter(|(_, f)| f.numcpus.is_some() && f.memory.is_some())
            .map(|(n, f)| (n.as_str(), f))
            .collect();
        complete.sort_by(|a, b| a.0.cmp(b.0));
        complete
    }

    /// Add a profile. Returns `false` when it already existed (left untouched).
    pub fn create_profile(&mut self, name: &str, options: &ParamMap) -> Result<bool, ConfigError> {
        if self.profiles.contains_key(name) {
            tracing::info!(profile = name, "profile already there");
            return Ok(false);
        }
        if options.is_empty() {
            return Err(ConfigError::EmptyProfile(name.to_string()));
        }
        let mut profile = Profile::default();
        apply_profile_options(name, &mut profile, options)?;
        self.profiles.insert(name.to_string(), profile);
        self.save_profiles()?;
        Ok(true)
    }

    /// Overlay `options` onto an existing profile.
    pub fn update_profile(&mut self, name: &str, options: &ParamMap) -> Result<(), ConfigError> {
        if options.is_empty() {
            return Err(ConfigError::EmptyProfile(name.to_string()));
        }
        let profile = self
            .profiles
            .get_mut(name)
            .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))?;
        apply_profile_options(name, profile, options)?;
        self.save_profiles()
    }

    /// Remove a profile; the profiles file is deleted once empty.
    pub fn delete_profile(&mut self, name: &str) -> Result<(), ConfigError> {
        if self.profiles.shift_remove(name).is_none() {
            return Err(ConfigError::UnknownProfile(name.to_string()));
        }
        if self.profiles.is_empty() {
            match std::fs::remove_file(&self.profiles_path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                    return Err(ConfigError::Write {
                        path: self.profiles_path.clone(),
                        source: e,
                    })
                }
                _ => return Ok(()),
            }
        }
        self.save_profiles()
    }

    fn save_profiles(&self) -> Result<(), ConfigError> {
        let yaml = serde_yaml_ng::to_string(&self.profiles).map_err(|e| ConfigError::Parse {
            path: self.profiles_path.clone(),
            message: e.to_string(),
        })?;
        write_atomic(&self.profiles_path, &yaml)
    }
}

// ============================================================================
// Loading helpers
// ============================================================================

/// Null or an empty list.
fn is_unset(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Sequence(seq) => seq.is_empty(),
        _ => false,
    }
}

fn first_existing(dir: &Path, names: &[&str]) -> Option<PathBuf> {
    names.iter().map(|n| dir.join(n)).find(|p| p.exists())
}

fn implicit_local() -> Sections {
    let mut default = Section::new();
    default.insert("client".into(), Value::String(LOCAL_CLIENT.into()));
    let mut local = Section::new();
    local.insert("pool".into(), Value::String("default".into()));
    local.insert("type".into(), Value::String("kvm".into()));
    let mut raw = Sections::new();
    raw.insert(DEFAULT_SECTION.into(), default);
    raw.insert(LOCAL_CLIENT.into(), local);
    raw
}

/// Parse a `section → key → value` file. `None` for an empty document.
fn read_sections(path: &Path) -> Result<Option<Sections>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let parse_err = |message: String| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    };
    let value: Value = serde_yaml_ng::from_str(&content).map_err(|e| parse_err(e.to_string()))?;
    let mapping = match value {
        Value::Null => return Ok(None),
        Value::Mapping(m) => m,
        _ => return Err(parse_err("top level must be a mapping".into())),
    };
    let mut sections = Sections::new();
    for (name, body) in mapping {
        let name = scalar_key(&name).ok_or_else(|| parse_err("section names must be scalars".into()))?;
        let section = match body {
            Value::Null => Section::new(),
            Value::Mapping(m) => {
                let mut section = Section::new();
                for (k, v) in m {
                    let key = scalar_key(&k)
                        .ok_or_else(|| parse_err(format!("invalid option name in {}", name)))?;
                    section.insert(key, v);
                }
                section
            }
            _ => return Err(parse_err(format!("section {} must be a mapping", name))),
        };
        sections.insert(name, section);
    }
    Ok(Some(sections))
}

fn scalar_key(key: &Value) -> Option<String> {
    match key {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Replace every `?secret` sentinel with its value from the secrets file.
fn substitute_secrets(raw: &Sections, secrets: &Sections) -> Result<Sections, ConfigError> {
    let mut resolved = Sections::new();
    for (name, section) in raw {
        let mut out = Section::new();
        for (key, value) in section {
            let value = match SettingValue::classify(name, key, value.clone()) {
                SettingValue::Literal(v) => v,
                SettingValue::Secret(secret) => {
                    let found = secrets
                        .get(&secret.section)
                        .and_then(|s| s.get(&secret.key))
                        .cloned();
                    match found {
                        Some(v) => {
                            tracing::debug!(section = %secret.section, key = %secret.key, "substituted secret");
                            v
                        }
                        None => {
                            return Err(ConfigError::MissingSecret {
                                section: secret.section,
                                key: secret.key,
                            })
                        }
                    }
                }
            };
            out.insert(key.clone(), value);
        }
        resolved.insert(name.clone(), out);
    }
    Ok(resolved)
}

fn path_option(section: &Section, key: &str) -> Option<PathBuf> {
    section.get(key).and_then(Value::as_str).map(expand_home)
}

fn load_profiles(path: &Path) -> Result<IndexMap<String, Profile>, ConfigError> {
    let profiles: IndexMap<String, Profile> = load_named(path)?;
    let wrong: Vec<&str> = profiles
        .iter()
        .filter(|(_, p)| {
            p.kind
                .as_deref()
                .is_some_and(|k| !PROFILE_TYPES.contains(&k))
        })
        .map(|(n, _)| n.as_str())
        .collect();
    if !wrong.is_empty() {
        return Err(ConfigError::InvalidProfileType(wrong.join(",")));
    }
    tracing::debug!(path = %path.display(), count = profiles.len(), "loaded profiles");
    Ok(profiles)
}

fn load_flavors(path: &Path) -> Result<IndexMap<String, Flavor>, ConfigError> {
    load_named(path)
}

/// Read a `name → record` file; a missing or empty file is an empty map.
fn load_named<T: serde::de::DeserializeOwned>(
    path: &Path,
) -> Result<IndexMap<String, T>, ConfigError> {
    if !path.exists() {
        return Ok(IndexMap::new());
    }
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let parsed: Option<IndexMap<String, T>> =
        serde_yaml_ng::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    Ok(parsed.unwrap_or_default())
}

fn apply_profile_options(
    name: &str,
    profile: &mut Profile,
    options: &ParamMap,
) -> Result<(), ConfigError> {
    for (key, value) in options {
        match key.as_str() {
            "type" => {
                let kind = value.as_str().unwrap_or_default();
                if !PROFILE_TYPES.contains(&kind) {
                    return Err(ConfigError::InvalidProfileType(name.to_string()));
                }
                profile.kind = Some(kind.to_string());
            }
            "base" => profile.base = value.as_str().map(str::to_string),
            _ => {
                profile.options.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(())
}

/// Write `content` to a temp file next to `path`, then rename over it.
fn write_atomic(path: &Path, content: &str) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);
    std::fs::write(&tmp_path, content).map_err(|e| ConfigError::Write {
        path: tmp_path.clone(),
        source: e,
    })?;
    std::fs::rename(&tmp_path, path).map_err(|e| ConfigError::Write {
        path: path.to_path_buf(),
        source: e,
    })
}
