//! Client resolver: picks the active backend target, expanding groups.

use super::defaults::{truthy, Tunable};
use super::filters::wrap_ipv6;
use super::settings::Settings;
use super::types::{value_to_string, Algorithm, ClientTarget, ResolvedClient, Section};
use crate::error::ConfigError;
use serde_yaml_ng::Value;

const LOCALHOST: &str = "127.0.0.1";

/// Chooses one member of a `random` group.
pub trait MemberSelector {
    /// Index into `members` (never empty).
    fn pick(&mut self, members: &[String]) -> usize;
}

/// Uniform choice backed by `fastrand`.
#[derive(Debug, Clone)]
pub struct RandomSelector {
    rng: fastrand::Rng,
}

impl RandomSelector {
    pub fn new() -> Self {
        Self {
            rng: fastrand::Rng::new(),
        }
    }

    /// Deterministic sequence for reproducible runs.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: fastrand::Rng::with_seed(seed),
        }
    }
}

impl Default for RandomSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl MemberSelector for RandomSelector {
    fn pick(&mut self, members: &[String]) -> usize {
        self.rng.usize(..members.len())
    }
}

/// Always the member at a fixed position.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedSelector(pub usize);

impl MemberSelector for FixedSelector {
    fn pick(&mut self, _members: &[String]) -> usize {
        self.0
    }
}

/// Resolve `requested` (`None`, `all`, `a,b,c` or a single name) to an
/// active target plus extra client names.
pub fn resolve(
    requested: Option<&str>,
    settings: &Settings,
    selector: &mut dyn MemberSelector,
) -> Result<ResolvedClient, ConfigError> {
    let (mut name, mut extras) = match requested {
        None => (settings.default_client().to_string(), Vec::new()),
        Some("all") => {
            let mut enabled = settings
                .clients()
                .into_iter()
                .filter(|c| settings.is_enabled(c))
                .map(str::to_string);
            let first = enabled.next().ok_or(ConfigError::NoEnabledClients)?;
            (first, enabled.collect())
        }
        Some(list) if list.contains(',') => {
            let mut names = list
                .split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string);
            let first = names
                .next()
                .ok_or_else(|| ConfigError::UnknownClient(list.to_string()))?;
            (first, names.collect())
        }
        Some(single) => (single.to_string(), Vec::new()),
    };

    let mut section = match settings.section(&name) {
        Some(section) => section.clone(),
        None => synthesize(&name),
    };

    let mut group = None;
    let mut algorithm = None;
    if section_type(&section) == "group" {
        if !enabled(&section) {
            return Err(ConfigError::DisabledGroup(name));
        }
        let members = group_members(&section);
        if members.is_empty() {
            return Err(ConfigError::EmptyGroup(name));
        }
        let algo_name = section
            .get("algorithm")
            .map(value_to_string)
            .unwrap_or_else(|| "random".to_string());
        let algo =
            Algorithm::parse(&algo_name).ok_or(ConfigError::InvalidAlgorithm(algo_name))?;
        for member in &members {
            if settings
                .section(member)
                .is_some_and(|s| section_type(s) == "group")
            {
                return Err(ConfigError::NestedGroup {
                    group: name.clone(),
                    member: member.clone(),
                });
            }
        }

        let (active, rest) = if members.len() == 1 {
            (members[0].clone(), Vec::new())
        } else {
            match algo {
                Algorithm::Random => {
                    let idx = selector.pick(&members).min(members.len() - 1);
                    (members[idx].clone(), Vec::new())
                }
                Algorithm::Free | Algorithm::Balance => {
                    (members[0].clone(), members[1..].to_vec())
                }
            }
        };
        tracing::debug!(group = %name, member = %active, algorithm = %algo, "picked group member");
        section = settings
            .section(&active)
            .cloned()
            .ok_or_else(|| ConfigError::MissingClientSection(active.clone()))?;
        group = Some(std::mem::replace(&mut name, active));
        algorithm = Some(algo);
        extras = rest;
    }

    if !enabled(&section) {
        return Err(ConfigError::DisabledClient(name));
    }

    let active = target(&name, &section, settings);
    tracing::debug!(client = %active.name, host = %active.host, kind = %active.kind, "resolved client");
    Ok(ResolvedClient {
        active,
        extras,
        group,
        algorithm,
    })
}

/// Section for a client absent from the config: `user@host` or a bare host.
fn synthesize(name: &str) -> Section {
    tracing::warn!(
        "Missing section for client {} in config file. Trying to connect...",
        name
    );
    let (user, host) = name.split_once('@').unwrap_or(("root", name));
    let mut section = Section::new();
    section.insert("host".into(), Value::String(host.to_string()));
    section.insert("user".into(), Value::String(user.to_string()));
    section
}

fn section_type(section: &Section) -> String {
    section
        .get("type")
        .map(value_to_string)
        .unwrap_or_else(|| "kvm".to_string())
}

fn enabled(section: &Section) -> bool {
    section.get("enabled").map(truthy).unwrap_or(true)
}

fn group_members(section: &Section) -> Vec<String> {
    match section.get("members") {
        Some(Value::Sequence(items)) => items.iter().map(value_to_string).collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn as_port(value: Option<&Value>, default: u64) -> u64 {
    match value {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(default),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
        _ => default,
    }
}

fn string_or(section: &Section, key: &str, default: &str) -> String {
    section
        .get(key)
        .filter(|v| !v.is_null())
        .map(value_to_string)
        .unwrap_or_else(|| default.to_string())
}

fn target(name: &str, section: &Section, settings: &Settings) -> ClientTarget {
    let defaults = settings.defaults();
    let opt = |t: Tunable| section.get(t.key()).unwrap_or_else(|| defaults.get(t));

    let host = wrap_ipv6(&string_or(section, "host", LOCALHOST));
    let port = as_port(section.get("port"), 22);
    let user = string_or(section, "user", "root");
    let kind = section_type(section);

    let mut tunnelhost = opt(Tunable::Tunnelhost).as_str().map(str::to_string);
    let mut tunnelport = as_port(Some(opt(Tunable::Tunnelport)), 22);
    let mut tunneluser = value_to_string(opt(Tunable::Tunneluser));
    if tunnelhost.is_none() && kind == "kvm" && host != LOCALHOST {
        tunnelhost = Some(host.clone());
        tunnelport = port;
        tunneluser = user.clone();
    }

    ClientTarget {
        name: name.to_string(),
        protocol: string_or(section, "protocol", "ssh"),
        url: section.get("url").and_then(Value::as_str).map(str::to_string),
        pool: value_to_string(opt(Tunable::Pool)),
        tunnel: truthy(opt(Tunable::Tunnel)),
        host,
        port,
        user,
        kind,
        tunnelhost,
        tunnelport,
        tunneluser,
    }
}
