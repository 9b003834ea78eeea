//! Built-in tunables and the effective-defaults record.
//!
//! Every option that can be tuned globally (in the `default` section) or per
//! client is listed once in `tunables!`. Lookups cascade
//! built-in → `default` section → client section, never the reverse.

use super::types::Section;
use crate::error::ConfigError;
use serde_yaml_ng::Value;

/// How a raw settings value is normalized before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    /// Kept as written
    Any,
    /// Truthiness (`"yes"`, `1`, non-empty lists are true)
    Bool,
    /// Integer, strings of digits accepted
    Int,
}

fn s(v: &str) -> Value {
    Value::String(v.to_string())
}

fn i(v: i64) -> Value {
    Value::from(v)
}

fn b(v: bool) -> Value {
    Value::Bool(v)
}

fn none() -> Value {
    Value::Null
}

fn list(items: &[&str]) -> Value {
    Value::Sequence(items.iter().map(|x| s(x)).collect())
}

fn ints(items: &[i64]) -> Value {
    Value::Sequence(items.iter().map(|x| i(*x)).collect())
}

macro_rules! tunables {
    ($( $variant:ident => $key:literal : $kind:ident = $default:expr ),* $(,)?) => {
        /// A globally or per-client tunable option.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Tunable {
            $($variant),*
        }

        impl Tunable {
            /// Every tunable, in declaration order.
            pub const ALL: &'static [Tunable] = &[$(Tunable::$variant),*];

            /// Option name in the settings files.
            pub fn key(self) -> &'static str {
                match self {
                    $(Tunable::$variant => $key),*
                }
            }

            pub fn coercion(self) -> Coercion {
                match self {
                    $(Tunable::$variant => Coercion::$kind),*
                }
            }

            /// Built-in value used when no settings scope provides one.
            pub fn builtin(self) -> Value {
                match self {
                    $(Tunable::$variant => $default),*
                }
            }
        }
    };
}

tunables! {
    Nets => "nets": Any = list(&["default"]),
    Pool => "pool": Any = s("default"),
    Image => "image": Any = none(),
    Cpumodel => "cpumodel": Any = s("host-model"),
    Numcpus => "numcpus": Int = i(2),
    Memory => "memory": Int = i(512),
    Disks => "disks": Any = ints(&[10]),
    Disksize => "disksize": Any = i(10),
    Diskinterface => "diskinterface": Any = s("virtio"),
    Diskthin => "diskthin": Bool = b(true),
    Guestid => "guestid": Any = s("guestrhel764"),
    Vnc => "vnc": Bool = b(false),
    Cloudinit => "cloudinit": Bool = b(true),
    Reserveip => "reserveip": Bool = b(false),
    Reservedns => "reservedns": Bool = b(false),
    Reservehost => "reservehost": Bool = b(false),
    Nested => "nested": Bool = b(true),
    Start => "start": Bool = b(true),
    Autostart => "autostart": Bool = b(false),
    Tunnel => "tunnel": Bool = b(false),
    Tunnelhost => "tunnelhost": Any = none(),
    Tunnelport => "tunnelport": Any = i(22),
    Tunneluser => "tunneluser": Any = s("root"),
    Tunneldir => "tunneldir": Any = s("/var/www/html"),
    Insecure => "insecure": Bool = b(false),
    Keys => "keys": Any = list(&[]),
    Cmds => "cmds": Any = list(&[]),
    Dns => "dns": Any = none(),
    Domain => "domain": Any = none(),
    Scripts => "scripts": Any = list(&[]),
    Files => "files": Any = list(&[]),
    Iso => "iso": Any = none(),
    Netmasks => "netmasks": Any = list(&[]),
    Gateway => "gateway": Any = none(),
    Sharedkey => "sharedkey": Bool = b(false),
    Enableroot => "enableroot": Bool = b(true),
    Privatekey => "privatekey": Bool = b(false),
    Networkwait => "networkwait": Any = i(0),
    Rhnregister => "rhnregister": Bool = b(false),
    Rhnserver => "rhnserver": Any = s("https://subscription.rhsm.redhat.com"),
    Rhnuser => "rhnuser": Any = none(),
    Rhnpassword => "rhnpassword": Any = none(),
    Rhnactivationkey => "rhnactivationkey": Any = none(),
    Rhnorg => "rhnorg": Any = none(),
    Rhnpool => "rhnpool": Any = none(),
    Tags => "tags": Any = list(&[]),
    Flavor => "flavor": Any = none(),
    KeepNetworks => "keep_networks": Bool = b(false),
    Dnsclient => "dnsclient": Any = none(),
    Storemetadata => "storemetadata": Bool = b(false),
    Notify => "notify": Bool = b(false),
    Notifycmd => "notifycmd": Any = none(),
    Notifyscript => "notifyscript": Any = none(),
    Notifymethods => "notifymethods": Any = list(&["pushbullet"]),
    Pushbullettoken => "pushbullettoken": Any = none(),
    Slacktoken => "slacktoken": Any = none(),
    Slackchannel => "slackchannel": Any = none(),
    Mailserver => "mailserver": Any = none(),
    Mailfrom => "mailfrom": Any = none(),
    Mailto => "mailto": Any = list(&[]),
    Sharedfolders => "sharedfolders": Any = list(&[]),
    Kernel => "kernel": Any = none(),
    Initrd => "initrd": Any = none(),
    Cmdline => "cmdline": Any = none(),
    Placement => "placement": Any = list(&[]),
    Yamlinventory => "yamlinventory": Bool = b(false),
    Cpuhotplug => "cpuhotplug": Bool = b(false),
    Memoryhotplug => "memoryhotplug": Bool = b(false),
    Virttype => "virttype": Any = none(),
    Tpm => "tpm": Bool = b(false),
    Rng => "rng": Bool = b(false),
    ZerotierNets => "zerotier_nets": Any = list(&[]),
    ZerotierKubelet => "zerotier_kubelet": Bool = b(false),
    Jenkinsmode => "jenkinsmode": Any = s("podman"),
    Vmuser => "vmuser": Any = none(),
    Vmport => "vmport": Any = none(),
    Vmrules => "vmrules": Any = list(&[]),
    Cache => "cache": Bool = b(false),
    Securitygroups => "securitygroups": Any = list(&[]),
}

impl Tunable {
    /// Look a tunable up by its option name.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.key() == key)
    }
}

/// Python-style truthiness of a settings value.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Sequence(seq) => !seq.is_empty(),
        Value::Mapping(m) => !m.is_empty(),
        Value::Tagged(t) => truthy(&t.value),
    }
}

/// Normalize a raw value for `tunable`.
pub fn coerce(tunable: Tunable, value: Value) -> Result<Value, ConfigError> {
    match tunable.coercion() {
        Coercion::Any => Ok(value),
        Coercion::Bool => Ok(Value::Bool(truthy(&value))),
        Coercion::Int => match value {
            Value::Null => Ok(Value::Null),
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(Value::Number(n)),
            Value::String(s) => s.trim().parse::<i64>().map(Value::from).map_err(|_| {
                ConfigError::InvalidOption {
                    key: tunable.key().to_string(),
                    value: s.clone(),
                    expected: "an integer",
                }
            }),
            other => Err(ConfigError::InvalidOption {
                key: tunable.key().to_string(),
                value: format!("{:?}", other),
                expected: "an integer",
            }),
        },
    }
}

/// Normalize every tunable present in a settings section, in place.
pub fn coerce_section(section: &mut Section) -> Result<(), ConfigError> {
    for (key, value) in section.iter_mut() {
        if let Some(tunable) = Tunable::from_key(key) {
            *value = coerce(tunable, std::mem::replace(value, Value::Null))?;
        }
    }
    Ok(())
}

/// Immutable record of built-in values overlaid with the `default` section.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveDefaults {
    values: Vec<Value>,
}

impl EffectiveDefaults {
    /// Built-in values only.
    pub fn builtin() -> Self {
        Self {
            values: Tunable::ALL.iter().map(|t| t.builtin()).collect(),
        }
    }

    /// Overlay the (already coerced) `default` section on the built-ins.
    pub fn from_default_section(default: &Section) -> Result<Self, ConfigError> {
        let mut values = Vec::with_capacity(Tunable::ALL.len());
        for tunable in Tunable::ALL {
            let value = match default.get(tunable.key()) {
                Some(v) => coerce(*tunable, v.clone())?,
                None => tunable.builtin(),
            };
            values.push(value);
        }
        Ok(Self { values })
    }

    pub fn get(&self, tunable: Tunable) -> &Value {
        &self.values[tunable as usize]
    }

    /// `(key, value)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> + '_ {
        Tunable::ALL.iter().map(move |t| (t.key(), self.get(*t)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_tunable_has_unique_key() {
        let mut keys: Vec<_> = Tunable::ALL.iter().map(|t| t.key()).collect();
        let total = keys.len();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), total);
    }

    #[test]
    fn test_builtin_values() {
        let d = EffectiveDefaults::builtin();
        assert_eq!(d.get(Tunable::Pool), &Value::String("default".into()));
        assert_eq!(d.get(Tunable::Numcpus), &Value::from(2));
        assert_eq!(d.get(Tunable::Image), &Value::Null);
    }

    #[test]
    fn test_default_section_overrides_builtin() {
        let mut section = Section::new();
        section.insert("memory".into(), Value::String("4096".into()));
        section.insert("vnc".into(), Value::String("yes".into()));
        let d = EffectiveDefaults::from_default_section(&section).unwrap();
        assert_eq!(d.get(Tunable::Memory), &Value::from(4096));
        assert_eq!(d.get(Tunable::Vnc), &Value::Bool(true));
        assert_eq!(d.get(Tunable::Pool), &Value::String("default".into()));
    }

    #[test]
    fn test_invalid_int_rejected() {
        let mut section = Section::new();
        section.insert("numcpus".into(), Value::String("lots".into()));
        let err = EffectiveDefaults::from_default_section(&section).unwrap_err();
        assert!(err.to_string().contains("numcpus"));
    }

    #[test]
    fn test_truthy() {
        assert!(!truthy(&Value::Null));
        assert!(!truthy(&Value::from(0)));
        assert!(truthy(&Value::from(1)));
        assert!(!truthy(&Value::String(String::new())));
        assert!(truthy(&Value::String("false".into())));
        assert!(!truthy(&Value::Sequence(vec![])));
    }

    #[test]
    fn test_coerce_section_leaves_unknown_keys() {
        let mut section = Section::new();
        section.insert("host".into(), Value::String("10.0.0.1".into()));
        section.insert("tunnel".into(), Value::from(1));
        coerce_section(&mut section).unwrap();
        assert_eq!(section["host"], Value::String("10.0.0.1".into()));
        assert_eq!(section["tunnel"], Value::Bool(true));
    }

    #[test]
    fn test_only_numcpus_and_memory_are_integers() {
        let ints: Vec<_> = Tunable::ALL
            .iter()
            .filter(|t| t.coercion() == Coercion::Int)
            .map(|t| t.key())
            .collect();
        assert_eq!(ints, vec!["numcpus", "memory"]);

        let mut section = Section::new();
        section.insert("disksize".into(), Value::from(10.5));
        section.insert("tunnelport".into(), Value::String("2222".into()));
        let d = EffectiveDefaults::from_default_section(&section).unwrap();
        assert_eq!(d.get(Tunable::Disksize), &Value::from(10.5));
        assert_eq!(d.get(Tunable::Tunnelport), &Value::String("2222".into()));
    }

    #[test]
    fn test_iter_follows_declaration_order() {
        let d = EffectiveDefaults::builtin();
        let first: Vec<_> = d.iter().take(2).map(|(k, _)| k).collect();
        assert_eq!(first, vec!["nets", "pool"]);
    }
}
