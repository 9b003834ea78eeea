//! Filters registered on every template environment.

use base64::Engine as _;
use std::collections::HashMap;
use std::path::Path;
use tera::{Result, Value};

/// Signature shared by every filter.
pub type FilterFn = fn(&Value, &HashMap<String, Value>) -> Result<Value>;

/// The fixed filter set, by name.
pub const FILTERS: &[(&str, FilterFn)] = &[
    ("basename", basename),
    ("dirname", dirname),
    ("none", none),
    ("type", type_name),
    ("base64", base64),
    ("exists", exists),
    ("ipv6_wrap", ipv6_wrap),
];

fn expect_str<'a>(value: &'a Value, filter: &str) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| tera::Error::msg(format!("{} filter expects a string", filter)))
}

/// Last path component.
pub fn basename(value: &Value, _args: &HashMap<String, Value>) -> Result<Value> {
    let s = expect_str(value, "basename")?;
    let name = Path::new(s)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    Ok(Value::String(name))
}

/// Everything but the last path component.
pub fn dirname(value: &Value, _args: &HashMap<String, Value>) -> Result<Value> {
    let s = expect_str(value, "dirname")?;
    let dir = Path::new(s)
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default();
    Ok(Value::String(dir))
}

/// Null becomes an empty string; anything else passes through.
pub fn none(value: &Value, _args: &HashMap<String, Value>) -> Result<Value> {
    match value {
        Value::Null => Ok(Value::String(String::new())),
        other => Ok(other.clone()),
    }
}

pub fn type_name(value: &Value, _args: &HashMap<String, Value>) -> Result<Value> {
    let name = match value {
        Value::Null => "none",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    };
    Ok(Value::String(name.to_string()))
}

/// Standard base64 of a string.
pub fn base64(value: &Value, _args: &HashMap<String, Value>) -> Result<Value> {
    let s = expect_str(value, "base64")?;
    Ok(Value::String(
        base64::engine::general_purpose::STANDARD.encode(s.as_bytes()),
    ))
}

/// Whether a local path exists (`~/` expanded).
pub fn exists(value: &Value, _args: &HashMap<String, Value>) -> Result<Value> {
    let s = expect_str(value, "exists")?;
    Ok(Value::Bool(super::parser::expand_home(s).exists()))
}

/// Bracket bare IPv6 literals so they can be joined with a port.
pub fn ipv6_wrap(value: &Value, _args: &HashMap<String, Value>) -> Result<Value> {
    let s = expect_str(value, "ipv6_wrap")?;
    Ok(Value::String(wrap_ipv6(s)))
}

/// `fe80::1` → `[fe80::1]`; already bracketed or IPv4 hosts are unchanged.
pub fn wrap_ipv6(host: &str) -> String {
    if host.contains(':') && !host.contains('[') {
        format!("[{}]", host)
    } else {
        host.to_string()
    }
}
