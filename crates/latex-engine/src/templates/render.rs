//! Placeholder substitution
//!
//! Templates are plain LaTeX with `\VAR{name}` placeholders. Lines whose
//! first non-blank characters are `%#` are template comments and never reach
//! the compiler. Plain bindings are escaped; raw bindings are inserted as-is.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::Value;

use super::escape::{escape_latex, find_control_character};
use super::registry::Template;
use crate::compiler::errors::EngineError;

lazy_static! {
    static ref PLACEHOLDER: Regex =
        Regex::new(r"\\VAR\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}").unwrap();
    static ref PLACEHOLDER_OPEN: Regex = Regex::new(r"\\VAR\{").unwrap();
}

const COMMENT_MARKER: &str = "%#";

/// A value bound to a placeholder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Binding {
    /// User text, escaped on insertion
    Text(String),
    /// Trusted LaTeX markup, inserted verbatim
    Raw(String),
}

impl Binding {
    fn from_json(name: &str, value: &Value) -> Result<Option<Self>, EngineError> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(Binding::Text(s.clone()))),
            Value::Number(n) => Ok(Some(Binding::Text(n.to_string()))),
            Value::Bool(b) => Ok(Some(Binding::Text(b.to_string()))),
            Value::Object(map) if map.len() == 1 => match map.get("raw") {
                Some(Value::String(latex)) => Ok(Some(Binding::Raw(latex.clone()))),
                _ => Err(invalid_shape(name)),
            },
            _ => Err(invalid_shape(name)),
        }
    }
}

fn invalid_shape(name: &str) -> EngineError {
    EngineError::InvalidBinding(format!(
        "binding '{}' must be a string, number, boolean or {{\"raw\": \"...\"}}",
        name
    ))
}

/// Named bindings for one render
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings(BTreeMap<String, Binding>);

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert request JSON into bindings; `null` values are dropped
    pub fn from_json(values: &BTreeMap<String, Value>) -> Result<Self, EngineError> {
        let mut bindings = Self::new();
        for (name, value) in values {
            if let Some(binding) = Binding::from_json(name, value)? {
                bindings.insert(name.clone(), binding);
            }
        }
        Ok(bindings)
    }

    pub fn insert(&mut self, name: impl Into<String>, binding: Binding) {
        self.0.insert(name.into(), binding);
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.0.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Complete LaTeX source for one compilation attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedSource(String);

impl RenderedSource {
    pub fn new(source: String) -> Self {
        Self(source)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Render `template` with `bindings`.
///
/// Fails with `InvalidBinding` for undeclared or missing required inputs,
/// raw markup when `allow_raw` is off, or control characters in text. A
/// malformed or undeclared placeholder in the template itself is
/// `InvalidTemplate`.
pub fn render_template(
    template: &Template,
    bindings: &Bindings,
    allow_raw: bool,
) -> Result<RenderedSource, EngineError> {
    let info = &template.info;

    if let Some(name) = bindings.names().find(|name| !info.declares(name)) {
        return Err(EngineError::InvalidBinding(format!(
            "template '{}' has no input named '{}'",
            info.name, name
        )));
    }

    let missing: Vec<&str> = info
        .required_inputs
        .iter()
        .map(String::as_str)
        .filter(|name| bindings.get(name).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(EngineError::InvalidBinding(format!(
            "template '{}' requires: {}",
            info.name,
            missing.join(", ")
        )));
    }

    let mut values: BTreeMap<&str, String> = BTreeMap::new();
    for name in info.required_inputs.iter().chain(&info.optional_inputs) {
        let value = match bindings.get(name) {
            None => String::new(),
            Some(Binding::Text(text)) => {
                if let Some(ch) = find_control_character(text) {
                    return Err(EngineError::InvalidBinding(format!(
                        "binding '{}' contains control character U+{:04X}",
                        name, ch as u32
                    )));
                }
                escape_latex(text)
            }
            Some(Binding::Raw(latex)) => {
                if !allow_raw {
                    return Err(EngineError::InvalidBinding(format!(
                        "raw markup is disabled (binding '{}')",
                        name
                    )));
                }
                latex.clone()
            }
        };
        values.insert(name.as_str(), value);
    }

    let body = strip_comments(&template.source);
    check_placeholders(&info.name, &body, &values)?;

    let rendered = PLACEHOLDER.replace_all(&body, |caps: &Captures| {
        values.get(&caps[1]).cloned().unwrap_or_default()
    });

    Ok(RenderedSource::new(rendered.into_owned()))
}

/// Placeholder names in order of first appearance, comments excluded
pub fn placeholder_names(source: &str) -> Vec<String> {
    let body = strip_comments(source);
    let mut names: Vec<String> = Vec::new();
    for caps in PLACEHOLDER.captures_iter(&body) {
        if !names.iter().any(|n| n == &caps[1]) {
            names.push(caps[1].to_string());
        }
    }
    names
}

fn strip_comments(source: &str) -> String {
    source
        .split_inclusive('\n')
        .filter(|line| !line.trim_start().starts_with(COMMENT_MARKER))
        .collect()
}

fn check_placeholders(
    template: &str,
    body: &str,
    values: &BTreeMap<&str, String>,
) -> Result<(), EngineError> {
    let opened = PLACEHOLDER_OPEN.find_iter(body).count();
    let matched = PLACEHOLDER.find_iter(body).count();
    if opened != matched {
        return Err(EngineError::InvalidTemplate {
            name: template.to_string(),
            reason: "malformed \\VAR{...} placeholder".to_string(),
        });
    }

    if let Some(caps) = PLACEHOLDER
        .captures_iter(body)
        .find(|caps| !values.contains_key(&caps[1]))
    {
        return Err(EngineError::InvalidTemplate {
            name: template.to_string(),
            reason: format!("placeholder '{}' is not a declared input", &caps[1]),
        });
    }

    Ok(())
}
