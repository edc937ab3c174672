//! Template registry and metadata

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::embedded;
use super::render::placeholder_names;
use crate::compiler::errors::EngineError;

/// Information about an available template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateInfo {
    /// Template name, as used in requests
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Inputs that must be bound
    pub required_inputs: Vec<String>,
    /// Inputs that render as empty text when absent
    pub optional_inputs: Vec<String>,
}

impl TemplateInfo {
    fn new(name: &str, description: &str, required: &[&str], optional: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            required_inputs: required.iter().map(|s| s.to_string()).collect(),
            optional_inputs: optional.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Whether `input` is a declared input of this template
    pub fn declares(&self, input: &str) -> bool {
        self.required_inputs.iter().any(|i| i == input)
            || self.optional_inputs.iter().any(|i| i == input)
    }
}

/// A template ready to be rendered
#[derive(Debug, Clone)]
pub struct Template {
    pub info: TemplateInfo,
    pub source: Cow<'static, str>,
}

/// List all embedded templates
pub fn list_templates() -> Vec<TemplateInfo> {
    vec![
        TemplateInfo::new(
            "invoice",
            "Single-line invoice with a total and page footer",
            &["client", "amount"],
            &[
                "company_name",
                "invoice_number",
                "date",
                "description",
                "currency",
                "notes",
            ],
        ),
        TemplateInfo::new(
            "letter",
            "Formal business letter",
            &["sender_name", "recipient_name", "body"],
            &[
                "sender_address",
                "recipient_address",
                "date",
                "subject",
                "closing",
            ],
        ),
        TemplateInfo::new(
            "resume",
            "One-page resume",
            &["name", "email"],
            &[
                "phone",
                "linkedin",
                "github",
                "summary",
                "experience",
                "education",
                "projects",
                "skills",
            ],
        ),
        TemplateInfo::new(
            "cover_letter",
            "Cover letter for a job application",
            &["name", "company", "body"],
            &["email", "phone", "recipient", "role", "date", "closing"],
        ),
    ]
}

/// Template names are restricted so a name can never address a path
pub fn is_valid_template_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
}

/// Embedded templates, optionally overlaid by `<dir>/<name>.tex` files
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    dir: Option<PathBuf>,
}

impl TemplateStore {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    /// Store with only the embedded templates
    pub fn embedded() -> Self {
        Self::default()
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Look up a template. Directory templates take precedence.
    pub async fn get(&self, name: &str) -> Result<Template, EngineError> {
        if !is_valid_template_name(name) {
            return Err(EngineError::TemplateNotFound(name.to_string()));
        }

        if let Some(dir) = &self.dir {
            let path = dir.join(format!("{}.tex", name));
            match tokio::fs::read_to_string(&path).await {
                Ok(source) => {
                    debug!(template = name, path = %path.display(), "loaded template from directory");
                    return Ok(Template {
                        info: directory_info(name, &path, &source),
                        source: Cow::Owned(source),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(EngineError::Io(e)),
            }
        }

        embedded_template(name)
    }

    /// Metadata for every template this store can serve, sorted by name
    pub async fn list(&self) -> Vec<TemplateInfo> {
        let mut templates: BTreeMap<String, TemplateInfo> = list_templates()
            .into_iter()
            .map(|info| (info.name.clone(), info))
            .collect();

        if let Some(dir) = &self.dir {
            for info in scan_directory(dir).await {
                templates.insert(info.name.clone(), info);
            }
        }

        templates.into_values().collect()
    }
}

/// A built-in template with its metadata
pub fn embedded_template(name: &str) -> Result<Template, EngineError> {
    let source = embedded::get_embedded_template(name)
        .ok_or_else(|| EngineError::TemplateNotFound(name.to_string()))?;
    let info = list_templates()
        .into_iter()
        .find(|info| info.name == name)
        .ok_or_else(|| EngineError::Internal(format!("no metadata for template {}", name)))?;

    Ok(Template {
        info,
        source: Cow::Borrowed(source),
    })
}

fn directory_info(name: &str, path: &Path, source: &str) -> TemplateInfo {
    TemplateInfo {
        name: name.to_string(),
        description: format!("Template file {}", path.display()),
        required_inputs: placeholder_names(source),
        optional_inputs: Vec::new(),
    }
}

async fn scan_directory(dir: &Path) -> Vec<TemplateInfo> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "template directory not readable");
            return Vec::new();
        }
    };

    let mut templates = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if !path.extension().is_some_and(|ext| ext == "tex") {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        if !is_valid_template_name(name) {
            continue;
        }
        if let Ok(source) = tokio::fs::read_to_string(&path).await {
            templates.push(directory_info(name, &path, &source));
        }
    }
    templates
}
