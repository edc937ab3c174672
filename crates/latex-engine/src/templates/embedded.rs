//! Embedded template loader
//!
//! This module loads LaTeX templates from external files at compile time,
//! embedding them directly in the binary.

/// Invoice template - loaded from templates/invoice.tex
const INVOICE_TEMPLATE: &str = include_str!("../../templates/invoice.tex");

/// Letter template - loaded from templates/letter.tex
const LETTER_TEMPLATE: &str = include_str!("../../templates/letter.tex");

/// Resume template - loaded from templates/resume.tex
const RESUME_TEMPLATE: &str = include_str!("../../templates/resume.tex");

/// Cover letter template - loaded from templates/cover_letter.tex
const COVER_LETTER_TEMPLATE: &str = include_str!("../../templates/cover_letter.tex");

/// Get an embedded template by name
pub fn get_embedded_template(name: &str) -> Option<&'static str> {
    match name {
        "invoice" => Some(INVOICE_TEMPLATE),
        "letter" => Some(LETTER_TEMPLATE),
        "resume" => Some(RESUME_TEMPLATE),
        "cover_letter" => Some(COVER_LETTER_TEMPLATE),
        _ => None,
    }
}

/// List all available embedded template names
pub fn list_embedded_templates() -> Vec<&'static str> {
    vec!["invoice", "letter", "resume", "cover_letter"]
}
