//! Escaping of user text for LaTeX

/// Characters with special meaning to TeX in text mode
pub const LATEX_METACHARACTERS: &[char] = &['\\', '{', '}', '%', '$', '&', '#', '_', '^', '~'];

/// Escape `text` so TeX typesets it literally.
///
/// Whitespace runs containing a line break collapse to one space: a blank
/// line is a paragraph break to TeX, which is illegal inside `\textbf{..}`
/// arguments and table cells.
pub fn escape_latex(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + text.len() / 8);
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch.is_whitespace() {
            let mut run = String::from(ch);
            while let Some(next) = chars.next_if(|c| c.is_whitespace()) {
                run.push(next);
            }
            if run.contains(['\n', '\r']) {
                escaped.push(' ');
            } else {
                escaped.push_str(&run);
            }
            continue;
        }
        match ch {
            '\\' => escaped.push_str("\\textbackslash{}"),
            '^' => escaped.push_str("\\textasciicircum{}"),
            '~' => escaped.push_str("\\textasciitilde{}"),
            '{' | '}' | '%' | '$' | '&' | '#' | '_' => {
                escaped.push('\\');
                escaped.push(ch);
            }
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// First control character that cannot appear in a document (tabs and line
/// breaks are fine)
pub fn find_control_character(text: &str) -> Option<char> {
    text.chars()
        .find(|ch| ch.is_control() && !matches!(ch, '\n' | '\r' | '\t'))
}
