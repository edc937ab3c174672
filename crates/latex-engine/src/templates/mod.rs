//! Template management, escaping and rendering

pub mod embedded;
pub mod escape;
pub mod registry;
pub mod render;

pub use escape::escape_latex;
pub use registry::{
    embedded_template, is_valid_template_name, list_templates, Template, TemplateInfo, TemplateStore,
};
pub use render::{render_template, Binding, Bindings, RenderedSource};
