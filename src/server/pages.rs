//! HTML pages. Every interpolated value goes through handlebars' HTML escaping.

use handlebars::{html_escape, Handlebars, RenderError, TemplateError};
use serde_json::json;

const TEMPLATES: [(&str, &str); 5] = [
    ("index", include_str!("../../templates/index.hbs")),
    ("upload", include_str!("../../templates/upload.hbs")),
    ("answer", include_str!("../../templates/answer.hbs")),
    ("demo", include_str!("../../templates/demo.hbs")),
    ("error", include_str!("../../templates/error.hbs")),
];

/// The compiled page templates
#[derive(Debug)]
pub struct Pages {
    registry: Handlebars<'static>,
}

impl Pages {
    pub fn new() -> Result<Self, TemplateError> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        for (name, source) in TEMPLATES {
            registry.register_template_string(name, source)?;
        }
        Ok(Pages { registry })
    }

    pub fn index(&self) -> Result<String, RenderError> {
        self.registry.render("index", &json!({}))
    }

    /// The upload form, with the question field prefilled
    pub fn upload(&self, question: &str) -> Result<String, RenderError> {
        self.registry.render("upload", &json!({ "question": question }))
    }

    pub fn answer(
        &self,
        question: &str,
        answer: &str,
        image_src: &str,
    ) -> Result<String, RenderError> {
        self.registry.render(
            "answer",
            &json!({ "question": question, "answer": answer, "image_src": image_src }),
        )
    }

    pub fn demo(
        &self,
        question: &str,
        image_url: &str,
        answer: &str,
    ) -> Result<String, RenderError> {
        self.registry.render(
            "demo",
            &json!({ "question": question, "image_url": image_url, "answer": answer }),
        )
    }
}

/// Failure page. Rendered without a registry because error responses are
/// built outside of any request state.
pub fn error_page(status: &str, message: &str) -> String {
    let data = json!({ "status": status, "message": message });
    Handlebars::new()
        .render_template(TEMPLATES[4].1, &data)
        .unwrap_or_else(|_| {
            format!(
                "<html><body><h2>{}</h2><p>{}</p></body></html>",
                html_escape(status),
                html_escape(message)
            )
        })
}
