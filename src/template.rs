//! Template bodies.
//!
//! Uses Handlebars to render request-dependent bodies. This is what fixture
//! files use in place of a body function.

use crate::client::{Form, Payload};
use handlebars::Handlebars;
use serde::Serialize;

/// Template engine for rendering request-dependent bodies.
pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
}

/// The request a body is being produced for.
#[derive(Debug, Clone, Copy)]
pub struct BodyRequest<'a> {
    /// Normalized request URL
    pub url: &'a str,
    pub method: &'a str,
    pub payload: &'a Payload,
}

/// Context for template rendering.
#[derive(Debug, Serialize)]
pub struct TemplateContext {
    pub url: String,
    pub method: String,
    /// Raw request body (as string, if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Form fields of a POST
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form: Option<Form>,
    /// Request body as JSON (if parseable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<serde_json::Value>,
}

impl TemplateContext {
    pub fn from_request(request: &BodyRequest<'_>) -> Self {
        let body = request.payload.as_text().map(String::from);
        let json = body.as_deref().and_then(|s| serde_json::from_str(s).ok());
        let form = match request.payload {
            Payload::Form(form) => Some(form.clone()),
            _ => None,
        };

        Self {
            url: request.url.to_string(),
            method: request.method.to_string(),
            body,
            form,
            json,
        }
    }
}

impl TemplateEngine {
    /// Create a new template engine.
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();

        handlebars.register_helper("json", Box::new(json_helper));
        handlebars.register_helper("default", Box::new(default_helper));
        handlebars.register_helper("upper", Box::new(upper_helper));
        handlebars.register_helper("lower", Box::new(lower_helper));

        // Bodies are not HTML
        handlebars.register_escape_fn(handlebars::no_escape);

        Self { handlebars }
    }

    /// Render a template string for the given request.
    pub fn render(
        &self,
        template: &str,
        request: &BodyRequest<'_>,
    ) -> Result<String, handlebars::RenderError> {
        let ctx = TemplateContext::from_request(request);
        self.handlebars.render_template(template, &ctx)
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TemplateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateEngine").finish_non_exhaustive()
    }
}

// Custom Handlebars helpers

fn json_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let value = h.param(0).map(|v| v.value());
    match value {
        Some(serde_json::Value::String(s)) => {
            // Re-serialize strings that hold JSON, pass the rest through
            match serde_json::from_str::<serde_json::Value>(s) {
                Ok(json) => out.write(&json.to_string())?,
                Err(_) => out.write(s)?,
            }
        }
        Some(v) => out.write(&v.to_string())?,
        None => {}
    }
    Ok(())
}

fn default_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let value = h.param(0).map(|v| v.value());
    let default = h.param(1).and_then(|v| v.value().as_str()).unwrap_or("");

    match value {
        Some(v) if !v.is_null() => {
            if let Some(s) = v.as_str() {
                if !s.is_empty() {
                    out.write(s)?;
                    return Ok(());
                }
            } else {
                out.write(&v.to_string())?;
                return Ok(());
            }
        }
        _ => {}
    }

    out.write(default)?;
    Ok(())
}

fn upper_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let value = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
    out.write(&value.to_uppercase())?;
    Ok(())
}

fn lower_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let value = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
    out.write(&value.to_lowercase())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request<'a>(url: &'a str, method: &'a str, payload: &'a Payload) -> BodyRequest<'a> {
        BodyRequest { url, method, payload }
    }

    #[test]
    fn test_url_and_method() {
        let engine = TemplateEngine::new();
        let payload = Payload::Empty;

        let result = engine
            .render("{{method}} {{url}}", &request("http://x.test:80/a", "GET", &payload))
            .unwrap();

        assert_eq!(result, "GET http://x.test:80/a");
    }

    #[test]
    fn test_form_fields() {
        let engine = TemplateEngine::new();
        let payload = Payload::Form([("test".to_string(), "yes".to_string())].into());

        let result = engine
            .render("test={{form.test}}", &request("http://x.test:80/", "POST", &payload))
            .unwrap();

        assert_eq!(result, "test=yes");
    }

    #[test]
    fn test_json_body() {
        let engine = TemplateEngine::new();
        let payload = Payload::Text(r#"{"name":"John"}"#.to_string());

        let result = engine
            .render("Name: {{json.name}}", &request("http://x.test:80/", "POST", &payload))
            .unwrap();

        assert_eq!(result, "Name: John");
    }

    #[test]
    fn test_json_helper_compacts() {
        let engine = TemplateEngine::new();
        let payload = Payload::Text(r#"{ "a" : 1 }"#.to_string());

        let result = engine
            .render("{{json body}}", &request("http://x.test:80/", "POST", &payload))
            .unwrap();

        assert_eq!(result, r#"{"a":1}"#);
    }

    #[test]
    fn test_default_helper() {
        let engine = TemplateEngine::new();
        let payload = Payload::Empty;

        let result = engine
            .render(
                "Value: {{default body \"none\"}}",
                &request("http://x.test:80/", "GET", &payload),
            )
            .unwrap();

        assert_eq!(result, "Value: none");
    }

    #[test]
    fn test_upper_lower_helpers() {
        let engine = TemplateEngine::new();
        let payload = Payload::Text("John".to_string());

        let result = engine
            .render(
                "{{upper body}} {{lower method}}",
                &request("http://x.test:80/", "POST", &payload),
            )
            .unwrap();

        assert_eq!(result, "JOHN post");
    }
}
