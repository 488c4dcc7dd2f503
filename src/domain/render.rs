//! Placeholder substitution for campaign subject and body text.
//!
//! The engine recognizes `{{name}}` tokens (interior whitespace tolerated)
//! and replaces each occurrence with the bound value. Unresolved tokens are
//! left verbatim: partial personalization must never block delivery.

use std::collections::BTreeMap;

/// Per-recipient placeholder bindings, keyed by token name.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderVars {
    vars: BTreeMap<String, String>,
}

impl PlaceholderVars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard bindings derived from a recipient snapshot.
    pub fn for_recipient(name: &str, email: &str) -> Self {
        let mut vars = Self::new();
        vars.bind("name", name);
        vars.bind("email", email);
        vars
    }

    pub fn bind(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }
}

/// Substitute every bound `{{name}}` token in `template`.
///
/// Pure and deterministic; safe to call concurrently from dispatch workers.
pub fn render(template: &str, vars: &PlaceholderVars) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        output.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];

        match after_open.find("}}") {
            Some(close) => {
                let raw_token = &after_open[..close];
                let name = raw_token.trim();
                match vars.get(name) {
                    Some(value) if !name.is_empty() => {
                        output.push_str(value);
                    }
                    _ => {
                        // Unresolved token stays verbatim, braces included.
                        output.push_str("{{");
                        output.push_str(raw_token);
                        output.push_str("}}");
                    }
                }
                rest = &after_open[close + 2..];
            }
            None => {
                // Unterminated opener; emit the remainder untouched.
                output.push_str(&rest[open..]);
                rest = "";
            }
        }
    }

    output.push_str(rest);
    output
}

/// Rendered subject and body for one recipient.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
}

pub fn render_message(subject: &str, body: &str, vars: &PlaceholderVars) -> RenderedMessage {
    RenderedMessage {
        subject: render(subject, vars),
        body: render(body, vars),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_bound_placeholder() {
        let vars = PlaceholderVars::for_recipient("Jane", "jane@example.com");
        assert_eq!(render("Hi {{name}}", &vars), "Hi Jane");
    }

    #[test]
    fn missing_binding_left_verbatim() {
        let vars = PlaceholderVars::new();
        assert_eq!(render("Hi {{name}}", &vars), "Hi {{name}}");
    }

    #[test]
    fn interior_whitespace_tolerated() {
        let mut vars = PlaceholderVars::new();
        vars.bind("name", "Jane");
        assert_eq!(render("Hi {{ name }}", &vars), "Hi Jane");
    }

    #[test]
    fn replaces_every_occurrence() {
        let mut vars = PlaceholderVars::new();
        vars.bind("email", "jane@example.com");
        assert_eq!(
            render("{{email}} wrote to {{email}}", &vars),
            "jane@example.com wrote to jane@example.com"
        );
    }

    #[test]
    fn unterminated_opener_passes_through() {
        let mut vars = PlaceholderVars::new();
        vars.bind("name", "Jane");
        assert_eq!(render("Hi {{name", &vars), "Hi {{name");
    }

    #[test]
    fn empty_token_left_verbatim() {
        let vars = PlaceholderVars::new();
        assert_eq!(render("{{}} {{ }}", &vars), "{{}} {{ }}");
    }

    #[test]
    fn renders_subject_and_body_together() {
        let vars = PlaceholderVars::for_recipient("Jane Doe", "jane@example.com");
        let message = render_message(
            "Welcome {{name}}",
            "<p>Hello {{name}}, we mail you at {{email}}.</p>",
            &vars,
        );
        assert_eq!(message.subject, "Welcome Jane Doe");
        assert_eq!(
            message.body,
            "<p>Hello Jane Doe, we mail you at jane@example.com.</p>"
        );
    }
}
