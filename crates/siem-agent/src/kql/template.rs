//! KQL template rendering using Tera
//!
//! Templates reference parameters as `{{ name }}`. Parameters are bound as
//! [`KqlValue`]s and rendered to KQL fragments before they reach Tera, so a
//! template never sees caller text.

use tera::{Context, Tera};

use super::value::KqlValue;
use crate::Result;

/// Named parameters for one template render.
#[derive(Debug, Clone, Default)]
pub struct KqlParams {
    values: Vec<(&'static str, KqlValue)>,
}

impl KqlParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to a value, replacing any earlier binding
    pub fn bind(mut self, name: &'static str, value: impl Into<KqlValue>) -> Self {
        let value = value.into();
        match self.values.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name, value)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&KqlValue> {
        self.values
            .iter()
            .find(|(existing, _)| *existing == name)
            .map(|(_, value)| value)
    }
}

/// Render a KQL template with the given parameters
pub fn render(template: &str, params: &KqlParams) -> Result<String> {
    // The template name has no .html/.xml suffix, so Tera does not autoescape
    let mut tera = Tera::default();
    tera.add_raw_template("kql", template)?;

    let mut context = Context::new();
    for (name, value) in &params.values {
        context.insert(*name, &value.render());
    }

    let rendered = tera.render("kql", &context)?;
    Ok(rendered.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kql::value::{Limit, Lookback, TableName};

    #[test]
    fn test_render_template() {
        let params = KqlParams::new()
            .bind("table", TableName::new("Syslog").unwrap())
            .bind("limit", Limit::new(5).unwrap());

        let result = render("{{ table }}\n| take {{ limit }}", &params).unwrap();
        assert_eq!(result, "Syslog\n| take 5");
    }

    #[test]
    fn test_string_values_arrive_as_literals() {
        let params = KqlParams::new()
            .bind("target_ip", "10.0.0.1\" or true or \"")
            .bind("lookback", Lookback::default());

        let result = render("let target_ip = {{ target_ip }};\nlet from_day = ago({{ lookback }});", &params).unwrap();
        assert_eq!(
            result,
            "let target_ip = \"10.0.0.1\\\" or true or \\\"\";\nlet from_day = ago(7d);"
        );
    }

    #[test]
    fn test_unbound_parameter_is_an_error() {
        let err = render("{{ missing }}", &KqlParams::new()).unwrap_err();
        assert!(matches!(err, crate::Error::Template(_)));
    }

    #[test]
    fn test_rebinding_replaces_value() {
        let params = KqlParams::new().bind("ip", "1.1.1.1").bind("ip", "2.2.2.2");
        assert_eq!(params.get("ip"), Some(&KqlValue::from("2.2.2.2")));
    }
}
