use serde::{Deserialize, Serialize};

/// The typed shape a field's value is coerced into after transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Datetime,
    Url,
    List,
    Json,
}

/// How a field's selector expression is evaluated against the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Css,
    Xpath,
    Regex,
    JsonPath,
}

/// A single named value to extract from a record root.
///
/// `selector` may carry a CSS `@attr` shorthand (e.g. `"img@src"`); the core
/// splits that shorthand at extraction time rather than here, so a field
/// authored with either spelling behaves identically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub method: ExtractionMethod,
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub transformations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_regex: Option<String>,
    #[serde(default)]
    pub fallback_selectors: Vec<String>,
}

impl FieldDefinition {
    pub fn new(
        name: impl Into<String>,
        field_type: FieldType,
        method: ExtractionMethod,
        selector: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            field_type,
            method,
            selector: selector.into(),
            attribute: None,
            required: false,
            default: None,
            transformations: Vec::new(),
            validation_regex: None,
            fallback_selectors: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_transformations<I, S>(mut self, transformations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.transformations = transformations.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_validation_regex(mut self, pattern: impl Into<String>) -> Self {
        self.validation_regex = Some(pattern.into());
        self
    }

    pub fn with_fallback_selectors<I, S>(mut self, fallbacks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallback_selectors = fallbacks.into_iter().map(Into::into).collect();
        self
    }

    /// Splits a CSS `selector@attr` shorthand into `(selector, attribute)`.
    ///
    /// Returns the field's own `selector`/`attribute` unchanged when the
    /// method is not CSS or no shorthand is present.
    pub fn resolved_selector(&self) -> (&str, Option<&str>) {
        if self.method == ExtractionMethod::Css && self.attribute.is_none() {
            if let Some((selector, attr)) = self.selector.rsplit_once('@') {
                return (selector, Some(attr));
            }
        }
        (self.selector.as_str(), self.attribute.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_selector_splits_css_attribute_shorthand() {
        let field = FieldDefinition::new("img", FieldType::Url, ExtractionMethod::Css, "img@src");
        assert_eq!(field.resolved_selector(), ("img", Some("src")));
    }

    #[test]
    fn resolved_selector_prefers_explicit_attribute() {
        let field = FieldDefinition::new("img", FieldType::Url, ExtractionMethod::Css, "img@src")
            .with_attribute("data-src");
        assert_eq!(field.resolved_selector(), ("img@src", Some("data-src")));
    }

    #[test]
    fn resolved_selector_ignores_shorthand_for_non_css_methods() {
        let field = FieldDefinition::new(
            "price",
            FieldType::Float,
            ExtractionMethod::Xpath,
            "//span[@class='price']",
        );
        assert_eq!(
            field.resolved_selector(),
            ("//span[@class='price']", None)
        );
    }
}
