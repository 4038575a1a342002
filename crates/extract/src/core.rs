//! The extraction core: resolves a schema's fields against an HTML document
//! and yields validated records plus a rejected-record count.

use scraper::{ElementRef, Html, Selector};
use schema::{ExtractionMethod, FieldDefinition, FieldType, ParsingSchema};

use crate::error::{Error, Result};
use crate::transforms::apply_transformations;
use crate::value::{FieldValue, Record};

/// The result of running the extraction core once over a document.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub records: Vec<Record>,
    /// Records that failed `min_fields_required`/required-field validation,
    /// kept around so callers can persist them to a trash store rather than
    /// just a count.
    pub rejected_records: Vec<Record>,
    pub records_extracted: usize,
    pub records_rejected: usize,
}

impl ExtractionOutcome {
    pub fn records_valid(&self) -> usize {
        self.records.len()
    }
}

/// Parses `html` once, resolves every field of `schema` against each record
/// root, and returns accepted records plus a rejection count.
///
/// `base_url` is used by URL-resolving transforms (`absolute_url`) and is
/// typically the final URL the page was fetched from, after redirects.
pub fn extract(schema: &ParsingSchema, html: &str, base_url: &str) -> Result<ExtractionOutcome> {
    let document = Html::parse_document(html);

    let roots: Vec<ElementRef> = match &schema.item_container {
        Some(container) => {
            let selector = Selector::parse(container).map_err(|e| Error::InvalidSelector {
                selector: container.clone(),
                message: e.to_string(),
            })?;
            document.select(&selector).collect()
        }
        None => vec![document.root_element()],
    };

    tracing::debug!(
        selector = ?schema.item_container,
        count = roots.len(),
        "found record roots"
    );

    let mut records = Vec::with_capacity(roots.len());
    let mut rejected_records = Vec::new();

    for root in &roots {
        let root_html = root.html();
        let record = extract_record(schema, root, &root_html, base_url);
        if validate_record(schema, &record) {
            records.push(record);
        } else {
            rejected_records.push(record);
        }
    }

    let records_extracted = roots.len();
    tracing::info!(
        total_found = records_extracted,
        valid_records = records.len(),
        "extraction complete"
    );

    Ok(ExtractionOutcome {
        records,
        records_extracted,
        records_rejected: rejected_records.len(),
        rejected_records,
    })
}

fn extract_record(schema: &ParsingSchema, root: &ElementRef, root_html: &str, base_url: &str) -> Record {
    let mut record = Record::new();

    for field in &schema.fields {
        let mut value = extract_field(root, root_html, field);

        if let Some(extracted) = value {
            if !extracted.is_null() {
                let transformed = apply_transformations(extracted, &field.transformations, base_url);
                let coerced = coerce(transformed, field.field_type);
                value = Some(apply_field_validation(field, coerced));
            } else {
                value = Some(extracted);
            }
        }

        let final_value = match value {
            None | Some(FieldValue::Null) => default_value(field),
            Some(v) => v,
        };

        record.insert(field.name.clone(), final_value);
    }

    record
}

fn apply_field_validation(field: &FieldDefinition, value: FieldValue) -> FieldValue {
    let Some(pattern) = &field.validation_regex else {
        return value;
    };
    if value.is_falsy() {
        return value;
    }

    let rendered = value.to_display_string();
    match regex::Regex::new(pattern) {
        Ok(re) if re.is_match(&rendered) => value,
        _ => {
            tracing::debug!(
                field = %field.name,
                value = %rendered,
                pattern = %pattern,
                "field failed validation"
            );
            default_value(field)
        }
    }
}

fn default_value(field: &FieldDefinition) -> FieldValue {
    field
        .default
        .clone()
        .map(FieldValue::from)
        .unwrap_or(FieldValue::Null)
}

fn extract_field(root: &ElementRef, root_html: &str, field: &FieldDefinition) -> Option<FieldValue> {
    let (selector, attribute) = field.resolved_selector();

    let primary = extract_with_selector(root, root_html, field.method, selector, attribute);
    if primary.is_some() {
        return primary;
    }

    for fallback in &field.fallback_selectors {
        let value = extract_with_selector(root, root_html, field.method, fallback, attribute);
        if value.is_some() {
            return value;
        }
    }

    None
}

fn extract_with_selector(
    root: &ElementRef,
    root_html: &str,
    method: ExtractionMethod,
    selector: &str,
    attribute: Option<&str>,
) -> Option<FieldValue> {
    match method {
        ExtractionMethod::Css => extract_css(root, selector, attribute),
        ExtractionMethod::Xpath => extract_xpath(root_html, selector, attribute),
        ExtractionMethod::Regex => extract_regex(root_html, selector),
        ExtractionMethod::JsonPath => extract_json_path(root, selector),
    }
}

fn extract_css(root: &ElementRef, selector_str: &str, attribute: Option<&str>) -> Option<FieldValue> {
    let selector = Selector::parse(selector_str).ok()?;
    let element = root.select(&selector).next()?;

    if let Some(attr) = attribute {
        return element.value().attr(attr).map(|s| FieldValue::String(s.to_string()));
    }

    let text = element.text().collect::<Vec<_>>().join(" ");
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    Some(FieldValue::String(normalized))
}

/// Re-parses the record root's serialized markup as its own XML document,
/// mirroring the reference implementation's `lxml.html.fromstring(node.html)`
/// re-parse-per-node approach. Malformed (non-well-formed) markup simply
/// yields no match rather than an error, same as the Python fallback.
fn extract_xpath(root_html: &str, selector: &str, attribute: Option<&str>) -> Option<FieldValue> {
    let package = sxd_document::parser::parse(root_html).ok()?;
    let document = package.as_document();

    let context = sxd_xpath::Context::new();
    let factory = sxd_xpath::Factory::new();
    let xpath = factory.build(selector).ok().flatten()?;
    let value = xpath.evaluate(&context, document.root()).ok()?;

    match value {
        sxd_xpath::Value::Nodeset(nodes) => {
            let node = nodes.document_order_first()?;
            if let Some(attr) = attribute {
                let element = node.element()?;
                element
                    .attribute(attr)
                    .map(|a| FieldValue::String(a.value().to_string()))
            } else {
                Some(FieldValue::String(node.string_value().trim().to_string()))
            }
        }
        sxd_xpath::Value::String(s) => Some(FieldValue::String(s)),
        sxd_xpath::Value::Number(n) => Some(FieldValue::Float(n)),
        sxd_xpath::Value::Boolean(b) => Some(FieldValue::Bool(b)),
    }
}

fn extract_regex(html: &str, pattern: &str) -> Option<FieldValue> {
    let re = regex::RegexBuilder::new(pattern)
        .dot_matches_new_line(true)
        .build()
        .ok()?;
    let caps = re.captures(html)?;

    let matched = if caps.len() > 1 {
        caps.get(1)
    } else {
        caps.get(0)
    };
    matched.map(|m| FieldValue::String(m.as_str().to_string()))
}

fn extract_json_path(root: &ElementRef, path: &str) -> Option<FieldValue> {
    let selector =
        Selector::parse(r#"script[type="application/json"], script[type="application/ld+json"]"#).ok()?;

    for script in root.select(&selector) {
        let text: String = script.text().collect();
        let Ok(data) = serde_json::from_str::<serde_json::Value>(&text) else {
            continue;
        };
        if let Some(value) = json_path_value(&data, path) {
            return Some(FieldValue::from(value));
        }
    }

    None
}

fn json_path_value<'a>(data: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    let trimmed = path.trim_start_matches('$').trim_start_matches('.');
    let mut current = data;

    for part in trimmed.split('.') {
        if part.is_empty() {
            continue;
        }

        if let Some(bracket_pos) = part.find('[') {
            let key = &part[..bracket_pos];
            let index_str = part[bracket_pos + 1..].trim_end_matches(']');
            if !key.is_empty() {
                current = current.get(key)?;
            }
            let index: usize = index_str.parse().ok()?;
            current = current.as_array()?.get(index)?;
        } else {
            current = current.get(part)?;
        }
    }

    Some(current)
}

fn coerce(value: FieldValue, field_type: FieldType) -> FieldValue {
    if value.is_null() {
        return value;
    }

    match field_type {
        FieldType::String => FieldValue::String(value.to_display_string()),
        FieldType::Integer => match value {
            FieldValue::Integer(_) => value,
            FieldValue::Float(f) => FieldValue::Integer(f as i64),
            _ => {
                let cleaned = value.to_display_string().replace(',', "").replace(' ', "");
                cleaned
                    .parse::<f64>()
                    .map(|f| FieldValue::Integer(f as i64))
                    .unwrap_or(value)
            }
        },
        FieldType::Float => match value {
            FieldValue::Float(_) => value,
            FieldValue::Integer(i) => FieldValue::Float(i as f64),
            _ => {
                let cleaned = value.to_display_string().replace(',', ".").replace(' ', "");
                cleaned.parse::<f64>().map(FieldValue::Float).unwrap_or(value)
            }
        },
        FieldType::Boolean => match value {
            FieldValue::Bool(_) => value,
            _ => {
                let lower = value.to_display_string().to_lowercase();
                FieldValue::Bool(matches!(lower.as_str(), "true" | "yes" | "1" | "да"))
            }
        },
        FieldType::Url | FieldType::Datetime => FieldValue::String(value.to_display_string()),
        FieldType::List => match value {
            FieldValue::List(_) => value,
            other => FieldValue::List(vec![other]),
        },
        FieldType::Json => match &value {
            FieldValue::Json(_) => value,
            _ => {
                let rendered = value.to_display_string();
                serde_json::from_str::<serde_json::Value>(&rendered)
                    .map(FieldValue::from)
                    .unwrap_or(value)
            }
        },
    }
}

fn validate_record(schema: &ParsingSchema, record: &Record) -> bool {
    let required_fields: Vec<&FieldDefinition> = schema.fields.iter().filter(|f| f.required).collect();

    let filled = required_fields
        .iter()
        .filter(|f| !matches!(record.get(&f.name), None | Some(FieldValue::Null)))
        .count();

    if filled < schema.min_fields_required {
        return false;
    }

    for field in &required_fields {
        if matches!(record.get(&field.name), None | Some(FieldValue::Null)) {
            tracing::debug!(field = %field.name, "required field missing");
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema::{ExtractionMethod, FetchMode, FieldDefinition, FieldType, ParsingSchema};
    use uuid::Uuid;

    fn catalog_schema() -> ParsingSchema {
        let name = FieldDefinition::new("name", FieldType::String, ExtractionMethod::Css, "h2.product-name")
            .required();
        let price = FieldDefinition::new(
            "price",
            FieldType::Float,
            ExtractionMethod::Css,
            "span.price@data-raw",
        )
        .with_transformations(["extract_number"])
        .required();
        let url = FieldDefinition::new("url", FieldType::Url, ExtractionMethod::Css, "a.product-link@href")
            .with_transformations(["absolute_url"]);

        ParsingSchema::new(
            Uuid::nil(),
            1,
            "demo-source",
            "https://example.com/catalog",
            vec![name, price, url],
            FetchMode::Http,
        )
        .with_item_container("div.product-card")
    }

    const CATALOG_HTML: &str = r#"
        <html><body>
            <div class="product-card">
                <h2 class="product-name">Widget</h2>
                <span class="price" data-raw="19,99">€19,99</span>
                <a class="product-link" href="/widgets/1">Widget</a>
            </div>
            <div class="product-card">
                <h2 class="product-name">Gadget</h2>
                <span class="price" data-raw="1.234,56">€1.234,56</span>
                <a class="product-link" href="/widgets/2">Gadget</a>
            </div>
            <div class="product-card">
                <h2 class="product-name">Gizmo</h2>
                <a class="product-link" href="/widgets/3">Gizmo</a>
            </div>
        </body></html>
    "#;

    #[test]
    fn s1_catalog_extraction_yields_absolute_urls() {
        let schema = catalog_schema();
        let outcome = extract(&schema, CATALOG_HTML, "https://example.com/catalog").unwrap();

        assert_eq!(outcome.records_extracted, 3);
        assert_eq!(outcome.records_valid(), 2);
        assert_eq!(outcome.records_rejected, 1);

        let first = &outcome.records[0];
        assert_eq!(first.get("url"), Some(&FieldValue::String("https://example.com/widgets/1".into())));
        assert_eq!(first.get("price"), Some(&FieldValue::Float(19.99)));
    }

    #[test]
    fn s2_record_missing_required_field_is_rejected() {
        let schema = catalog_schema();
        let outcome = extract(&schema, CATALOG_HTML, "https://example.com").unwrap();
        assert_eq!(outcome.records_rejected, 1);
    }

    #[test]
    fn s3_fallback_selector_rescues_missing_field() {
        let price = FieldDefinition::new("price", FieldType::Float, ExtractionMethod::Css, ".price")
            .with_transformations(["extract_number"])
            .with_fallback_selectors([".alternate-price"])
            .required();
        let name = FieldDefinition::new("name", FieldType::String, ExtractionMethod::Css, "h2").required();
        let schema = ParsingSchema::new(
            Uuid::nil(),
            1,
            "demo-source",
            "https://example.com",
            vec![name, price],
            FetchMode::Http,
        );

        let html = r#"<html><body><h2>Item</h2><span class="alternate-price">9.99</span></body></html>"#;
        let outcome = extract(&schema, html, "https://example.com").unwrap();

        assert_eq!(outcome.records_valid(), 1);
        assert_eq!(outcome.records[0].get("price"), Some(&FieldValue::Float(9.99)));
    }

    #[test]
    fn invariant_valid_plus_rejected_equals_extracted() {
        let schema = catalog_schema();
        let outcome = extract(&schema, CATALOG_HTML, "https://example.com").unwrap();
        assert_eq!(
            outcome.records_valid() + outcome.records_rejected,
            outcome.records_extracted
        );
    }

    #[test]
    fn single_record_root_when_no_item_container() {
        let title = FieldDefinition::new("title", FieldType::String, ExtractionMethod::Css, "title");
        let schema = ParsingSchema::new(
            Uuid::nil(),
            1,
            "demo-source",
            "https://example.com",
            vec![title],
            FetchMode::Http,
        );
        let outcome = extract(&schema, "<html><head><title>Hi</title></head></html>", "").unwrap();
        assert_eq!(outcome.records_extracted, 1);
        assert_eq!(outcome.records[0].get("title"), Some(&FieldValue::String("Hi".into())));
    }
}
