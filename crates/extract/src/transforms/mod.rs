//! The closed registry of named transformation functions applied, left to
//! right, to a raw extracted value. Every transform is pure and total:
//! unparseable input falls back to the identity or to `Null`, never to a
//! panic.

mod date;
mod number;

use crate::value::FieldValue;

/// Applies an ordered chain of transformations to `value`.
///
/// `Null` short-circuits: a chain is never applied to a missing value.
/// Matches invariant: an empty chain is the identity.
pub fn apply_transformations(value: FieldValue, transformations: &[String], base_url: &str) -> FieldValue {
    if value.is_null() {
        return value;
    }

    transformations
        .iter()
        .fold(value, |current, transform| apply_single(current, transform, base_url))
}

fn apply_single(value: FieldValue, transform: &str, base_url: &str) -> FieldValue {
    if value.is_null() {
        return value;
    }

    let str_value = value.to_display_string();
    let lower = transform.to_lowercase();

    match lower.as_str() {
        "trim" => return FieldValue::String(str_value.trim().to_string()),
        "lowercase" => return FieldValue::String(str_value.to_lowercase()),
        "uppercase" => return FieldValue::String(str_value.to_uppercase()),
        "capitalize" => return FieldValue::String(capitalize(&str_value)),
        "title" => return FieldValue::String(title_case(&str_value)),
        "normalize_whitespace" => {
            return FieldValue::String(str_value.split_whitespace().collect::<Vec<_>>().join(" "))
        }
        "remove_newlines" => {
            return FieldValue::String(str_value.replace('\n', " ").replace('\r', ""))
        }
        "extract_number" | "extract_float" => {
            return number::extract_number(&str_value)
                .map(FieldValue::Float)
                .unwrap_or(FieldValue::Null)
        }
        "extract_int" => {
            return number::extract_number(&str_value)
                .map(|n| FieldValue::Integer(n as i64))
                .unwrap_or(FieldValue::Null)
        }
        "absolute_url" => return FieldValue::String(absolute_url(&str_value, base_url)),
        "extract_domain" => return FieldValue::String(extract_domain(&str_value)),
        "parse_date" => return FieldValue::String(date::parse_date(&str_value)),
        "parse_datetime" => return FieldValue::String(date::parse_datetime(&str_value)),
        "strip_html" => return FieldValue::String(strip_html(&str_value)),
        "decode_entities" => return FieldValue::String(decode_entities(&str_value)),
        "extract_price" => {
            return number::extract_price(&str_value)
                .map(FieldValue::from)
                .unwrap_or(FieldValue::Null)
        }
        "to_bool" => return FieldValue::Bool(to_bool(&str_value)),
        "parse_json" => {
            return match serde_json::from_str::<serde_json::Value>(&str_value) {
                Ok(parsed) => FieldValue::from(parsed),
                Err(_) => FieldValue::String(str_value),
            }
        }
        _ => {}
    }

    if lower.starts_with("regex:") {
        return apply_regex_transform(&value, &str_value, transform);
    }
    if lower.starts_with("replace:") {
        return apply_replace_transform(&value, &str_value, transform);
    }
    if lower.starts_with("substr:") {
        return apply_substr_transform(&value, &str_value, transform);
    }

    tracing::debug!(transform = %transform, "unknown transform, passing value through unchanged");
    value
}

fn apply_regex_transform(original: &FieldValue, str_value: &str, transform: &str) -> FieldValue {
    let parts: Vec<&str> = transform.splitn(3, ':').collect();
    if parts.len() < 2 {
        return original.clone();
    }
    let pattern = parts[1];
    let group: usize = parts.get(2).and_then(|g| g.parse().ok()).unwrap_or(0);

    match regex::Regex::new(pattern) {
        Ok(re) => re
            .captures(str_value)
            .and_then(|caps| caps.get(group))
            .map(|m| FieldValue::String(m.as_str().to_string()))
            .unwrap_or(FieldValue::Null),
        Err(_) => FieldValue::Null,
    }
}

fn apply_replace_transform(original: &FieldValue, str_value: &str, transform: &str) -> FieldValue {
    let parts: Vec<&str> = transform.splitn(3, ':').collect();
    if parts.len() < 3 {
        return original.clone();
    }
    FieldValue::String(str_value.replace(parts[1], parts[2]))
}

fn apply_substr_transform(original: &FieldValue, str_value: &str, transform: &str) -> FieldValue {
    let parts: Vec<&str> = transform.split(':').collect();
    if parts.len() < 2 {
        return original.clone();
    }
    let start: i64 = if parts[1].is_empty() {
        0
    } else {
        parts[1].parse().unwrap_or(0)
    };
    let end: Option<i64> = parts
        .get(2)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse().ok());

    FieldValue::String(slice_chars(str_value, start, end))
}

/// Python-style string slicing over Unicode scalar values: negative indices
/// count from the end, out-of-range indices clamp rather than panic.
fn slice_chars(s: &str, start: i64, end: Option<i64>) -> String {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len() as i64;
    let normalize = |i: i64| -> i64 {
        if i < 0 {
            (len + i).max(0)
        } else {
            i.min(len)
        }
    };

    let start_idx = normalize(start);
    let end_idx = end.map(normalize).unwrap_or(len);

    if start_idx >= end_idx {
        return String::new();
    }
    chars[start_idx as usize..end_idx as usize].iter().collect()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => {
            first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
        }
    }
}

fn title_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut prev_was_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_was_alpha {
                result.extend(c.to_lowercase());
            } else {
                result.extend(c.to_uppercase());
            }
            prev_was_alpha = true;
        } else {
            result.push(c);
            prev_was_alpha = false;
        }
    }
    result
}

fn absolute_url(value: &str, base_url: &str) -> String {
    let already_absolute =
        value.starts_with("http://") || value.starts_with("https://") || value.starts_with("//");
    if base_url.is_empty() || already_absolute {
        return value.to_string();
    }

    url::Url::parse(base_url)
        .and_then(|base| base.join(value))
        .map(|joined| joined.to_string())
        .unwrap_or_else(|_| value.to_string())
}

fn extract_domain(value: &str) -> String {
    match url::Url::parse(value) {
        Ok(parsed) => {
            let mut netloc = String::new();
            if !parsed.username().is_empty() {
                netloc.push_str(parsed.username());
                if let Some(password) = parsed.password() {
                    netloc.push(':');
                    netloc.push_str(password);
                }
                netloc.push('@');
            }
            netloc.push_str(parsed.host_str().unwrap_or(""));
            if let Some(port) = parsed.port() {
                netloc.push(':');
                netloc.push_str(&port.to_string());
            }
            netloc
        }
        Err(_) => value.to_string(),
    }
}

fn strip_html(value: &str) -> String {
    static TAG_PATTERN: &str = r"<[^>]+>";
    regex::Regex::new(TAG_PATTERN)
        .map(|re| re.replace_all(value, "").into_owned())
        .unwrap_or_else(|_| value.to_string())
}

fn decode_entities(value: &str) -> String {
    let fragment = scraper::Html::parse_fragment(value);
    fragment.root_element().text().collect::<String>()
}

const TRUTHY_TOKENS: &[&str] = &["true", "yes", "1", "on", "да", "есть", "в наличии", "in stock"];
const FALSY_TOKENS: &[&str] = &["false", "no", "0", "off", "нет", "отсутствует", "out of stock"];

fn to_bool(value: &str) -> bool {
    let lower = value.to_lowercase();
    let trimmed = lower.trim();

    if TRUTHY_TOKENS.contains(&trimmed) {
        return true;
    }
    if FALSY_TOKENS.contains(&trimmed) {
        return false;
    }
    !value.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(value: &str) -> FieldValue {
        FieldValue::String(value.to_string())
    }

    #[test]
    fn empty_chain_is_identity() {
        let value = s("  Hello  ");
        assert_eq!(apply_transformations(value.clone(), &[], ""), value);
    }

    #[test]
    fn trim_is_idempotent() {
        let once = apply_single(s("  hi  "), "trim", "");
        let twice = apply_single(once.clone(), "trim", "");
        assert_eq!(once, twice);
    }

    #[test]
    fn chain_applies_left_to_right() {
        let transforms = vec!["trim".to_string(), "uppercase".to_string()];
        let result = apply_transformations(s("  hello  "), &transforms, "");
        assert_eq!(result, s("HELLO"));
    }

    #[test]
    fn absolute_url_resolves_relative_path() {
        let result = apply_single(s("/widgets/1"), "absolute_url", "https://example.com/catalog");
        assert_eq!(result, s("https://example.com/widgets/1"));
    }

    #[test]
    fn absolute_url_leaves_already_absolute_urls_alone() {
        let result = apply_single(s("https://other.com/x"), "absolute_url", "https://example.com");
        assert_eq!(result, s("https://other.com/x"));
    }

    #[test]
    fn to_bool_recognizes_russian_tokens() {
        assert!(to_bool("в наличии"));
        assert!(!to_bool("отсутствует"));
    }

    #[test]
    fn to_bool_falls_back_to_non_empty_is_truthy() {
        assert!(to_bool("something else"));
        assert!(!to_bool(""));
    }

    #[test]
    fn regex_transform_extracts_capture_group() {
        let result = apply_single(s("SKU-4471"), "regex:SKU-(\\d+):1", "");
        assert_eq!(result, s("4471"));
    }

    #[test]
    fn replace_transform_substitutes_literal_text() {
        let result = apply_single(s("a-b-c"), "replace:-:_", "");
        assert_eq!(result, s("a_b_c"));
    }

    #[test]
    fn substr_transform_slices_with_open_end() {
        let result = apply_single(s("hello world"), "substr:6", "");
        assert_eq!(result, s("world"));
    }

    #[test]
    fn unknown_transform_is_a_passthrough() {
        let value = s("unchanged");
        assert_eq!(apply_single(value.clone(), "not_a_real_transform", ""), value);
    }
}
