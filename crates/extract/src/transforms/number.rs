//! Number and price extraction, ported field-for-field from the reference
//! implementation's disambiguation rule for thousands vs. decimal
//! separators.

use serde_json::json;

/// Extracts a numeric value from a string, tolerating currency symbols and
/// both US (`1,234.56`) and European (`1.234,56`) separator conventions.
pub fn extract_number(value: &str) -> Option<f64> {
    if value.is_empty() {
        return None;
    }

    let mut cleaned: String = value
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',' || *c == '-')
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    let has_comma = cleaned.contains(',');
    let has_period = cleaned.contains('.');

    if has_comma && has_period {
        if cleaned.rfind(',').unwrap() > cleaned.rfind('.').unwrap() {
            // European format: '.' are thousands separators, ',' is decimal.
            cleaned = cleaned.replace('.', "").replace(',', ".");
        } else {
            // US format: ',' are thousands separators.
            cleaned = cleaned.replace(',', "");
        }
    } else if has_comma {
        let last_segment = cleaned.rsplit(',').next().unwrap_or("");
        if last_segment.len() == 2 {
            cleaned = cleaned.replace(',', ".");
        } else {
            cleaned = cleaned.replace(',', "");
        }
    }

    cleaned.parse::<f64>().ok()
}

const CURRENCY_SYMBOLS: &[(&str, &str)] = &[
    ("$", "USD"),
    ("€", "EUR"),
    ("£", "GBP"),
    ("¥", "JPY"),
    ("₽", "RUB"),
    ("₴", "UAH"),
    ("zł", "PLN"),
    ("kr", "SEK"),
];

/// Extracts a `{amount, currency}` pair. `currency` is `null` when no known
/// symbol is present but a number is still found.
pub fn extract_price(value: &str) -> Option<serde_json::Value> {
    if value.is_empty() {
        return None;
    }

    let currency = CURRENCY_SYMBOLS
        .iter()
        .find(|(symbol, _)| value.contains(symbol))
        .map(|(_, code)| *code);

    let amount = extract_number(value)?;

    Some(json!({ "amount": amount, "currency": currency }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_number_is_format_symmetric() {
        assert_eq!(extract_number("1,234.56"), Some(1234.56));
        assert_eq!(extract_number("1.234,56"), Some(1234.56));
    }

    #[test]
    fn extract_number_treats_two_trailing_comma_digits_as_decimal() {
        assert_eq!(extract_number("19,99"), Some(19.99));
    }

    #[test]
    fn extract_number_treats_three_trailing_comma_digits_as_thousands() {
        assert_eq!(extract_number("12,000"), Some(12000.0));
    }

    #[test]
    fn extract_number_returns_none_for_non_numeric() {
        assert_eq!(extract_number("out of stock"), None);
    }

    #[test]
    fn extract_price_detects_currency_symbol() {
        let price = extract_price("€19,99").unwrap();
        assert_eq!(price["amount"], 19.99);
        assert_eq!(price["currency"], "EUR");
    }

    #[test]
    fn extract_price_allows_missing_currency_symbol() {
        let price = extract_price("19.99").unwrap();
        assert_eq!(price["amount"], 19.99);
        assert!(price["currency"].is_null());
    }
}
