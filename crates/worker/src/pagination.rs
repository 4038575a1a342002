//! Derives the next page URL for pagination fan-out (schema §4.5 step 6,
//! §9 "browser next URL resolution").

use schema::{PaginationRule, PaginationType, ParsingSchema};
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

/// Returns the next page's URL, or `None` if this schema's pagination rule
/// doesn't yield one for this page (no more pages, no derivable URL, or a
/// pagination style — `infinite_scroll` — that the fetcher already handles
/// within a single task).
pub fn derive_next_page(schema: &ParsingSchema, html: &str, current_url: &str) -> Option<String> {
    match schema.pagination.kind {
        PaginationType::NextButton | PaginationType::LoadMore => next_button_url(&schema.pagination, html, current_url),
        PaginationType::PageParam => page_param_url(&schema.pagination, current_url),
        PaginationType::InfiniteScroll | PaginationType::None => None,
    }
}

fn next_button_url(rule: &PaginationRule, html: &str, current_url: &str) -> Option<String> {
    let selector_str = rule.selector.as_deref()?;
    let selector = Selector::parse(selector_str).ok()?;
    let document = Html::parse_document(html);
    let href = document.select(&selector).next()?.value().attr("href")?;

    if href.starts_with("javascript:") {
        debug!(href, "next-page href is unclickable from a static fetch, skipping pagination");
        return None;
    }

    let base = Url::parse(current_url).ok()?;
    base.join(href).ok().map(|u| u.to_string())
}

fn page_param_url(rule: &PaginationRule, current_url: &str) -> Option<String> {
    let param_name = rule.param_name.as_deref()?;
    let mut url = Url::parse(current_url).ok()?;

    let current_value = url
        .query_pairs()
        .find(|(k, _)| k == param_name)
        .and_then(|(_, v)| v.parse::<i64>().ok())
        .unwrap_or(rule.param_start.unwrap_or(1));

    let next_value = current_value + rule.param_step.unwrap_or(1);

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != param_name)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    {
        let mut serializer = url.query_pairs_mut();
        serializer.clear();
        for (k, v) in &pairs {
            serializer.append_pair(k, v);
        }
        serializer.append_pair(param_name, &next_value.to_string());
    }

    Some(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema::FetchMode;
    use uuid::Uuid;

    fn schema_with(pagination: PaginationRule) -> ParsingSchema {
        ParsingSchema::new(
            Uuid::nil(),
            1,
            "demo-source",
            "https://example.com",
            vec![schema::FieldDefinition::new(
                "name",
                schema::FieldType::String,
                schema::ExtractionMethod::Css,
                ".name",
            )],
            FetchMode::Http,
        )
        .with_pagination(pagination)
    }

    #[test]
    fn next_button_resolves_relative_href_absolute() {
        let schema = schema_with(PaginationRule::next_button("a.next-page", 10));
        let html = r#"<html><body><a class="next-page" href="/catalog?page=2">Next</a></body></html>"#;
        let next = derive_next_page(&schema, html, "https://example.com/catalog?page=1");
        assert_eq!(next, Some("https://example.com/catalog?page=2".to_string()));
    }

    #[test]
    fn next_button_skips_javascript_href() {
        let schema = schema_with(PaginationRule::next_button("a.next-page", 10));
        let html = r#"<html><body><a class="next-page" href="javascript:loadMore()">Next</a></body></html>"#;
        let next = derive_next_page(&schema, html, "https://example.com/catalog");
        assert_eq!(next, None);
    }

    #[test]
    fn next_button_missing_element_yields_none() {
        let schema = schema_with(PaginationRule::next_button("a.next-page", 10));
        let next = derive_next_page(&schema, "<html><body>no link here</body></html>", "https://example.com");
        assert_eq!(next, None);
    }

    #[test]
    fn page_param_increments_by_step() {
        let schema = schema_with(PaginationRule::page_param("page", 1, 1, 10));
        let next = derive_next_page(&schema, "<html></html>", "https://example.com/catalog?page=1");
        assert_eq!(next, Some("https://example.com/catalog?page=2".to_string()));
    }

    #[test]
    fn page_param_treats_absent_param_as_the_start_page() {
        let schema = schema_with(PaginationRule::page_param("page", 1, 1, 10));
        let next = derive_next_page(&schema, "<html></html>", "https://example.com/catalog");
        assert_eq!(next, Some("https://example.com/catalog?page=2".to_string()));
    }

    #[test]
    fn infinite_scroll_has_no_derivable_next_page() {
        let schema = schema_with(PaginationRule {
            kind: PaginationType::InfiniteScroll,
            max_pages: 5,
            ..PaginationRule::none()
        });
        let next = derive_next_page(&schema, "<html></html>", "https://example.com");
        assert_eq!(next, None);
    }
}
