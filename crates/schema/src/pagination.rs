use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationType {
    NextButton,
    PageParam,
    InfiniteScroll,
    LoadMore,
    None,
}

/// A rule describing how a worker derives the next page for a schema.
///
/// Only the fields relevant to `kind` are consulted; the others are ignored
/// but preserved on the struct so a single JSON shape round-trips regardless
/// of which pagination type is active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationRule {
    pub kind: PaginationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param_start: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param_step: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_selector: Option<String>,
    pub max_pages: u32,
}

impl PaginationRule {
    pub fn none() -> Self {
        Self {
            kind: PaginationType::None,
            selector: None,
            param_name: None,
            param_start: None,
            param_step: None,
            scroll_delay_ms: None,
            stop_selector: None,
            max_pages: 1,
        }
    }

    pub fn next_button(selector: impl Into<String>, max_pages: u32) -> Self {
        Self {
            kind: PaginationType::NextButton,
            selector: Some(selector.into()),
            max_pages,
            ..Self::none()
        }
    }

    pub fn page_param(
        param_name: impl Into<String>,
        param_start: i64,
        param_step: i64,
        max_pages: u32,
    ) -> Self {
        Self {
            kind: PaginationType::PageParam,
            param_name: Some(param_name.into()),
            param_start: Some(param_start),
            param_step: Some(param_step),
            max_pages,
            ..Self::none()
        }
    }

    /// Validates that the fields required by `kind` are present.
    pub fn validate(&self) -> Result<()> {
        match self.kind {
            PaginationType::NextButton | PaginationType::LoadMore => {
                if self.selector.is_none() {
                    return Err(Error::InvalidPagination(
                        if self.kind == PaginationType::NextButton {
                            "next_button"
                        } else {
                            "load_more"
                        },
                        "selector",
                    ));
                }
            }
            PaginationType::PageParam => {
                if self.param_name.is_none() {
                    return Err(Error::InvalidPagination("page_param", "param_name"));
                }
            }
            PaginationType::InfiniteScroll | PaginationType::None => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_button_requires_selector() {
        let mut rule = PaginationRule::next_button("a.next", 10);
        assert!(rule.validate().is_ok());
        rule.selector = None;
        assert!(rule.validate().is_err());
    }

    #[test]
    fn page_param_requires_param_name() {
        let rule = PaginationRule::page_param("page", 1, 1, 10);
        assert!(rule.validate().is_ok());
    }

    #[test]
    fn infinite_scroll_has_no_required_fields() {
        let rule = PaginationRule {
            kind: PaginationType::InfiniteScroll,
            max_pages: 5,
            ..PaginationRule::none()
        };
        assert!(rule.validate().is_ok());
    }
}
