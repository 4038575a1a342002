//! Execution of a schema's declarative `navigation_steps` (schema §4.4)
//! against a live page, plus the infinite-scroll pagination loop.

use std::time::Duration;

use chromiumoxide::Page;
use schema::{NavigationAction, NavigationStep, PaginationRule, PaginationType};
use tracing::{debug, warn};

use crate::error::{Error, Result};

pub async fn run_navigation_steps(page: &Page, steps: &[NavigationStep]) -> Result<()> {
    for step in steps {
        if let Err(err) = run_step(page, step).await {
            if step.optional {
                warn!(action = ?step.action, error = %err, "optional navigation step failed, skipping");
                continue;
            }
            return Err(err);
        }

        if step.wait_ms > 0 {
            tokio::time::sleep(Duration::from_millis(step.wait_ms)).await;
        }

        if let Some(wait_for) = &step.wait_for {
            wait_for_selector(page, wait_for).await?;
        }
    }
    Ok(())
}

async fn run_step(page: &Page, step: &NavigationStep) -> Result<()> {
    debug!(action = ?step.action, selector = ?step.selector, "running navigation step");

    match step.action {
        NavigationAction::Goto => {
            let target = step
                .value
                .as_deref()
                .ok_or_else(|| Error::NavigationStep("goto step missing value".into()))?;
            page.goto(target)
                .await
                .map_err(|e| Error::NavigationStep(e.to_string()))?;
        }
        NavigationAction::Click => {
            let selector = require_selector(step)?;
            let element = page
                .find_element(selector)
                .await
                .map_err(|e| Error::NavigationStep(e.to_string()))?;
            element
                .click()
                .await
                .map_err(|e| Error::NavigationStep(e.to_string()))?;
        }
        NavigationAction::Input => {
            let selector = require_selector(step)?;
            let value = step
                .value
                .as_deref()
                .ok_or_else(|| Error::NavigationStep("input step missing value".into()))?;
            let element = page
                .find_element(selector)
                .await
                .map_err(|e| Error::NavigationStep(e.to_string()))?;
            element
                .click()
                .await
                .map_err(|e| Error::NavigationStep(e.to_string()))?;
            element
                .type_str(value)
                .await
                .map_err(|e| Error::NavigationStep(e.to_string()))?;
        }
        NavigationAction::Hover => {
            let selector = require_selector(step)?;
            let element = page
                .find_element(selector)
                .await
                .map_err(|e| Error::NavigationStep(e.to_string()))?;
            element
                .scroll_into_view()
                .await
                .map_err(|e| Error::NavigationStep(e.to_string()))?;
        }
        NavigationAction::Select => {
            let selector = require_selector(step)?;
            let value = step
                .value
                .as_deref()
                .ok_or_else(|| Error::NavigationStep("select step missing value".into()))?;
            let script = format!(
                "(() => {{ const el = document.querySelector({sel:?}); if (!el) return false; \
                 el.value = {val:?}; el.dispatchEvent(new Event('change', {{bubbles: true}})); return true; }})()",
                sel = selector,
                val = value,
            );
            page.evaluate(script)
                .await
                .map_err(|e| Error::NavigationStep(e.to_string()))?;
        }
        NavigationAction::Scroll => {
            page.evaluate("window.scrollTo(0, document.body.scrollHeight)")
                .await
                .map_err(|e| Error::NavigationStep(e.to_string()))?;
        }
        NavigationAction::Wait => {
            // `wait_ms`/`wait_for` handled after the match; nothing else to do.
        }
        NavigationAction::Screenshot => {
            // Screenshots are captured by the fetcher at the end of the
            // run; an explicit step exists so schemas can request one mid-flow
            // for debugging, which the trash writer stores alongside the final one.
        }
    }

    Ok(())
}

fn require_selector(step: &NavigationStep) -> Result<&str> {
    step.selector
        .as_deref()
        .ok_or_else(|| Error::NavigationStep(format!("{:?} step missing selector", step.action)))
}

async fn wait_for_selector(page: &Page, selector: &str) -> Result<()> {
    page.find_element(selector)
        .await
        .map(|_| ())
        .map_err(|e| Error::NavigationStep(format!("wait_for {selector} timed out: {e}")))
}

/// Scrolls until `stop_selector` appears, page height stabilizes twice in a
/// row, or `max_pages` is reached, per the infinite-scroll pagination
/// contract.
pub async fn run_infinite_scroll(page: &Page, pagination: &PaginationRule) -> Result<()> {
    if pagination.kind != PaginationType::InfiniteScroll {
        return Ok(());
    }

    let delay = Duration::from_millis(pagination.scroll_delay_ms.unwrap_or(500));
    let mut stable_rounds = 0;
    let mut last_height: i64 = -1;

    for _ in 0..pagination.max_pages.max(1) {
        page.evaluate("window.scrollTo(0, document.body.scrollHeight)")
            .await
            .map_err(|e| Error::NavigationStep(e.to_string()))?;
        tokio::time::sleep(delay).await;

        if let Some(stop_selector) = &pagination.stop_selector {
            let script = format!("document.querySelector({stop_selector:?}) !== null");
            let stopped: bool = page
                .evaluate(script)
                .await
                .map_err(|e| Error::NavigationStep(e.to_string()))?
                .into_value()
                .unwrap_or(false);
            if stopped {
                debug!(selector = %stop_selector, "stop selector matched, ending infinite scroll");
                break;
            }
        }

        let height: i64 = page
            .evaluate("document.body.scrollHeight")
            .await
            .map_err(|e| Error::NavigationStep(e.to_string()))?
            .into_value()
            .unwrap_or(-1);

        if height == last_height {
            stable_rounds += 1;
            if stable_rounds >= 2 {
                break;
            }
        } else {
            stable_rounds = 0;
        }
        last_height = height;
    }

    Ok(())
}
