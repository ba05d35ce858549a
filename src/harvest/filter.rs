//! Configures the remote view: target categories, then the date sub-window.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::error::FilterError;
use super::retry::{millis, RetryPolicy};
use crate::models::FilterSpec;
use crate::scrapers::browser::{
    BrowserSession, ElementHandle, Locator, LocatorChain, SessionError,
};

/// Site controls the filter step drives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterControls {
    /// Opens the category filter panel.
    pub open: LocatorChain,
    /// Resets the panel to the site's defaults. Optional on the page.
    pub restore_defaults: LocatorChain,
    /// Currently checked category inputs.
    pub checked_options: String,
    /// Category labels; their `for` attribute names the input.
    pub option_labels: String,
    pub submit: LocatorChain,
    /// Script setting the date range; `{start}` and `{end}` are ISO dates.
    pub date_script: String,
    /// Generic close buttons tried when a click is intercepted.
    pub overlay_close: LocatorChain,
    /// Close button of the sign-up popup shown on first visit.
    pub popup_close: LocatorChain,
}

impl Default for FilterControls {
    fn default() -> Self {
        Self {
            open: LocatorChain::new(vec![Locator::id("filterStateAnchor")]),
            restore_defaults: LocatorChain::new(vec![Locator::id("filterRestoreDefaults")]),
            checked_options: "ul.countryOption input:checked".into(),
            option_labels: "ul.countryOption li label".into(),
            submit: LocatorChain::new(vec![Locator::id("ecSubmitButton")]),
            date_script: "calendarFilters.datePickerFilter('{start}', '{end}');".into(),
            overlay_close: LocatorChain::new(vec![
                Locator::css("button[aria-label='Close']"),
                Locator::css(".modal-close"),
                Locator::css(".overlay-close"),
                Locator::css("[data-dismiss='modal']"),
            ]),
            popup_close: LocatorChain::new(vec![Locator::css(
                "#PromoteSignUpPopUp .popupCloseIcon.largeBannerCloser",
            )]),
        }
    }
}

/// Pauses after each filter action so the page can re-render.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterTiming {
    /// After opening the panel, resetting it, and submitting.
    #[serde(with = "millis")]
    pub settle: Duration,
    /// After the date range script; the table reloads from scratch.
    #[serde(with = "millis")]
    pub date_settle: Duration,
}

impl Default for FilterTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(1),
            date_settle: Duration::from_secs(5),
        }
    }
}

impl FilterTiming {
    pub fn immediate() -> Self {
        Self {
            settle: Duration::ZERO,
            date_settle: Duration::ZERO,
        }
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Applies a [`FilterSpec`] to the session's current page.
///
/// Every call starts from a cleared selection, so applying the same spec twice
/// leaves the view in the same state as applying it once.
#[derive(Debug, Clone)]
pub struct FilterApplier {
    controls: FilterControls,
    timing: FilterTiming,
    retry: RetryPolicy,
}

impl FilterApplier {
    pub fn new(controls: FilterControls, timing: FilterTiming, retry: RetryPolicy) -> Self {
        Self {
            controls,
            timing,
            retry,
        }
    }

    pub async fn apply(
        &self,
        session: &mut dyn BrowserSession,
        spec: &FilterSpec,
    ) -> Result<(), FilterError> {
        let window = spec.window.ok_or(FilterError::MissingWindow)?;

        let open = self
            .controls
            .open
            .first_match(session)
            .await?
            .ok_or(FilterError::ControlMissing("filter"))?;
        self.click(session, &open).await?;
        pause(self.timing.settle).await;

        self.reset(session).await?;
        self.select_labels(session, &spec.labels).await?;

        let submit = self
            .controls
            .submit
            .first_match(session)
            .await?
            .ok_or(FilterError::ControlMissing("submit"))?;
        self.click(session, &submit).await?;
        pause(self.timing.settle).await;

        let script = self
            .controls
            .date_script
            .replace("{start}", &window.start().format("%Y-%m-%d").to_string())
            .replace("{end}", &window.end().format("%Y-%m-%d").to_string());
        info!("Applying date range {}", window);
        session.run_script(&script).await?;
        pause(self.timing.date_settle).await;

        Ok(())
    }

    /// Restore defaults if the page offers it, then uncheck everything.
    async fn reset(&self, session: &mut dyn BrowserSession) -> Result<(), FilterError> {
        if let Some(restore) = self.controls.restore_defaults.first_match(session).await? {
            match self.click(session, &restore).await {
                Ok(()) => pause(self.timing.settle).await,
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => debug!("Restore defaults failed: {}", e),
            }
        }

        // Unchecking shrinks the match set, so always take the first match.
        let checked = session.query(&self.controls.checked_options).await?.len();
        for _ in 0..checked {
            let Some(first) = session
                .query(&self.controls.checked_options)
                .await?
                .into_iter()
                .next()
            else {
                break;
            };
            match self.click(session, &first).await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    debug!("Could not uncheck option: {}", e);
                    break;
                }
            }
        }
        Ok(())
    }

    /// Check every option whose label contains one of `targets`.
    async fn select_labels(
        &self,
        session: &mut dyn BrowserSession,
        targets: &[String],
    ) -> Result<(), FilterError> {
        let mut clicked: HashSet<ElementHandle> = HashSet::new();
        let mut matched: HashSet<&str> = HashSet::new();

        for label in session.query(&self.controls.option_labels).await? {
            let text = match session.read_text(&label).await {
                Ok(text) => text,
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(_) => continue,
            };
            let hits: Vec<&str> = targets
                .iter()
                .map(String::as_str)
                .filter(|t| text.contains(t))
                .collect();
            if hits.is_empty() {
                continue;
            }

            let input = match session.attribute(&label, "for").await? {
                Some(id) if !id.is_empty() => Locator::id(id).find(session).await?,
                _ => None,
            };
            let target = input.unwrap_or(label);
            if !clicked.insert(target.clone()) {
                continue;
            }
            match self.click(session, &target).await {
                Ok(()) => matched.extend(hits),
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => warn!("Could not select {:?}: {}", text.trim(), e),
            }
        }

        for target in targets {
            if !matched.contains(target.as_str()) {
                debug!("No option matched {:?}", target);
            }
        }
        Ok(())
    }

    /// Click, closing overlays and retrying when the click is intercepted.
    async fn click(
        &self,
        session: &mut dyn BrowserSession,
        element: &ElementHandle,
    ) -> Result<(), SessionError> {
        let attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match session.click(element).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_fatal() || attempt + 1 >= attempts => return Err(e),
                Err(e) => {
                    debug!("Click on {}[{}] failed: {}", element.selector, element.index, e);
                    close_overlay(session, &self.controls.overlay_close).await?;
                    self.retry.wait(attempt).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Close the first-visit popup if it is showing. Never fails on a
    /// missing or stubborn popup.
    pub async fn dismiss_popup(&self, session: &mut dyn BrowserSession) -> Result<(), SessionError> {
        match self.controls.popup_close.first_match(session).await? {
            Some(close) => match session.click(&close).await {
                Ok(()) => info!("Closed popup"),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!("Popup did not close: {}", e),
            },
            None => debug!("No popup shown"),
        }
        Ok(())
    }
}

async fn close_overlay(
    session: &mut dyn BrowserSession,
    chain: &LocatorChain,
) -> Result<(), SessionError> {
    if let Some(close) = chain.first_match(session).await? {
        match session.click(&close).await {
            Ok(()) => debug!("Closed overlay {}", close.selector),
            Err(e) if e.is_fatal() => return Err(e),
            Err(_) => {}
        }
    }
    Ok(())
}
