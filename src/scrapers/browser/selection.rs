//! Element selection strategies.
//!
//! Page markup drifts, so a control is described by an ordered list of
//! [`Locator`]s. The first one that matches wins.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::{BrowserSession, ElementHandle, SessionError};

/// One way of finding an element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum Locator {
    /// First match of a CSS selector.
    Css { selector: String },
    /// Element with this `id` attribute.
    Id { id: String },
    /// First match of `selector` whose text contains `contains`.
    Text { selector: String, contains: String },
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css {
            selector: selector.into(),
        }
    }

    pub fn id(id: impl Into<String>) -> Self {
        Self::Id { id: id.into() }
    }

    pub fn text(selector: impl Into<String>, contains: impl Into<String>) -> Self {
        Self::Text {
            selector: selector.into(),
            contains: contains.into(),
        }
    }

    /// Resolve against the current page.
    pub async fn find(
        &self,
        session: &mut dyn BrowserSession,
    ) -> Result<Option<ElementHandle>, SessionError> {
        match self {
            Locator::Css { selector } => Ok(session.query(selector).await?.into_iter().next()),
            Locator::Id { id } => {
                let selector = format!("[id=\"{}\"]", id.replace('"', "\\\""));
                Ok(session.query(&selector).await?.into_iter().next())
            }
            Locator::Text { selector, contains } => {
                for handle in session.query(selector).await? {
                    if session.read_text(&handle).await?.contains(contains.as_str()) {
                        return Ok(Some(handle));
                    }
                }
                Ok(None)
            }
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locator::Css { selector } => write!(f, "css({})", selector),
            Locator::Id { id } => write!(f, "id({})", id),
            Locator::Text { selector, contains } => {
                write!(f, "text({} ~ {:?})", selector, contains)
            }
        }
    }
}

/// Ordered fallback list of locators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocatorChain(pub Vec<Locator>);

impl LocatorChain {
    pub fn new(locators: Vec<Locator>) -> Self {
        Self(locators)
    }

    /// Try each locator in order; the first match wins.
    ///
    /// Non-fatal errors from one strategy fall through to the next. Fatal
    /// session errors are returned immediately.
    pub async fn first_match(
        &self,
        session: &mut dyn BrowserSession,
    ) -> Result<Option<ElementHandle>, SessionError> {
        for locator in &self.0 {
            match locator.find(session).await {
                Ok(Some(handle)) => {
                    debug!("Matched {} -> {}[{}]", locator, handle.selector, handle.index);
                    return Ok(Some(handle));
                }
                Ok(None) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => debug!("Locator {} failed: {}", locator, e),
            }
        }
        Ok(None)
    }
}

impl From<Vec<Locator>> for LocatorChain {
    fn from(locators: Vec<Locator>) -> Self {
        Self(locators)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::browser::testing::FakeSession;

    #[tokio::test]
    async fn first_matching_strategy_wins() {
        let mut session = FakeSession::new()
            .with_elements("button[aria-label='Export']", &[])
            .with_elements("[id=\"salEqsvFinancialsPopoverExport\"]", &["Export"])
            .with_elements("button", &["Share", "Export data"]);

        let chain = LocatorChain::new(vec![
            Locator::css("button[aria-label='Export']"),
            Locator::id("salEqsvFinancialsPopoverExport"),
            Locator::text("button", "Export"),
        ]);

        let found = chain.first_match(&mut session).await.unwrap();
        assert_eq!(
            found,
            Some(ElementHandle::new("[id=\"salEqsvFinancialsPopoverExport\"]", 0))
        );
    }

    #[tokio::test]
    async fn text_strategy_picks_matching_element() {
        let mut session = FakeSession::new().with_elements("button", &["Annual", "Quarterly"]);
        let found = Locator::text("button", "Quarter")
            .find(&mut session)
            .await
            .unwrap();
        assert_eq!(found, Some(ElementHandle::new("button", 1)));
    }

    #[tokio::test]
    async fn empty_chain_matches_nothing() {
        let mut session = FakeSession::new().with_elements("button", &["Submit"]);
        let found = LocatorChain::default()
            .first_match(&mut session)
            .await
            .unwrap();
        assert_eq!(found, None);
    }

    #[test]
    fn deserializes_tagged_locators() {
        let chain: LocatorChain = serde_json::from_str(
            r##"[{"by": "id", "id": "ecSubmitButton"}, {"by": "css", "selector": "#submit"}]"##,
        )
        .unwrap();
        assert_eq!(
            chain,
            LocatorChain::new(vec![Locator::id("ecSubmitButton"), Locator::css("#submit")])
        );
    }
}
