//! Browser abstraction for portal automation.
//!
//! Defines the `BrowserLauncher` and `BrowserSession` traits that abstract over
//! the browser engine (currently Chromium via chromiumoxide). The retrieval
//! protocol only talks to these traits, so it can run against a scripted fake.

pub mod chromium;

use anyhow::Result;
use async_trait::async_trait;

/// How to find an element in the current window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Id(String),
    XPath(String),
    ClassName(String),
    Css(String),
}

impl Locator {
    /// A JavaScript expression that evaluates to the first matching element or `null`.
    pub fn to_js(&self) -> String {
        match self {
            Locator::Id(id) => format!("document.getElementById({})", js_string(id)),
            Locator::XPath(xpath) => format!(
                "document.evaluate({}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue",
                js_string(xpath)
            ),
            Locator::ClassName(class) => format!(
                "document.getElementsByClassName({}).item(0)",
                js_string(class)
            ),
            Locator::Css(css) => format!("document.querySelector({})", js_string(css)),
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locator::Id(id) => write!(f, "#{id}"),
            Locator::XPath(xpath) => write!(f, "xpath:{xpath}"),
            Locator::ClassName(class) => write!(f, ".{class}"),
            Locator::Css(css) => write!(f, "css:{css}"),
        }
    }
}

/// Quote a value as a JavaScript string literal.
pub fn js_string(value: &str) -> String {
    // JSON string syntax is a subset of JS string syntax.
    serde_json::Value::String(value.to_string()).to_string()
}

/// Starts isolated browser sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Launch a fresh session. The caller owns it and must call `quit`.
    async fn launch(&self) -> Result<Box<dyn BrowserSession>>;
}

/// One exclusively owned browser process with a current window.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Load a URL in the current window.
    async fn navigate(&mut self, url: &str) -> Result<()>;
    /// Whether the element exists in the current window.
    async fn is_present(&self, locator: &Locator) -> Result<bool>;
    /// Whether the element exists, is rendered and is not disabled.
    async fn is_clickable(&self, locator: &Locator) -> Result<bool>;
    /// Assign the `value` property of an input element.
    async fn set_value(&self, locator: &Locator, value: &str) -> Result<()>;
    /// Click an element through the DOM.
    async fn click(&self, locator: &Locator) -> Result<()>;
    /// Visible text of an element, `None` when it is missing.
    async fn text(&self, locator: &Locator) -> Result<Option<String>>;
    /// Handle of the current window.
    async fn current_window(&self) -> Result<String>;
    /// Handles of all open windows.
    async fn window_handles(&self) -> Result<Vec<String>>;
    /// Make another window the current one.
    async fn switch_to_window(&mut self, handle: &str) -> Result<()>;
    /// Terminate the browser and release everything the session holds.
    async fn quit(self: Box<Self>) -> Result<()>;
}

/// A launcher used when no browser binary is available.
///
/// Every launch fails, so live retrieval reports the environment as
/// unavailable while cached rates keep being served.
pub struct NoopLauncher;

#[async_trait]
impl BrowserLauncher for NoopLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        Err(anyhow::anyhow!("Browser not available"))
    }
}
