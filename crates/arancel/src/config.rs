//! Policy values and portal settings shared by the resolver and the retrieval client.

use std::time::Duration;

use crate::browser::Locator;

/// Lookup page of the DIAN tariff portal.
pub const DIAN_PORTAL_URL: &str =
    "https://muisca.dian.gov.co/WebArancel/DefConsultaGeneralNomenclaturas.faces";

/// VAT applied to every import. It is a jurisdiction constant, not scraped.
pub const FIXED_VAT_RATE: f64 = 19.0;

/// How long a cached rate stays valid.
pub const DEFAULT_CACHE_TTL_DAYS: i64 = 30;

/// Rate policy applied by the cache and the resolver.
#[derive(Debug, Clone)]
pub struct RatePolicy {
    pub vat_rate: f64,
    pub cache_ttl: chrono::Duration,
}

impl Default for RatePolicy {
    fn default() -> Self {
        Self {
            vat_rate: FIXED_VAT_RATE,
            cache_ttl: chrono::Duration::days(DEFAULT_CACHE_TTL_DAYS),
        }
    }
}

/// Upper bounds for every wait in the retrieval protocol.
#[derive(Debug, Clone)]
pub struct StepTimeouts {
    /// Portal navigation plus the wait for the code input.
    pub page_load: Duration,
    /// Waits for buttons and links to become clickable.
    pub element: Duration,
    /// Wait for the duty detail window to open.
    pub window: Duration,
    /// Wait for the rate value in the detail window.
    pub value: Duration,
    /// Interval between condition checks.
    pub poll_interval: Duration,
}

impl StepTimeouts {
    /// Same bound for every step, with the default poll interval.
    pub fn uniform(timeout: Duration) -> Self {
        Self {
            page_load: timeout,
            element: timeout,
            window: timeout,
            value: timeout,
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl Default for StepTimeouts {
    fn default() -> Self {
        Self::uniform(Duration::from_secs(30))
    }
}

/// Element locators on the portal pages.
#[derive(Debug, Clone)]
pub struct PortalSelectors {
    pub code_input: Locator,
    pub search_button: Locator,
    pub duty_link: Locator,
    pub rate_value: Locator,
}

impl Default for PortalSelectors {
    fn default() -> Self {
        Self {
            code_input: Locator::Id("vistaConsultaGeneral:codigoNomenclatura".into()),
            search_button: Locator::Id("vistaConsultaGeneral:buscar".into()),
            duty_link: Locator::XPath("//a[contains(@id, 'linkGravamen')]".into()),
            rate_value: Locator::ClassName("itxt".into()),
        }
    }
}

/// Everything the retrieval client needs to know about the portal.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub url: String,
    pub selectors: PortalSelectors,
    pub timeouts: StepTimeouts,
    /// Source of the VAT rate reported with every retrieval.
    pub policy: RatePolicy,
}

impl PortalConfig {
    /// Default portal settings reporting rates under `policy`.
    pub fn from_policy(policy: &RatePolicy) -> Self {
        Self {
            url: DIAN_PORTAL_URL.to_string(),
            selectors: PortalSelectors::default(),
            timeouts: StepTimeouts::default(),
            policy: policy.clone(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: StepTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self::from_policy(&RatePolicy::default())
    }
}

/// Launch options for the headless browser.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub window_width: u32,
    pub window_height: u32,
    /// Explicit browser binary. When unset the launcher searches for one.
    pub executable: Option<std::path::PathBuf>,
    /// Timeout for individual DevTools protocol requests.
    pub request_timeout: Duration,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            window_width: 1920,
            window_height: 1080,
            executable: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}
