//! DIAN portal retrieval — a linear state machine over a browser session.
//!
//! The portal has no machine-readable API. One resolution walks these stages:
//!
//! 1. `Launch` — start an isolated headless browser.
//! 2. `NavigateToPortal` — load the lookup page and wait for the code input.
//! 3. `SubmitCode` — fill in the code and press search.
//! 4. `OpenDutyDetail` — click the duty link and wait for the detail window.
//! 5. `SwitchContext` — focus the new window.
//! 6. `ExtractValue` — read and parse the duty percentage.
//!
//! Every wait is polled against a deadline. Teardown runs exactly once for
//! every acquired session, whichever stage ends the run.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::time::Instant;

use crate::browser::{BrowserLauncher, BrowserSession, Locator};
use crate::config::PortalConfig;
use crate::types::{ClassificationCode, PortalRates};

/// Stages of the retrieval protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalStage {
    Launch,
    NavigateToPortal,
    SubmitCode,
    OpenDutyDetail,
    SwitchContext,
    ExtractValue,
}

impl fmt::Display for RetrievalStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RetrievalStage::Launch => "launch",
            RetrievalStage::NavigateToPortal => "navigate_to_portal",
            RetrievalStage::SubmitCode => "submit_code",
            RetrievalStage::OpenDutyDetail => "open_duty_detail",
            RetrievalStage::SwitchContext => "switch_context",
            RetrievalStage::ExtractValue => "extract_value",
        };
        f.write_str(name)
    }
}

/// Why a live retrieval failed.
#[derive(thiserror::Error, Debug)]
pub enum RetrievalError {
    #[error("Browser environment unavailable: {0}")]
    EnvironmentUnavailable(String),

    #[error("Portal unreachable: {0}")]
    PortalUnreachable(String),

    #[error("Portal page did not load within {0:?}")]
    PageLoadTimeout(Duration),

    #[error("Timed out in {stage} waiting for {element}")]
    ElementTimeout {
        stage: RetrievalStage,
        element: String,
    },

    #[error("Duty detail window did not open within {0:?}")]
    SecondaryWindowNotOpened(Duration),

    #[error("Unparseable rate: {0:?}")]
    UnparseableRate(String),

    #[error("Browser fault in {stage}: {message}")]
    Driver {
        stage: RetrievalStage,
        message: String,
    },

    #[error("Internal fault: {0}")]
    Internal(String),
}

impl RetrievalError {
    /// Stage at which the run stopped, when it is known.
    pub fn stage(&self) -> Option<RetrievalStage> {
        match self {
            RetrievalError::EnvironmentUnavailable(_) => Some(RetrievalStage::Launch),
            RetrievalError::PortalUnreachable(_) | RetrievalError::PageLoadTimeout(_) => {
                Some(RetrievalStage::NavigateToPortal)
            }
            RetrievalError::SecondaryWindowNotOpened(_) => Some(RetrievalStage::OpenDutyDetail),
            RetrievalError::UnparseableRate(_) => Some(RetrievalStage::ExtractValue),
            RetrievalError::ElementTimeout { stage, .. } | RetrievalError::Driver { stage, .. } => {
                Some(*stage)
            }
            RetrievalError::Internal(_) => None,
        }
    }

    /// Whether the failure comes from the portal or the host environment rather
    /// than from a fault in this process.
    pub fn is_source_unavailable(&self) -> bool {
        !matches!(
            self,
            RetrievalError::Driver { .. } | RetrievalError::Internal(_)
        )
    }
}

/// Anything that can resolve a code to live rates.
#[async_trait]
pub trait RateRetriever: Send + Sync {
    async fn retrieve(&self, code: &ClassificationCode) -> Result<PortalRates, RetrievalError>;
}

/// Parse the portal's rate text: `"15,5 %"` → `15.5`.
pub fn parse_rate(text: &str) -> Result<f64, RetrievalError> {
    let cleaned = text.replace('%', "").replace(',', ".");
    match cleaned.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(value),
        _ => Err(RetrievalError::UnparseableRate(text.to_string())),
    }
}

/// What a bounded wait is waiting for.
enum Condition<'a> {
    Present(&'a Locator),
    Clickable(&'a Locator),
    /// A window whose handle is not among those already open.
    NewWindow(&'a [String]),
}

/// A wait that reached its deadline.
struct WaitExpired {
    /// Error from the last check, when the check itself kept failing.
    last_error: Option<String>,
}

/// Retrieval client driving the DIAN portal through a browser.
#[derive(Clone)]
pub struct PortalClient {
    launcher: Arc<dyn BrowserLauncher>,
    config: PortalConfig,
}

impl PortalClient {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, config: PortalConfig) -> Self {
        Self { launcher, config }
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    async fn check(session: &dyn BrowserSession, condition: &Condition<'_>) -> anyhow::Result<bool> {
        match condition {
            Condition::Present(locator) => session.is_present(locator).await,
            Condition::Clickable(locator) => session.is_clickable(locator).await,
            Condition::NewWindow(known) => Ok(session
                .window_handles()
                .await?
                .iter()
                .any(|handle| !known.contains(handle))),
        }
    }

    /// Poll `condition` until it holds or `deadline` passes.
    async fn wait_until(
        &self,
        session: &dyn BrowserSession,
        condition: Condition<'_>,
        deadline: Instant,
    ) -> Result<(), WaitExpired> {
        let mut last_error = None;
        loop {
            match tokio::time::timeout_at(deadline, Self::check(session, &condition)).await {
                Ok(Ok(true)) => return Ok(()),
                Ok(Ok(false)) => last_error = None,
                Ok(Err(e)) => last_error = Some(format!("{e:#}")),
                Err(_) => return Err(WaitExpired { last_error }),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(WaitExpired { last_error });
            }
            tokio::time::sleep((deadline - now).min(self.config.timeouts.poll_interval)).await;
        }
    }

    /// Turn an expired wait into an error: a driver fault when every check
    /// failed, the stage's timeout otherwise.
    fn expired(stage: RetrievalStage, expired: WaitExpired, timeout: RetrievalError) -> RetrievalError {
        match expired.last_error {
            Some(message) => RetrievalError::Driver { stage, message },
            None => timeout,
        }
    }

    fn driver(stage: RetrievalStage) -> impl FnOnce(anyhow::Error) -> RetrievalError {
        move |e| RetrievalError::Driver {
            stage,
            message: format!("{e:#}"),
        }
    }

    /// Stages 2–6 against an already launched session.
    async fn run_stages(
        &self,
        session: &mut dyn BrowserSession,
        code: &ClassificationCode,
    ) -> Result<PortalRates, RetrievalError> {
        let timeouts = &self.config.timeouts;
        let selectors = &self.config.selectors;

        // NavigateToPortal
        let stage = RetrievalStage::NavigateToPortal;
        tracing::debug!("[{code}] {stage}");
        let deadline = Instant::now() + timeouts.page_load;
        match tokio::time::timeout_at(deadline, session.navigate(&self.config.url)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(RetrievalError::PortalUnreachable(format!("{e:#}"))),
            Err(_) => return Err(RetrievalError::PageLoadTimeout(timeouts.page_load)),
        }
        self.wait_until(&*session, Condition::Present(&selectors.code_input), deadline)
            .await
            .map_err(|w| Self::expired(stage, w, RetrievalError::PageLoadTimeout(timeouts.page_load)))?;

        // SubmitCode
        let stage = RetrievalStage::SubmitCode;
        tracing::debug!("[{code}] {stage}");
        session
            .set_value(&selectors.code_input, code.as_str())
            .await
            .map_err(Self::driver(stage))?;
        let deadline = Instant::now() + timeouts.element;
        self.wait_until(&*session, Condition::Clickable(&selectors.search_button), deadline)
            .await
            .map_err(|w| {
                Self::expired(
                    stage,
                    w,
                    RetrievalError::ElementTimeout {
                        stage,
                        element: selectors.search_button.to_string(),
                    },
                )
            })?;
        session
            .click(&selectors.search_button)
            .await
            .map_err(Self::driver(stage))?;

        // OpenDutyDetail
        let stage = RetrievalStage::OpenDutyDetail;
        tracing::debug!("[{code}] {stage}");
        let deadline = Instant::now() + timeouts.element;
        self.wait_until(&*session, Condition::Clickable(&selectors.duty_link), deadline)
            .await
            .map_err(|w| {
                Self::expired(
                    stage,
                    w,
                    RetrievalError::ElementTimeout {
                        stage,
                        element: selectors.duty_link.to_string(),
                    },
                )
            })?;
        // The browser may hold windows of its own besides the portal page.
        let known = session.window_handles().await.map_err(Self::driver(stage))?;
        session
            .click(&selectors.duty_link)
            .await
            .map_err(Self::driver(stage))?;
        let deadline = Instant::now() + timeouts.window;
        self.wait_until(&*session, Condition::NewWindow(&known), deadline)
            .await
            .map_err(|w| {
                Self::expired(stage, w, RetrievalError::SecondaryWindowNotOpened(timeouts.window))
            })?;

        // SwitchContext
        let stage = RetrievalStage::SwitchContext;
        tracing::debug!("[{code}] {stage}");
        let origin = session.current_window().await.map_err(Self::driver(stage))?;
        let handles = session.window_handles().await.map_err(Self::driver(stage))?;
        let detail = handles
            .into_iter()
            .find(|handle| !known.contains(handle))
            .ok_or_else(|| RetrievalError::Driver {
                stage,
                message: "detail window closed before focus".into(),
            })?;
        tracing::debug!("[{code}] focus {origin} -> {detail}");
        session
            .switch_to_window(&detail)
            .await
            .map_err(Self::driver(stage))?;

        // ExtractValue
        let stage = RetrievalStage::ExtractValue;
        tracing::debug!("[{code}] {stage}");
        let deadline = Instant::now() + timeouts.value;
        self.wait_until(&*session, Condition::Present(&selectors.rate_value), deadline)
            .await
            .map_err(|w| {
                Self::expired(
                    stage,
                    w,
                    RetrievalError::ElementTimeout {
                        stage,
                        element: selectors.rate_value.to_string(),
                    },
                )
            })?;
        let text = session
            .text(&selectors.rate_value)
            .await
            .map_err(Self::driver(stage))?
            .ok_or_else(|| RetrievalError::Driver {
                stage,
                message: format!("{} disappeared before it was read", selectors.rate_value),
            })?;

        Ok(PortalRates {
            duty_rate: parse_rate(&text)?,
            vat_rate: self.config.policy.vat_rate,
        })
    }

    /// Launch, walk the stages and tear down.
    async fn run_session(&self, code: &ClassificationCode) -> Result<PortalRates, RetrievalError> {
        let started = std::time::Instant::now();
        tracing::debug!("[{code}] {}", RetrievalStage::Launch);

        let mut session = self
            .launcher
            .launch()
            .await
            .map_err(|e| RetrievalError::EnvironmentUnavailable(format!("{e:#}")))
            .inspect_err(|e| tracing::warn!("[{code}] live retrieval failed: {e}"))?;

        let outcome = AssertUnwindSafe(self.run_stages(session.as_mut(), code))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(RetrievalError::Internal(panic_message(&*panic))));

        // Teardown
        if let Err(e) = session.quit().await {
            tracing::debug!("[{code}] browser teardown failed: {e:#}");
        }

        let elapsed_ms = started.elapsed().as_millis();
        match &outcome {
            Ok(rates) => tracing::info!(
                "[{code}] duty rate {}% retrieved from portal in {elapsed_ms}ms",
                rates.duty_rate
            ),
            Err(e) => tracing::warn!(
                "[{code}] live retrieval failed after {elapsed_ms}ms at {}: {e}",
                e.stage().map(|s| s.to_string()).unwrap_or_else(|| "unknown stage".into())
            ),
        }
        outcome
    }
}

#[async_trait]
impl RateRetriever for PortalClient {
    /// The session runs on its own task: a caller that stops waiting does
    /// not stop the session, and teardown still happens.
    async fn retrieve(&self, code: &ClassificationCode) -> Result<PortalRates, RetrievalError> {
        let client = self.clone();
        let code = code.clone();
        match tokio::spawn(async move { client.run_session(&code).await }).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => Err(RetrievalError::Internal(panic_message(&*e.into_panic()))),
            Err(e) => Err(RetrievalError::Internal(e.to_string())),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("panic: {msg}")
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("panic: {msg}")
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PortalSelectors, StepTimeouts};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// How the scripted portal behaves.
    #[derive(Clone)]
    struct Script {
        navigate_fails: bool,
        input_present: bool,
        search_clickable: bool,
        duty_clickable: bool,
        opens_window: bool,
        rate_text: Option<String>,
        panic_on_search: bool,
        quit_fails: bool,
        /// Windows the browser already holds besides the portal page.
        startup_windows: Vec<String>,
    }

    impl Default for Script {
        fn default() -> Self {
            Self {
                navigate_fails: false,
                input_present: true,
                search_clickable: true,
                duty_clickable: true,
                opens_window: true,
                rate_text: Some("15,5 %".into()),
                panic_on_search: false,
                quit_fails: false,
                startup_windows: Vec::new(),
            }
        }
    }

    #[derive(Default)]
    struct Probe {
        launches: AtomicUsize,
        quits: AtomicUsize,
        submitted: Mutex<Vec<String>>,
    }

    struct FakeLauncher {
        script: Script,
        fail_launch: bool,
        probe: Arc<Probe>,
    }

    struct FakeSession {
        script: Script,
        selectors: PortalSelectors,
        probe: Arc<Probe>,
        windows: Mutex<Vec<String>>,
        current: String,
    }

    #[async_trait]
    impl BrowserLauncher for FakeLauncher {
        async fn launch(&self) -> anyhow::Result<Box<dyn BrowserSession>> {
            if self.fail_launch {
                anyhow::bail!("Chromium not found");
            }
            self.probe.launches.fetch_add(1, Ordering::SeqCst);
            let mut windows = self.script.startup_windows.clone();
            windows.push("main".into());
            Ok(Box::new(FakeSession {
                script: self.script.clone(),
                selectors: PortalSelectors::default(),
                probe: Arc::clone(&self.probe),
                windows: Mutex::new(windows),
                current: "main".into(),
            }))
        }
    }

    impl FakeSession {
        fn on_main(&self) -> bool {
            self.current == "main"
        }

        fn on_detail(&self) -> bool {
            self.current == "detail"
        }
    }

    #[async_trait]
    impl BrowserSession for FakeSession {
        async fn navigate(&mut self, _url: &str) -> anyhow::Result<()> {
            if self.script.navigate_fails {
                anyhow::bail!("net::ERR_NAME_NOT_RESOLVED");
            }
            Ok(())
        }

        async fn is_present(&self, locator: &Locator) -> anyhow::Result<bool> {
            let s = &self.selectors;
            Ok(if self.on_main() {
                (*locator == s.code_input && self.script.input_present)
                    || (*locator == s.search_button && self.script.search_clickable)
                    || (*locator == s.duty_link && self.script.duty_clickable)
            } else {
                self.on_detail() && *locator == s.rate_value && self.script.rate_text.is_some()
            })
        }

        async fn is_clickable(&self, locator: &Locator) -> anyhow::Result<bool> {
            self.is_present(locator).await
        }

        async fn set_value(&self, locator: &Locator, value: &str) -> anyhow::Result<()> {
            assert_eq!(*locator, self.selectors.code_input);
            self.probe.submitted.lock().unwrap().push(value.to_string());
            Ok(())
        }

        async fn click(&self, locator: &Locator) -> anyhow::Result<()> {
            if *locator == self.selectors.search_button && self.script.panic_on_search {
                panic!("search handler exploded");
            }
            if *locator == self.selectors.duty_link && self.script.opens_window {
                self.windows.lock().unwrap().push("detail".into());
            }
            Ok(())
        }

        async fn text(&self, locator: &Locator) -> anyhow::Result<Option<String>> {
            if *locator == self.selectors.rate_value && self.on_detail() {
                return Ok(self.script.rate_text.clone());
            }
            Ok(None)
        }

        async fn current_window(&self) -> anyhow::Result<String> {
            Ok(self.current.clone())
        }

        async fn window_handles(&self) -> anyhow::Result<Vec<String>> {
            Ok(self.windows.lock().unwrap().clone())
        }

        async fn switch_to_window(&mut self, handle: &str) -> anyhow::Result<()> {
            self.current = handle.to_string();
            Ok(())
        }

        async fn quit(self: Box<Self>) -> anyhow::Result<()> {
            self.probe.quits.fetch_add(1, Ordering::SeqCst);
            if self.script.quit_fails {
                anyhow::bail!("browser already gone");
            }
            Ok(())
        }
    }

    fn fast_config() -> PortalConfig {
        PortalConfig::default().with_timeouts(StepTimeouts {
            page_load: Duration::from_millis(60),
            element: Duration::from_millis(60),
            window: Duration::from_millis(60),
            value: Duration::from_millis(60),
            poll_interval: Duration::from_millis(5),
        })
    }

    fn client(script: Script) -> (PortalClient, Arc<Probe>) {
        let probe = Arc::new(Probe::default());
        let launcher = FakeLauncher {
            script,
            fail_launch: false,
            probe: Arc::clone(&probe),
        };
        (PortalClient::new(Arc::new(launcher), fast_config()), probe)
    }

    fn code() -> ClassificationCode {
        ClassificationCode::parse("0101210000").unwrap()
    }

    #[tokio::test]
    async fn test_retrieve_success() {
        let (client, probe) = client(Script::default());
        let rates = client.retrieve(&code()).await.unwrap();

        assert_eq!(rates.duty_rate, 15.5);
        assert_eq!(rates.vat_rate, 19.0);
        assert_eq!(probe.launches.load(Ordering::SeqCst), 1);
        assert_eq!(probe.quits.load(Ordering::SeqCst), 1);
        assert_eq!(*probe.submitted.lock().unwrap(), vec!["0101210000".to_string()]);
    }

    #[tokio::test]
    async fn test_detail_window_found_among_existing_windows() {
        let (client, probe) = client(Script {
            startup_windows: vec!["startup".into()],
            ..Script::default()
        });
        let rates = client.retrieve(&code()).await.unwrap();

        assert_eq!(rates.duty_rate, 15.5);
        assert_eq!(probe.quits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_existing_windows_do_not_count_as_detail_window() {
        let (client, probe) = client(Script {
            startup_windows: vec!["startup".into()],
            opens_window: false,
            ..Script::default()
        });
        let err = client.retrieve(&code()).await.unwrap_err();
        assert!(matches!(err, RetrievalError::SecondaryWindowNotOpened(_)));
        assert_eq!(probe.quits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_abandoned_retrieval_still_tears_down() {
        let probe = Arc::new(Probe::default());
        let launcher = FakeLauncher {
            script: Script {
                opens_window: false,
                ..Script::default()
            },
            fail_launch: false,
            probe: Arc::clone(&probe),
        };
        let mut config = fast_config();
        config.timeouts.window = Duration::from_millis(300);
        let client = PortalClient::new(Arc::new(launcher), config);

        let abandoned = tokio::time::timeout(Duration::from_millis(30), client.retrieve(&code())).await;
        assert!(abandoned.is_err());
        assert_eq!(probe.launches.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(probe.quits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_vat_rate_comes_from_policy() {
        let probe = Arc::new(Probe::default());
        let launcher = FakeLauncher {
            script: Script::default(),
            fail_launch: false,
            probe: Arc::clone(&probe),
        };
        let policy = crate::config::RatePolicy {
            vat_rate: 5.0,
            ..Default::default()
        };
        let config = PortalConfig::from_policy(&policy).with_timeouts(fast_config().timeouts);
        let client = PortalClient::new(Arc::new(launcher), config);

        let rates = client.retrieve(&code()).await.unwrap();
        assert_eq!(rates.vat_rate, 5.0);
    }

    #[tokio::test]
    async fn test_launch_failure_is_environment_unavailable() {
        let probe = Arc::new(Probe::default());
        let launcher = FakeLauncher {
            script: Script::default(),
            fail_launch: true,
            probe: Arc::clone(&probe),
        };
        let client = PortalClient::new(Arc::new(launcher), fast_config());

        let err = client.retrieve(&code()).await.unwrap_err();
        assert!(matches!(err, RetrievalError::EnvironmentUnavailable(_)));
        assert_eq!(err.stage(), Some(RetrievalStage::Launch));
        assert_eq!(probe.quits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unreachable_portal() {
        let (client, probe) = client(Script {
            navigate_fails: true,
            ..Script::default()
        });
        let err = client.retrieve(&code()).await.unwrap_err();
        assert!(matches!(err, RetrievalError::PortalUnreachable(_)));
        assert_eq!(probe.quits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_input_is_page_load_timeout() {
        let (client, probe) = client(Script {
            input_present: false,
            ..Script::default()
        });
        let err = client.retrieve(&code()).await.unwrap_err();
        assert!(matches!(err, RetrievalError::PageLoadTimeout(_)));
        assert!(probe.submitted.lock().unwrap().is_empty());
        assert_eq!(probe.quits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_search_button_never_clickable() {
        let (client, probe) = client(Script {
            search_clickable: false,
            ..Script::default()
        });
        let err = client.retrieve(&code()).await.unwrap_err();
        match err {
            RetrievalError::ElementTimeout { stage, element } => {
                assert_eq!(stage, RetrievalStage::SubmitCode);
                assert_eq!(element, "#vistaConsultaGeneral:buscar");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(probe.quits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_duty_link_never_clickable() {
        let (client, probe) = client(Script {
            duty_clickable: false,
            ..Script::default()
        });
        let err = client.retrieve(&code()).await.unwrap_err();
        assert_eq!(err.stage(), Some(RetrievalStage::OpenDutyDetail));
        assert!(matches!(err, RetrievalError::ElementTimeout { .. }));
        assert_eq!(probe.quits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_detail_window_never_opens() {
        let (client, probe) = client(Script {
            opens_window: false,
            ..Script::default()
        });
        let err = client.retrieve(&code()).await.unwrap_err();
        assert!(matches!(err, RetrievalError::SecondaryWindowNotOpened(_)));
        assert_eq!(probe.quits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_rate_value() {
        let (client, probe) = client(Script {
            rate_text: None,
            ..Script::default()
        });
        let err = client.retrieve(&code()).await.unwrap_err();
        assert_eq!(err.stage(), Some(RetrievalStage::ExtractValue));
        assert_eq!(probe.quits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unparseable_rate() {
        let (client, probe) = client(Script {
            rate_text: Some("Exento".into()),
            ..Script::default()
        });
        let err = client.retrieve(&code()).await.unwrap_err();
        assert!(matches!(err, RetrievalError::UnparseableRate(ref t) if t == "Exento"));
        assert!(err.is_source_unavailable());
        assert_eq!(probe.quits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panic_inside_stage_still_tears_down() {
        let (client, probe) = client(Script {
            panic_on_search: true,
            ..Script::default()
        });
        let err = client.retrieve(&code()).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Internal(ref m) if m.contains("exploded")));
        assert!(!err.is_source_unavailable());
        assert_eq!(probe.quits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_teardown_failure_is_swallowed() {
        let (client, probe) = client(Script {
            quit_fails: true,
            ..Script::default()
        });
        let rates = client.retrieve(&code()).await.unwrap();
        assert_eq!(rates.duty_rate, 15.5);
        assert_eq!(probe.quits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_parse_rate_normalizes() {
        assert_eq!(parse_rate("15,5%").unwrap(), 15.5);
        assert_eq!(parse_rate(" 10 % ").unwrap(), 10.0);
        assert_eq!(parse_rate("0").unwrap(), 0.0);
        assert_eq!(parse_rate("5.25").unwrap(), 5.25);
    }

    #[test]
    fn test_parse_rate_rejects_garbage() {
        assert!(parse_rate("").is_err());
        assert!(parse_rate("%").is_err());
        assert!(parse_rate("abc").is_err());
        assert!(parse_rate("-1").is_err());
        assert!(parse_rate("1.234,5").is_err());
        assert!(parse_rate("NaN").is_err());
    }

    #[test]
    fn test_driver_faults_are_not_source_unavailable() {
        let err = RetrievalError::Driver {
            stage: RetrievalStage::SwitchContext,
            message: "target closed".into(),
        };
        assert!(!err.is_source_unavailable());
        assert_eq!(err.stage(), Some(RetrievalStage::SwitchContext));
        assert!(RetrievalError::PageLoadTimeout(Duration::from_secs(30)).is_source_unavailable());
    }
}
