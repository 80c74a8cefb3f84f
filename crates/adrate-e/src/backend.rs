use crate::ads::{detection_script, parse_ad_report};
use crate::webdriver::{WebDriverClient, WebDriverSettings};
use adrate_engine::ads::AdReport;
use adrate_engine::backend::{Backend, BackendError, NavigationResult, ScrollDirection};
use adrate_engine::config::BrowserConfig;
use async_trait::async_trait;
use fantoccini::Locator;
use fantoccini::error::CmdError;
use serde_json::{Value, json};
use tracing::{debug, info};

const CLICK_SCRIPT: &str = r#"
    const el = document.elementFromPoint(arguments[0], arguments[1]);
    if (!el) { return false; }
    el.click();
    return true;
"#;

const SCROLL_SCRIPT: &str = "window.scrollBy(0, arguments[0]);";

/// Chrome driven through an already running WebDriver server.
pub struct WebDriverBackend {
    client: Option<WebDriverClient>,
    settings: WebDriverSettings,
}

impl WebDriverBackend {
    pub fn new(settings: WebDriverSettings) -> Self {
        Self {
            client: None,
            settings,
        }
    }

    pub fn from_config(config: &BrowserConfig) -> Self {
        Self::new(WebDriverSettings::from_config(config))
    }

    pub fn settings(&self) -> &WebDriverSettings {
        &self.settings
    }

    fn client(&self) -> Result<&WebDriverClient, BackendError> {
        self.client.as_ref().ok_or(BackendError::NotReady)
    }

    async fn run(&self, script: &str, args: Vec<Value>) -> Result<Value, BackendError> {
        self.client()?
            .client
            .execute(script, args)
            .await
            .map_err(|e| match e {
                CmdError::Lost(_) => BackendError::ConnectionLost,
                other => BackendError::Script(other.to_string()),
            })
    }

    async fn get_navigation_result(
        client: &WebDriverClient,
    ) -> Result<NavigationResult, BackendError> {
        let title = client.client.title().await.unwrap_or_default();
        let url = client
            .client
            .current_url()
            .await
            .map(|u| u.to_string())
            .unwrap_or_default();

        Ok(NavigationResult { url, title })
    }
}

#[async_trait]
impl Backend for WebDriverBackend {
    async fn launch(&mut self) -> Result<(), BackendError> {
        info!("Connecting to WebDriver at {}...", self.settings.driver_url);
        let client =
            WebDriverClient::connect(&self.settings.driver_url, self.settings.capabilities())
                .await
                .map_err(|e| BackendError::Other(e.to_string()))?;
        self.client = Some(client);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        if let Some(client) = self.client.take() {
            client
                .close()
                .await
                .map_err(|e| BackendError::Other(e.to_string()))?;
        }
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        self.client.is_some()
    }

    async fn navigate(&mut self, url: &str) -> Result<NavigationResult, BackendError> {
        let client = self.client()?;

        debug!("Navigating to: {}", url);
        client
            .client
            .goto(url)
            .await
            .map_err(|e| BackendError::Navigation(e.to_string()))?;

        Self::get_navigation_result(client).await
    }

    async fn click(&mut self, x: i64, y: i64) -> Result<(), BackendError> {
        let clicked = self.run(CLICK_SCRIPT, vec![json!(x), json!(y)]).await?;
        if clicked.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(BackendError::NoElementAt { x, y })
        }
    }

    async fn scroll(
        &mut self,
        direction: ScrollDirection,
        amount: u32,
    ) -> Result<(), BackendError> {
        self.run(SCROLL_SCRIPT, vec![json!(direction.delta(amount))]).await?;
        Ok(())
    }

    async fn detect_ads(&mut self) -> Result<AdReport, BackendError> {
        let result = self
            .run(&detection_script(), vec![])
            .await
            .map_err(|e| match e {
                BackendError::Script(message) => BackendError::AdDetection(message),
                other => other,
            })?;
        parse_ad_report(result)
    }

    async fn page_text(&mut self) -> Result<String, BackendError> {
        let client = self.client()?;
        let body = client
            .client
            .find(Locator::Css("body"))
            .await
            .map_err(|e| BackendError::Other(format!("Body not found: {}", e)))?;
        body.text()
            .await
            .map_err(|e| BackendError::Other(format!("Get text failed: {}", e)))
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, BackendError> {
        let client = self.client()?;
        let bytes = client
            .client
            .screenshot()
            .await
            .map_err(|e| BackendError::Other(format!("Screenshot failed: {}", e)))?;
        Ok(bytes)
    }

    async fn execute_script(&mut self, script: &str) -> Result<Value, BackendError> {
        self.run(script, vec![]).await
    }
}
