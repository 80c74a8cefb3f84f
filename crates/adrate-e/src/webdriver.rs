use adrate_engine::config::BrowserConfig;
use fantoccini::{Client, ClientBuilder};
use serde_json::{Map, Value, json};

/// How to reach the WebDriver server and which Chrome profile to open.
#[derive(Debug, Clone)]
pub struct WebDriverSettings {
    pub driver_url: String,
    pub user_data_dir: Option<String>,
    pub profile_directory: String,
    pub headless: bool,
}

impl WebDriverSettings {
    pub fn from_config(config: &BrowserConfig) -> Self {
        Self {
            driver_url: config.driver_url.clone(),
            user_data_dir: config
                .user_data_dir
                .as_ref()
                .map(|p| p.display().to_string()),
            profile_directory: config.profile_directory.clone(),
            headless: config.headless,
        }
    }

    /// W3C capabilities for a Chrome session.
    pub fn capabilities(&self) -> Map<String, Value> {
        let mut args = vec![
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
        ];
        if let Some(dir) = &self.user_data_dir {
            args.push(format!("--user-data-dir={dir}"));
            args.push(format!("--profile-directory={}", self.profile_directory));
        }
        if self.headless {
            args.push("--headless=new".to_string());
        }

        let mut caps = Map::new();
        caps.insert("browserName".into(), json!("chrome"));
        caps.insert("goog:chromeOptions".into(), json!({ "args": args }));
        caps
    }
}

pub struct WebDriverClient {
    pub client: Client,
}

impl WebDriverClient {
    pub async fn connect(
        url: &str,
        capabilities: Map<String, Value>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let client = ClientBuilder::native()
            .capabilities(capabilities)
            .connect(url)
            .await
            .map_err(|e| format!("Failed to connect to WebDriver at {}: {}", url, e))?;

        Ok(Self { client })
    }

    pub async fn close(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.client
            .close()
            .await
            .map_err(|e| format!("Failed to close session: {}", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_profile_args() {
        let config = BrowserConfig {
            user_data_dir: Some(PathBuf::from("/home/me/chrome")),
            ..BrowserConfig::default()
        };
        let caps = WebDriverSettings::from_config(&config).capabilities();
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();

        assert!(args.contains(&json!("--no-sandbox")));
        assert!(args.contains(&json!("--user-data-dir=/home/me/chrome")));
        assert!(args.contains(&json!("--profile-directory=Default")));
        assert!(!args.contains(&json!("--headless=new")));
    }

    #[test]
    fn test_headless_without_profile() {
        let config = BrowserConfig {
            headless: true,
            ..BrowserConfig::default()
        };
        let caps = WebDriverSettings::from_config(&config).capabilities();
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();

        assert!(args.contains(&json!("--headless=new")));
        assert!(
            !args
                .iter()
                .any(|a| a.as_str().unwrap().starts_with("--profile-directory"))
        );
    }
}
