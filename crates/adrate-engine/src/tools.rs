//! Tool-call surface over a [`WebAgent`].
//!
//! Tools are addressed by name with a JSON argument object and answer with
//! text content. Framing and transport belong to the caller.

use crate::agent::{AgentError, WebAgent};
use crate::backend::Backend;
use crate::config::AdrateConfig;
use crate::model::ModelError;
use adrate_common::Rating;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Agent not initialized")]
    NotInitialized,

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("Rating {0} is outside [0, 1]")]
    RatingOutOfRange(f64),

    #[error("No trained model available")]
    NotTrained,

    #[error(transparent)]
    Agent(#[from] AgentError),
}

impl ToolError {
    pub fn code(&self) -> &'static str {
        match self {
            ToolError::NotInitialized => "NOT_INITIALIZED",
            ToolError::UnknownTool(_) => "UNKNOWN_TOOL",
            ToolError::InvalidArguments { .. } => "INVALID_ARGUMENTS",
            ToolError::RatingOutOfRange(_) => "RATING_OUT_OF_RANGE",
            ToolError::NotTrained => "NOT_TRAINED",
            ToolError::Agent(AgentError::Backend(e)) => e.code(),
            ToolError::Agent(_) => "AGENT_ERROR",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl ToolDefinition {
    fn new(name: &str, description: &str, input_schema: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    Text { text: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub content: Vec<ToolContent>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
        }
    }

    /// All text content joined by newlines.
    pub fn as_text(&self) -> String {
        self.content
            .iter()
            .map(|c| match c {
                ToolContent::Text { text } => text.as_str(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Deserialize)]
struct InitializeArgs {
    #[serde(default)]
    profile_path: Option<PathBuf>,
}

#[derive(Deserialize)]
struct UrlArgs {
    url: String,
}

#[derive(Deserialize)]
struct RatingArgs {
    rating: f64,
}

/// Builds a backend for a freshly initialized agent.
pub type BackendFactory<B> = Box<dyn Fn(&AdrateConfig) -> B + Send + Sync>;

pub struct ToolServer<B: Backend> {
    config: AdrateConfig,
    factory: BackendFactory<B>,
    agent: Option<WebAgent<B>>,
}

impl<B: Backend> ToolServer<B> {
    pub fn new(config: AdrateConfig, factory: BackendFactory<B>) -> Self {
        Self {
            config,
            factory,
            agent: None,
        }
    }

    pub fn agent(&self) -> Option<&WebAgent<B>> {
        self.agent.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.agent.is_some()
    }

    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new(
                "initialize",
                "Initialize the web agent, optionally with a Chrome profile directory",
                json!({
                    "type": "object",
                    "properties": {
                        "profile_path": {
                            "type": "string",
                            "description": "Path to Chrome user profile directory"
                        }
                    }
                }),
            ),
            ToolDefinition::new(
                "start_training",
                "Start a training sequence on a URL",
                json!({
                    "type": "object",
                    "properties": {
                        "url": { "type": "string", "description": "URL to navigate to" }
                    },
                    "required": ["url"]
                }),
            ),
            ToolDefinition::new(
                "rate_sequence",
                "Rate the current interaction sequence and start the next one",
                json!({
                    "type": "object",
                    "properties": {
                        "rating": {
                            "type": "number",
                            "description": "Rating value between 0 and 1",
                            "minimum": Rating::MIN,
                            "maximum": Rating::MAX
                        }
                    },
                    "required": ["rating"]
                }),
            ),
            ToolDefinition::new(
                "predict_rating",
                "Predict the rating for a page",
                json!({
                    "type": "object",
                    "properties": {
                        "url": { "type": "string", "description": "URL to analyze" }
                    },
                    "required": ["url"]
                }),
            ),
            ToolDefinition::new(
                "close",
                "Close the web agent",
                json!({ "type": "object", "properties": {} }),
            ),
        ]
    }

    pub async fn call(&mut self, name: &str, args: Value) -> Result<ToolOutput, ToolError> {
        debug!("Tool call {} with {}", name, args);
        match name {
            "initialize" | "initialize_agent" => {
                let args: InitializeArgs = parse_args(name, args)?;
                self.initialize(args.profile_path).await
            }
            "start_training" => {
                let args: UrlArgs = parse_args(name, args)?;
                self.start_training(&args.url).await
            }
            "rate_sequence" => {
                let args: RatingArgs = parse_args(name, args)?;
                self.rate_sequence(args.rating).await
            }
            "predict_rating" => {
                let args: UrlArgs = parse_args(name, args)?;
                self.predict_rating(&args.url).await
            }
            "close" | "close_agent" => self.close().await,
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }

    fn agent_mut(&mut self) -> Result<&mut WebAgent<B>, ToolError> {
        self.agent.as_mut().ok_or(ToolError::NotInitialized)
    }

    async fn initialize(&mut self, profile_path: Option<PathBuf>) -> Result<ToolOutput, ToolError> {
        if let Some(mut previous) = self.agent.take() {
            info!("Replacing running agent");
            if let Err(e) = previous.close().await {
                warn!("Failed to close previous agent: {}", e);
            }
        }

        let mut config = self.config.clone();
        let with_profile = profile_path.is_some();
        if profile_path.is_some() {
            config.browser.user_data_dir = profile_path;
        }

        let backend = (self.factory)(&config);
        let mut agent = WebAgent::new(backend, config);
        agent.launch().await?;

        match agent.load_model() {
            Ok(()) => info!("Loaded saved rating model"),
            Err(AgentError::Model(ModelError::Persistence(e))) if e.is_not_found() => {
                debug!("No saved rating model");
            }
            Err(e) => warn!("Saved rating model not loaded: {}", e),
        }
        self.agent = Some(agent);

        Ok(ToolOutput::text(if with_profile {
            "Agent initialized successfully with custom Chrome profile"
        } else {
            "Agent initialized successfully"
        }))
    }

    /// Opens a sequence unless one is already open, then navigates.
    async fn start_training(&mut self, url: &str) -> Result<ToolOutput, ToolError> {
        let url = validate_url("start_training", url)?;
        let agent = self.agent_mut()?;
        if !agent.session().is_recording() {
            agent.start_training_sequence()?;
        }
        agent.navigate(url.as_str()).await?;
        Ok(ToolOutput::text("Training sequence started"))
    }

    async fn rate_sequence(&mut self, rating: f64) -> Result<ToolOutput, ToolError> {
        if Rating::new(rating).is_err() {
            return Err(ToolError::RatingOutOfRange(rating));
        }
        let agent = self.agent_mut()?;
        agent.next_training_sequence(Some(rating)).await?;
        Ok(ToolOutput::text(format!("Sequence rated: {rating}")))
    }

    async fn predict_rating(&mut self, url: &str) -> Result<ToolOutput, ToolError> {
        let url = validate_url("predict_rating", url)?;
        let agent = self.agent_mut()?;
        agent.navigate(url.as_str()).await?;

        let page = agent.predict_page().await.map_err(|e| {
            if e.is_not_fitted() {
                ToolError::NotTrained
            } else {
                ToolError::Agent(e)
            }
        })?;

        let body = json!({
            "prediction": page.prediction,
            "ad_data": {
                "count": page.ads.count(),
                "ads": page.ads.ads,
            }
        });
        let text = serde_json::to_string_pretty(&body)
            .map_err(|e| ToolError::Agent(AgentError::Backend(e.into())))?;
        Ok(ToolOutput::text(text))
    }

    /// Saves a non-empty corpus, then closes the agent. The agent is closed
    /// even when the save fails, and the save error is returned.
    async fn close(&mut self) -> Result<ToolOutput, ToolError> {
        let Some(mut agent) = self.agent.take() else {
            return Ok(ToolOutput::text("Agent was not initialized"));
        };

        let saved = if agent.session().corpus().is_empty() {
            Ok(None)
        } else {
            agent.save_training_data().map(Some)
        };
        let closed = agent.close().await;

        match saved {
            Ok(Some(path)) => info!("Saved training data to {}", path.display()),
            Ok(None) => {}
            Err(e) => {
                if let Err(close_err) = &closed {
                    warn!("Failed to close agent: {}", close_err);
                }
                return Err(e.into());
            }
        }
        closed?;
        Ok(ToolOutput::text("Agent closed successfully"))
    }
}

fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, ToolError> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments {
        tool: tool.to_string(),
        message: e.to_string(),
    })
}

fn validate_url(tool: &str, raw: &str) -> Result<Url, ToolError> {
    Url::parse(raw).map_err(|e| ToolError::InvalidArguments {
        tool: tool.to_string(),
        message: format!("invalid url '{raw}': {e}"),
    })
}
