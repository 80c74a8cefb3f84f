use adrate_e::WebDriverBackend;
use adrate_engine::agent::{AgentError, WebAgent};
use adrate_engine::backend::ScrollDirection;
use adrate_engine::cli::{self, OutputHandlers, ReplOptions, TRAIN_HELP};
use adrate_engine::config::{AdrateConfig, ConfigLoader};
use adrate_engine::learner::storage;
use adrate_engine::model::{ModelError, RatingModel};
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "adrate",
    version,
    about = "Record browsing sessions and predict ad experience ratings"
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// WebDriver server URL (overrides the config file)
    #[arg(long, global = true)]
    driver_url: Option<String>,

    /// Config file (defaults to ./adrate.yaml, then ~/.adrate/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Chrome user data directory to run with
    #[arg(long, global = true)]
    profile: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive training: browse, rate sequences, then fit the model
    Train {
        #[arg(long)]
        url: String,
    },
    /// Open a page and predict its rating with the saved model
    Predict {
        #[arg(long)]
        url: String,

        /// Scroll before predicting (up or down)
        #[arg(long)]
        scroll: Option<ScrollDirection>,

        #[arg(long, default_value_t = cli::DEFAULT_SCROLL_AMOUNT)]
        scroll_amount: u32,

        /// Click at X,Y before predicting
        #[arg(long)]
        click: Option<String>,
    },
    /// Fit the model offline from saved training data files
    Fit {
        #[arg(long, num_args = 1.., required = true)]
        corpus: Vec<PathBuf>,
    },
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // stdout carries prompts and prediction output
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn load_config(args: &Args) -> Result<AdrateConfig> {
    let mut config = match &args.config {
        Some(path) => ConfigLoader::load_from(path)
            .await
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ConfigLoader::load_default().await?,
    };
    if let Some(url) = &args.driver_url {
        config.browser.driver_url = url.clone();
    }
    if let Some(profile) = &args.profile {
        config.browser.user_data_dir = Some(profile.clone());
    }
    Ok(config)
}

async fn launch_agent(config: AdrateConfig) -> Result<WebAgent<WebDriverBackend>> {
    let backend = WebDriverBackend::from_config(&config.browser);
    let mut agent = WebAgent::new(backend, config);
    agent
        .launch()
        .await
        .context("failed to launch browser backend")?;
    Ok(agent)
}

async fn train(config: AdrateConfig, url: &str) -> Result<()> {
    let mut agent = launch_agent(config).await?;
    match agent.load_model() {
        Ok(()) => info!("Continuing from the saved model"),
        Err(AgentError::Model(ModelError::Persistence(e))) if e.is_not_found() => {
            info!("No saved model; training from scratch");
        }
        Err(e) => warn!("Could not load saved model: {}", e),
    }

    let output = OutputHandlers {
        out: |msg| println!("{}", msg),
        err: |msg| eprintln!("{}", msg),
    };
    let options = ReplOptions {
        banner_lines: TRAIN_HELP,
        prompt: "rate> ",
        handle_ctrl_c: true,
        ctrl_c_message: Some("Interrupted; finishing session"),
    };

    let result = cli::run_training_repl(&mut agent, url, output, options).await;
    agent.close().await?;

    let summary = result.map_err(|e| anyhow::anyhow!("training session failed: {e}"))?;
    info!("Session finished with {} rated sequences", summary.committed);
    Ok(())
}

async fn predict(
    config: AdrateConfig,
    url: &str,
    scroll: Option<ScrollDirection>,
    scroll_amount: u32,
    click: Option<&str>,
) -> Result<()> {
    let point = match click {
        Some(raw) => match cli::parse_point(raw) {
            Some(point) => Some(point),
            None => bail!("invalid click point {raw:?}, expected X,Y"),
        },
        None => None,
    };

    let mut agent = launch_agent(config).await?;
    agent.load_model().context("no trained model available")?;

    let result = async {
        agent.navigate(url).await?;
        if let Some(direction) = scroll {
            agent.scroll(direction, scroll_amount).await?;
        }
        if let Some((x, y)) = point {
            agent.click(x, y).await?;
        }
        agent.predict_page().await
    }
    .await;
    agent.close().await?;

    let page = result?;
    let body = json!({
        "prediction": page.prediction,
        "ad_data": {
            "count": page.ads.count(),
            "ads": page.ads.ads,
        }
    });
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

async fn fit(config: AdrateConfig, corpora: &[PathBuf]) -> Result<()> {
    let mut examples = Vec::new();
    for path in corpora {
        let loaded = storage::read_corpus(path)
            .with_context(|| format!("reading training data {}", path.display()))?;
        info!("Loaded {} sequences from {}", loaded.len(), path.display());
        examples.extend(loaded.iter().map(|e| (e.features(), e.rating())));
    }
    if examples.is_empty() {
        println!("No rated sequences found; nothing to train");
        return Ok(());
    }

    let model_dir = config.storage.model_dir.clone();
    let model = RatingModel::new(config.training);
    if model.config().warm_start {
        if let Err(e) = model.load(&model_dir) {
            info!("Starting from fresh weights: {}", e);
        }
    }

    let summary = tokio::task::spawn_blocking(move || {
        let summary = model.fit(&examples)?;
        model.save(&model_dir)?;
        Ok::<_, anyhow::Error>(summary)
    })
    .await??;

    if let Some(last) = summary.final_metrics() {
        println!(
            "Trained on {} sequences (loss {:.4}, accuracy {:.2})",
            summary.train_examples, last.loss, last.accuracy
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = load_config(&args).await?;

    match &args.command {
        Command::Train { url } => train(config, url).await,
        Command::Predict {
            url,
            scroll,
            scroll_amount,
            click,
        } => predict(config, url, *scroll, *scroll_amount, click.as_deref()).await,
        Command::Fit { corpus } => fit(config, corpus).await,
    }
}
