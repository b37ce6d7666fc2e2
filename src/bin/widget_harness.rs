//! Widget harness - drive a widget against an in-process host
//!
//! Plays the host page over a memory channel: answers `happenow:ready` with
//! the configured credential and logs resize requests. Useful for checking a
//! credential or an API endpoint without a browser.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use happenow_widget::channel::{READY, RESIZE};
use happenow_widget::{
    memory_channel, CreatePostOptions, HostMessage, Init, Listener, MemoryHost, MockConfig,
    SessionContext, Widget, WidgetConfig, WidgetMode,
};

/// Drive a HappeNow widget from the command line
#[derive(Parser, Debug, Clone)]
#[command(name = "widget-harness")]
#[command(about = "Run a HappeNow widget against an in-process host")]
struct Args {
    /// Credential the simulated host hands to the widget
    #[arg(long, env = "WIDGET_TOKEN")]
    token: Option<String>,

    /// API base URL the simulated host hands to the widget
    #[arg(long, env = "WIDGET_ENDPOINT")]
    endpoint: Option<String>,

    /// Run in mock mode instead of embedded mode
    #[arg(long, env = "WIDGET_MOCK", default_value = "false")]
    mock: bool,

    /// JSON file with the mock identity (random when omitted)
    #[arg(long, env = "WIDGET_MOCK_CONFIG")]
    mock_config: Option<PathBuf>,

    /// Create a post with this content after init
    #[arg(long)]
    post: Option<String>,

    /// Image to attach to the post (repeatable)
    #[arg(long = "image")]
    images: Vec<String>,

    /// Height to request after init
    #[arg(long)]
    resize: Option<u32>,

    /// Seconds to wait for the init message
    #[arg(long, env = "WIDGET_INIT_TIMEOUT_SECS", default_value = "10")]
    init_timeout_secs: u64,

    /// Seconds before an API request is abandoned
    #[arg(long, env = "WIDGET_REQUEST_TIMEOUT_SECS", default_value = "30")]
    request_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn validate(&self) -> Result<(), String> {
        if !self.mock && self.token.is_none() {
            return Err("WIDGET_TOKEN is required unless running in mock mode".to_string());
        }
        if self.mock_config.is_some() && !self.mock {
            return Err("WIDGET_MOCK_CONFIG only applies in mock mode".to_string());
        }
        if self.init_timeout_secs == 0 {
            return Err("WIDGET_INIT_TIMEOUT_SECS must be greater than zero".to_string());
        }
        Ok(())
    }

    fn widget_config(&self) -> WidgetConfig {
        WidgetConfig {
            init_timeout: Duration::from_secs(self.init_timeout_secs),
            request_timeout_secs: self.request_timeout_secs,
        }
    }
}

fn load_mock_config(path: Option<&PathBuf>) -> anyhow::Result<MockConfig> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read mock config {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Invalid mock config {}", path.display()))
        }
        None => Ok(MockConfig::random()),
    }
}

/// Answer the widget the way a host page would
async fn run_host(mut host: MemoryHost, token: String, endpoint: Option<String>) {
    while let Some(message) = host.recv().await {
        match message.kind.as_str() {
            READY => {
                let delivered = host.deliver(HostMessage::init(token.clone(), endpoint.clone()));
                info!(delivered, "Host answered ready with init");
            }
            RESIZE => {
                let height = message.payload.as_ref().and_then(|p| p.get("height"));
                info!(?height, "Host received resize request");
            }
            other => warn!(kind = other, "Host ignoring unknown message"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("happenow_widget={},widget_harness={},info", log_level, log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let mode = if args.mock {
        WidgetMode::mock(load_mock_config(args.mock_config.as_ref())?)
    } else {
        let (channel, host) = memory_channel();
        let token = args.token.clone().unwrap_or_default();
        tokio::spawn(run_host(host, token, args.endpoint.clone()));
        WidgetMode::embedded(channel)
    };

    info!("Mode: {}", if mode.is_mock() { "MOCK" } else { "EMBEDDED" });
    let widget = Widget::new(mode, args.widget_config())?;

    widget.on(
        Init,
        Listener::new(|ctx: &SessionContext| {
            info!(user = %ctx.user_name, event = %ctx.event_id, admin = ctx.is_admin, "init");
            Ok(())
        }),
    );

    let ctx = widget.init().await.context("Widget init failed")?;
    println!("{}", serde_json::to_string_pretty(&ctx)?);

    if let Some(content) = args.post.clone() {
        let options = CreatePostOptions::new(content).with_images(args.images.clone());
        match widget.create_post(options).await {
            Ok(post) => println!("{}", serde_json::to_string_pretty(&post)?),
            Err(e) => error!("Create post failed: {}", e),
        }
    }

    if let Some(height) = args.resize {
        widget.resize(height);
        // Let the host task log the request before shutdown
        tokio::task::yield_now().await;
    }

    widget.destroy();
    Ok(())
}
