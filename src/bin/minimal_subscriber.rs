//! Minimal subscriber: logs every message heard on a topic.
//!
//! An in-process publisher thread stands in for a remote talker and requests
//! shutdown after `--count` messages.

use clap::Parser;
use nodebus::{Context, ContextConfig, Executor, SubscriptionConfig};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "minimal_subscriber", about = "Subscribe to a topic and log what is heard")]
struct Args {
    /// Topic to subscribe to.
    #[arg(long, default_value = "topic")]
    topic: String,

    /// History depth of the subscription queue. Overrides the config file.
    #[arg(long)]
    depth: Option<usize>,

    /// JSON context configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Messages the demo publisher sends before requesting shutdown.
    #[arg(long, default_value_t = 10)]
    count: u64,

    /// Delay between published messages.
    #[arg(long, default_value_t = 500)]
    interval_ms: u64,
}

fn main() -> nodebus::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            let raw = fs::read_to_string(path)?;
            ContextConfig::from_json(&raw)?
        }
        None => ContextConfig::default(),
    };
    let ctx = Context::with_config(config);

    let sub_config = args
        .depth
        .map(SubscriptionConfig::with_depth)
        .unwrap_or_else(|| ctx.config().subscription.clone());
    let node = ctx.create_node("minimal_subscriber")?;
    let log_name = node.name().to_string();
    node.create_subscription_with(&args.topic, sub_config, move |msg| {
        info!(node = %log_name, "I heard: '{}'", msg.text())
    })?;

    let talker = ctx.create_node("minimal_publisher")?;
    let publisher = talker.create_publisher(&args.topic)?;
    let publisher_ctx = Arc::clone(&ctx);
    let feeder = thread::spawn(move || {
        for n in 0..args.count {
            if publisher_ctx.is_shutdown_requested() {
                break;
            }
            if let Err(e) = publisher.publish_text(&format!("Hello, world! {}", n)) {
                error!(error = %e, "Publish failed");
                break;
            }
            thread::sleep(Duration::from_millis(args.interval_ms));
        }
        publisher_ctx.request_shutdown();
    });

    let executor = Executor::new(Arc::clone(&ctx));
    executor.spin(&[node])?;

    if feeder.join().is_err() {
        error!("Publisher thread panicked");
    }
    talker.shutdown();
    Ok(())
}
