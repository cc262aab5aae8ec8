//! Example: a worker that drains the 'resize-jobs' queue and listens for
//! broadcast events on every feed.
//!
//! Run with: cargo run --example subscriber

use std::sync::Arc;
use std::time::Duration;

use broker::{Broker, BrokerConfig, EventKind, FeedType};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let broker = Broker::connect(BrokerConfig::from_env()).await?;

    broker
        .register_handler(
            EventKind::Publish,
            Arc::new(|event| {
                Box::pin(async move {
                    println!("publish event on {}: {:?}", event.feed(), event);
                    Ok(())
                })
            }),
        )
        .await?;

    let handle = broker.create_or_get(FeedType::Job, "resize-jobs").await?;
    let job = handle.as_job().expect("resize-jobs is a job feed");

    println!("Waiting for jobs on 'resize-jobs'. Press Ctrl+C to stop.");
    loop {
        tokio::select! {
            claimed = job.get(Duration::from_secs(5)) => {
                match claimed {
                    Ok(claimed) => {
                        println!("  got job {}: {}", claimed.id, claimed.payload);
                        job.finish(&claimed.id, Some("ok")).await?;
                    }
                    Err(broker::BrokerError::Empty) => continue,
                    Err(err) => return Err(err.into()),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    println!("Shutting down...");
    broker.close().await?;
    Ok(())
}
