//! Example: publishing to a feed and enqueuing jobs.
//!
//! Run with: cargo run --example publisher

use broker::feeds::Priority;
use broker::{Broker, BrokerConfig, FeedType};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let broker = Broker::connect(BrokerConfig::from_env()).await?;

    println!("Creating feed 'alerts'...");
    let handle = broker.create_or_get(FeedType::Feed, "alerts").await?;
    let feed = handle.as_feed().expect("alerts is a feed");
    let id = feed.publish("disk usage above 90%", None).await?;
    println!("  published id {id}");

    println!("Creating job queue 'resize-jobs'...");
    let handle = broker.create_or_get(FeedType::Job, "resize-jobs").await?;
    let job = handle.as_job().expect("resize-jobs is a job feed");
    for i in 0..3 {
        let id = job
            .put(&format!("resize image {i}"), Priority::Normal)
            .await?;
        println!("  queued job {id}");
    }

    broker.close().await?;
    Ok(())
}
