use std::time::Duration;

use clap::Parser;
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use routekit::client::{connect, StreamOptions};
use routekit::lifecycle::signals::wait_for_signal;
use routekit::sse::frame::LAST_EVENT_ID_PARAM;

#[derive(Parser)]
#[command(name = "routekit-tail")]
#[command(about = "Print every batch published on a routekit SSE endpoint", long_about = None)]
struct Cli {
    /// Full URL of the event stream, e.g. http://localhost:8080/api/todos/events
    url: Url,

    /// Resume after this event id instead of starting live.
    #[arg(short, long)]
    last_event_id: Option<u64>,

    /// Seconds to wait for the first connection.
    #[arg(long, default_value_t = 10)]
    connect_timeout: u64,

    /// Seconds between reconnect attempts.
    #[arg(long, default_value_t = 3)]
    reconnect_delay: u64,

    /// Print batches as compact single-line JSON.
    #[arg(long)]
    compact: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "routekit=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut url = cli.url;
    if let Some(id) = cli.last_event_id {
        url.query_pairs_mut()
            .append_pair(LAST_EVENT_ID_PARAM, &id.to_string());
    }

    let options = StreamOptions {
        connect_timeout: Duration::from_secs(cli.connect_timeout),
        reconnect_delay: Duration::from_secs(cli.reconnect_delay),
    };
    let compact = cli.compact;
    let stream = connect(&reqwest::Client::new(), url, &options, move |batch: Value| {
        let printed = if compact {
            serde_json::to_string(&batch)
        } else {
            serde_json::to_string_pretty(&batch)
        };
        match printed {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("Error: failed to print batch: {e}"),
        }
    })
    .await?;

    wait_for_signal().await;
    stream.close();
    Ok(())
}
