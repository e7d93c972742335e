use tvfeed::config::fetch_config;
use tvfeed::{CandleRequest, Streamer, TvFeedError};

#[tokio::main]
async fn main() -> Result<(), TvFeedError> {
    // Initialize tracing subscriber for logging output.
    tracing_subscriber::fmt::init();

    let app_config = fetch_config()?;
    let streamer = Streamer::from_config(app_config)?;

    let request = CandleRequest::new("BINANCE", "BTCUSDT")
        .timeframe("1h")
        .candles(10);
    let response = streamer.get_candles(&request).await;

    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(())
}
