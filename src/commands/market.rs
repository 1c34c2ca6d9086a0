//! Market snapshot command

use anyhow::Result;
use std::path::PathBuf;
use tracing::info;

use dca_core::ResilientClient;

use super::{describe, exchange_gateway, load_config, runtime, CredentialArgs};

pub fn price(
    config_path: Option<PathBuf>,
    from_exchange: bool,
    credential: CredentialArgs,
) -> Result<()> {
    let config = load_config(config_path)?;
    let client = ResilientClient::new();
    let market = config.market_gateway(client.clone())?;
    let exchange = if from_exchange {
        Some(exchange_gateway(&config, &credential, client)?)
    } else {
        None
    };

    let snapshot = runtime()?
        .block_on(market.market_snapshot(exchange.as_ref()))
        .map_err(describe)?;

    info!(
        source = if from_exchange { "exchange" } else { "market data" },
        "Fetched market snapshot"
    );

    println!("Price:   A${:.2}", snapshot.price);
    match snapshot.ma200 {
        Some(ma) => println!(
            "MA200:   A${:.2} ({:+.2}%{})",
            ma,
            snapshot.percent_from_ma200().unwrap_or_default(),
            if snapshot.is_below_ma200() { ", below" } else { "" }
        ),
        None => println!("MA200:   n/a (not enough history)"),
    }
    match (snapshot.rsi14, snapshot.rsi_condition()) {
        (Some(rsi), Some(condition)) => println!("RSI14:   {:.1} ({})", rsi, condition),
        _ => println!("RSI14:   n/a (not enough history)"),
    }
    Ok(())
}
