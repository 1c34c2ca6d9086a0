//! Exchange account and order commands

use anyhow::Result;
use rust_decimal::Decimal;
use std::path::PathBuf;
use tracing::{info, warn};

use dca_core::bitaroo::{fiat_buy_terms, ExchangeGateway, OrderFilter, OrderId};
use dca_core::ResilientClient;

use super::{describe, exchange_gateway, load_config, runtime, CredentialArgs};

fn gateway(config_path: Option<PathBuf>, credential: &CredentialArgs) -> Result<ExchangeGateway> {
    let config = load_config(config_path)?;
    exchange_gateway(&config, credential, ResilientClient::new())
}

pub fn balance(
    config_path: Option<PathBuf>,
    credential: CredentialArgs,
    asset: Option<String>,
) -> Result<()> {
    let gateway = gateway(config_path, &credential)?;
    let balances = runtime()?.block_on(gateway.balances()).map_err(describe)?;

    let selected: Vec<_> = balances
        .iter()
        .filter(|b| {
            asset
                .as_deref()
                .map_or(true, |asset| b.asset_symbol.eq_ignore_ascii_case(asset))
        })
        .collect();

    if selected.is_empty() {
        println!("No balance found");
        return Ok(());
    }

    println!("{:<6} {:>20} {:>20} {:>20}", "Asset", "Available", "Locked", "Total");
    for b in selected {
        println!(
            "{:<6} {:>20} {:>20} {:>20}",
            b.asset_symbol, b.available, b.locked, b.balance
        );
    }
    Ok(())
}

pub fn orders(
    config_path: Option<PathBuf>,
    credential: CredentialArgs,
    active: bool,
    history: bool,
) -> Result<()> {
    let gateway = gateway(config_path, &credential)?;
    let filter = OrderFilter {
        active_only: active,
        history_only: history,
    };
    let orders = runtime()?.block_on(gateway.orders(filter)).map_err(describe)?;

    info!("Fetched {} orders", orders.len());
    for order in &orders {
        println!(
            "{:>10} {:<6} {:<4} {:>14} {:>14} filled {:>14} {:?} {}",
            order.order_id,
            order.order_type,
            order.side,
            order.price,
            order.amount,
            order.filled,
            order.status,
            order.created_at
        );
    }
    Ok(())
}

pub fn trades(config_path: Option<PathBuf>, credential: CredentialArgs) -> Result<()> {
    let gateway = gateway(config_path, &credential)?;
    let trades = runtime()?.block_on(gateway.trades()).map_err(describe)?;

    info!("Fetched {} trades", trades.len());
    for trade in &trades {
        println!(
            "{:>10} order {:>10} {:<4} {:>14} @ {:>14} fee {:>10} {}",
            trade.trade_id,
            trade.order_id,
            trade.side,
            trade.amount,
            trade.price,
            trade.fee,
            trade.timestamp
        );
    }
    Ok(())
}

pub fn buy(
    config_path: Option<PathBuf>,
    credential: CredentialArgs,
    aud: Decimal,
    slippage: Decimal,
    confirm: bool,
) -> Result<()> {
    let gateway = gateway(config_path, &credential)?;
    let rt = runtime()?;

    if !confirm {
        let price = rt.block_on(gateway.current_price()).map_err(describe)?;
        if price.ask.is_zero() {
            anyhow::bail!("No asks on the orderbook");
        }
        let (limit, quantity) = fiat_buy_terms(aud, price.ask, slippage).map_err(describe)?;
        println!(
            "Would buy {} BTC at up to A${} (best ask A${}). Re-run with --confirm to submit.",
            quantity, limit, price.ask
        );
        return Ok(());
    }

    warn!("Submitting live order for A${}", aud);
    let buy = rt.block_on(gateway.buy_with_fiat(aud, slippage)).map_err(describe)?;
    println!(
        "Order {} placed: {} BTC at up to A${} (best ask A${})",
        buy.order_id, buy.quantity, buy.limit_price, buy.ask
    );
    Ok(())
}

pub fn cancel(
    config_path: Option<PathBuf>,
    credential: CredentialArgs,
    order_id: u64,
) -> Result<()> {
    let gateway = gateway(config_path, &credential)?;
    let cancelled = runtime()?
        .block_on(gateway.cancel_order(OrderId(order_id)))
        .map_err(describe)?;

    if cancelled {
        println!("Order {} cancelled", order_id);
    } else {
        println!("Exchange declined to cancel order {}", order_id);
    }
    Ok(())
}

pub fn test_connection(config_path: Option<PathBuf>, credential: CredentialArgs) -> Result<()> {
    let gateway = gateway(config_path, &credential)?;
    let connected = runtime()?.block_on(gateway.test_connection()).map_err(describe)?;

    if connected {
        println!("Connected: API key accepted");
        Ok(())
    } else {
        anyhow::bail!("Exchange unreachable, try again later")
    }
}
