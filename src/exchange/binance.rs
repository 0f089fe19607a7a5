//! Binance spot REST client
//!
//! Public endpoints are sent as plain query strings. Signed endpoints append
//! `recvWindow` and `timestamp`, then an HMAC-SHA256 signature of the exact
//! query string that goes on the wire.

use super::types::{
    Balances, BookTicker, DepthSnapshot, ExchangeError, ExchangeFilters, OpenOrder, OrderAck,
    PriceLevel,
};
use super::Exchange;
use crate::config::ExchangeConfig;
use crate::signal::TradeSide;
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// API key header expected on signed endpoints
const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// API credentials for signed endpoints
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Read `BINANCE_TESTNET_API_KEY` / `BINANCE_TESTNET_API_SECRET`
    pub fn from_env() -> Option<Self> {
        let key = std::env::var("BINANCE_TESTNET_API_KEY").ok()?;
        let secret = std::env::var("BINANCE_TESTNET_API_SECRET").ok()?;
        if key.trim().is_empty() || secret.trim().is_empty() {
            return None;
        }
        Some(Self::new(key.trim(), secret.trim()))
    }

    fn sign(&self, payload: &str) -> Result<String, ExchangeError> {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| ExchangeError::Transport(format!("invalid API secret: {e}")))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Binance spot REST client
pub struct BinanceClient {
    base_url: String,
    credentials: Option<Credentials>,
    recv_window_ms: u64,
    client: Client,
}

impl BinanceClient {
    /// Create a client from exchange configuration
    pub fn new(
        config: &ExchangeConfig,
        credentials: Option<Credentials>,
    ) -> Result<Self, ExchangeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
            recv_window_ms: config.recv_window_ms,
            client,
        })
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Liveness check against `/v3/ping`
    pub async fn ping(&self) -> Result<(), ExchangeError> {
        let _: serde_json::Value = self.request(Method::GET, "/v3/ping", &[], false).await?;
        Ok(())
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        signed: bool,
    ) -> Result<T, ExchangeError> {
        let mut query = encode_query(params);
        let mut builder;

        if signed {
            let credentials = self
                .credentials
                .as_ref()
                .ok_or(ExchangeError::MissingCredentials)?;
            if !query.is_empty() {
                query.push('&');
            }
            query.push_str(&format!(
                "recvWindow={}&timestamp={}",
                self.recv_window_ms,
                Utc::now().timestamp_millis()
            ));
            let signature = credentials.sign(&query)?;
            query.push_str(&format!("&signature={signature}"));
            builder = self
                .client
                .request(method.clone(), self.url(path, &query))
                .header(API_KEY_HEADER, &credentials.api_key);
        } else {
            builder = self.client.request(method.clone(), self.url(path, &query));
        }
        builder = builder.header(reqwest::header::ACCEPT, "application/json");

        tracing::trace!(%method, path, signed, "Exchange request");
        let response = builder.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ExchangeError::RateLimited {
                status: status.as_u16(),
                retry_after,
            });
        }

        let body = response.text().await?;
        if !status.is_success() {
            return Err(ExchangeError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body = if body.trim().is_empty() { "{}" } else { &body };
        serde_json::from_str(body).map_err(|e| ExchangeError::Decode(format!("{path}: {e}")))
    }

    fn url(&self, path: &str, query: &str) -> String {
        if query.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, query)
        }
    }
}

#[async_trait]
impl Exchange for BinanceClient {
    async fn book_ticker(&self, symbol: &str) -> Result<BookTicker, ExchangeError> {
        let wire: BookTickerWire = self
            .request(
                Method::GET,
                "/v3/ticker/bookTicker",
                &[("symbol", symbol.to_string())],
                false,
            )
            .await?;
        wire.try_into()
    }

    async fn depth(&self, symbol: &str, limit: usize) -> Result<DepthSnapshot, ExchangeError> {
        let wire: DepthWire = self
            .request(
                Method::GET,
                "/v3/depth",
                &[("symbol", symbol.to_string()), ("limit", limit.to_string())],
                false,
            )
            .await?;
        wire.try_into()
    }

    async fn balances(
        &self,
        base_asset: &str,
        quote_asset: &str,
    ) -> Result<Balances, ExchangeError> {
        let wire: AccountWire = self.request(Method::GET, "/v3/account", &[], true).await?;
        wire.balances_for(base_asset, quote_asset)
    }

    async fn exchange_filters(&self, symbol: &str) -> Result<ExchangeFilters, ExchangeError> {
        let wire: ExchangeInfoWire = self
            .request(
                Method::GET,
                "/v3/exchangeInfo",
                &[("symbol", symbol.to_string())],
                false,
            )
            .await?;
        wire.filters_for(symbol)
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: TradeSide,
        quantity: Decimal,
        client_order_id: &str,
    ) -> Result<OrderAck, ExchangeError> {
        let params = [
            ("symbol", symbol.to_string()),
            ("side", side.as_str().to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", format_quantity(quantity)),
            ("newClientOrderId", client_order_id.to_string()),
            ("newOrderRespType", "FULL".to_string()),
        ];
        let wire: OrderWire = self.request(Method::POST, "/v3/order", &params, true).await?;
        wire.try_into()
    }

    async fn open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>, ExchangeError> {
        let wire: Vec<OpenOrderWire> = self
            .request(
                Method::GET,
                "/v3/openOrders",
                &[("symbol", symbol.to_string())],
                true,
            )
            .await?;
        Ok(wire
            .into_iter()
            .map(|o| OpenOrder {
                order_id: o.order_id,
                client_order_id: o.client_order_id,
            })
            .collect())
    }

    async fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<(), ExchangeError> {
        let _: serde_json::Value = self
            .request(
                Method::DELETE,
                "/v3/order",
                &[("symbol", symbol.to_string()), ("orderId", order_id.to_string())],
                true,
            )
            .await?;
        Ok(())
    }
}

/// Build a query string. Values are symbols, integers and plain decimals,
/// none of which need percent-encoding.
fn encode_query(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Plain decimal notation without trailing zeros
fn format_quantity(quantity: Decimal) -> String {
    quantity.normalize().to_string()
}

fn parse_decimal(field: &str, value: &str) -> Result<Decimal, ExchangeError> {
    Decimal::from_str(value.trim())
        .map_err(|e| ExchangeError::Decode(format!("{field}={value:?}: {e}")))
}

/// Lenient parse for filter fields, missing or malformed reads as zero
fn filter_decimal(filter: Option<&HashMap<String, serde_json::Value>>, key: &str) -> Decimal {
    filter
        .and_then(|f| f.get(key))
        .and_then(|v| v.as_str())
        .and_then(|s| Decimal::from_str(s).ok())
        .unwrap_or(Decimal::ZERO)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookTickerWire {
    bid_price: String,
    bid_qty: String,
    ask_price: String,
    ask_qty: String,
}

impl TryFrom<BookTickerWire> for BookTicker {
    type Error = ExchangeError;

    fn try_from(w: BookTickerWire) -> Result<Self, Self::Error> {
        Ok(Self {
            bid_price: parse_decimal("bidPrice", &w.bid_price)?,
            bid_qty: parse_decimal("bidQty", &w.bid_qty)?,
            ask_price: parse_decimal("askPrice", &w.ask_price)?,
            ask_qty: parse_decimal("askQty", &w.ask_qty)?,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DepthWire {
    last_update_id: u64,
    bids: Vec<Vec<String>>,
    asks: Vec<Vec<String>>,
}

fn parse_levels(side: &str, levels: &[Vec<String>]) -> Result<Vec<PriceLevel>, ExchangeError> {
    levels
        .iter()
        .map(|level| match level.as_slice() {
            [price, qty, ..] => Ok(PriceLevel {
                price: parse_decimal(side, price)?,
                qty: parse_decimal(side, qty)?,
            }),
            _ => Err(ExchangeError::Decode(format!("malformed {side} level"))),
        })
        .collect()
}

impl TryFrom<DepthWire> for DepthSnapshot {
    type Error = ExchangeError;

    fn try_from(w: DepthWire) -> Result<Self, Self::Error> {
        Ok(Self {
            last_update_id: w.last_update_id,
            bids: parse_levels("bids", &w.bids)?,
            asks: parse_levels("asks", &w.asks)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct AccountWire {
    balances: Vec<BalanceWire>,
}

#[derive(Debug, Deserialize)]
struct BalanceWire {
    asset: String,
    free: String,
    locked: String,
}

impl AccountWire {
    fn balances_for(&self, base_asset: &str, quote_asset: &str) -> Result<Balances, ExchangeError> {
        let mut balances = Balances::default();
        for b in &self.balances {
            let total = parse_decimal("free", &b.free)? + parse_decimal("locked", &b.locked)?;
            if b.asset == base_asset {
                balances.base = total;
            }
            if b.asset == quote_asset {
                balances.quote = total;
            }
        }
        Ok(balances)
    }
}

#[derive(Debug, Deserialize)]
struct ExchangeInfoWire {
    #[serde(default)]
    symbols: Vec<SymbolWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolWire {
    symbol: String,
    base_asset: String,
    quote_asset: String,
    #[serde(default)]
    filters: Vec<HashMap<String, serde_json::Value>>,
}

impl ExchangeInfoWire {
    fn filters_for(self, symbol: &str) -> Result<ExchangeFilters, ExchangeError> {
        let info = self
            .symbols
            .into_iter()
            .find(|s| s.symbol.eq_ignore_ascii_case(symbol))
            .ok_or_else(|| ExchangeError::UnknownSymbol(symbol.to_string()))?;

        let by_type = |name: &str| {
            info.filters
                .iter()
                .find(|f| f.get("filterType").and_then(|t| t.as_str()) == Some(name))
        };
        let market_lot = by_type("MARKET_LOT_SIZE");
        let lot = by_type("LOT_SIZE");
        let notional = by_type("MIN_NOTIONAL").or_else(|| by_type("NOTIONAL"));

        // MARKET_LOT_SIZE may publish zeros, LOT_SIZE is the fallback
        let pick = |key: &str| {
            let v = filter_decimal(market_lot, key);
            if v > Decimal::ZERO {
                v
            } else {
                filter_decimal(lot, key)
            }
        };

        Ok(ExchangeFilters {
            min_qty: pick("minQty"),
            max_qty: pick("maxQty"),
            step_size: pick("stepSize"),
            min_notional: filter_decimal(notional, "minNotional"),
            symbol: info.symbol.clone(),
            base_asset: info.base_asset.clone(),
            quote_asset: info.quote_asset.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderWire {
    order_id: u64,
    #[serde(default)]
    client_order_id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    executed_qty: String,
    #[serde(default)]
    cummulative_quote_qty: String,
    #[serde(default)]
    fills: Vec<FillWire>,
}

#[derive(Debug, Deserialize)]
struct FillWire {
    price: String,
    qty: String,
}

impl TryFrom<OrderWire> for OrderAck {
    type Error = ExchangeError;

    fn try_from(w: OrderWire) -> Result<Self, Self::Error> {
        let executed_qty = Decimal::from_str(&w.executed_qty).unwrap_or(Decimal::ZERO);
        let cumulative_quote_qty =
            Decimal::from_str(&w.cummulative_quote_qty).unwrap_or(Decimal::ZERO);

        let mut fill_qty = Decimal::ZERO;
        let mut fill_quote = Decimal::ZERO;
        for fill in &w.fills {
            let qty = parse_decimal("fill.qty", &fill.qty)?;
            fill_qty += qty;
            fill_quote += qty * parse_decimal("fill.price", &fill.price)?;
        }

        let avg_fill_price = if fill_qty > Decimal::ZERO {
            fill_quote / fill_qty
        } else if executed_qty > Decimal::ZERO {
            cumulative_quote_qty / executed_qty
        } else {
            Decimal::ZERO
        };

        Ok(Self {
            order_id: w.order_id,
            client_order_id: w.client_order_id,
            status: w.status,
            executed_qty,
            cumulative_quote_qty,
            avg_fill_price,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenOrderWire {
    order_id: u64,
    #[serde(default)]
    client_order_id: String,
}
