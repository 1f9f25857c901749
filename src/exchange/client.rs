//! Binance REST API client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::Decimal;
use sha2::Sha256;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument};

use crate::config::BinanceConfig;
use crate::exchange::traits::{CloseSeries, MarketData, OrderGateway};
use crate::exchange::types::{Candle, Interval, OrderAck, OrderSide, PositionRisk};

const FUTURES_BASE_URL: &str = "https://fapi.binance.com";
const FUTURES_TESTNET_URL: &str = "https://testnet.binancefuture.com";
const SPOT_BASE_URL: &str = "https://api.binance.com";
const SPOT_TESTNET_URL: &str = "https://testnet.binance.vision";

/// Binance API client for futures trading and spot/futures market data.
pub struct BinanceClient {
    http: Client,
    api_key: String,
    api_secret: String,
    futures_base_url: String,
    spot_base_url: String,
}

impl BinanceClient {
    /// Create a new Binance client from configuration.
    pub fn new(config: &BinanceConfig) -> Result<Self> {
        let (futures_base_url, spot_base_url) = if config.testnet {
            (FUTURES_TESTNET_URL.to_string(), SPOT_TESTNET_URL.to_string())
        } else {
            (FUTURES_BASE_URL.to_string(), SPOT_BASE_URL.to_string())
        };

        Self::with_base_urls(config, futures_base_url, spot_base_url)
    }

    /// Create a client pointing at explicit base URLs.
    pub fn with_base_urls(
        config: &BinanceConfig,
        futures_base_url: String,
        spot_base_url: String,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            futures_base_url,
            spot_base_url,
        })
    }

    /// Generate HMAC-SHA256 signature for authenticated requests.
    fn sign(&self, query_string: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(query_string.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Get current timestamp in milliseconds.
    fn timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards")
            .as_millis() as u64
    }

    /// Build a signed query string from parameters plus the timestamp.
    fn signed_query(&self, params: &[(&str, String)]) -> String {
        let timestamp = Self::timestamp();
        let query: String = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .chain(std::iter::once(format!("timestamp={}", timestamp)))
            .collect::<Vec<_>>()
            .join("&");
        let signature = self.sign(&query);
        format!("{}&signature={}", query, signature)
    }

    // ==================== Market Data (Public) ====================

    async fn klines(
        &self,
        base_url: &str,
        path: &str,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<Vec<Vec<serde_json::Value>>> {
        let url = format!(
            "{}{}?symbol={}&interval={}&limit={}",
            base_url,
            path,
            symbol,
            interval.as_str(),
            limit
        );
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .context("Failed to fetch klines")?
            .error_for_status()
            .context("Kline request rejected")?;

        response.json().await.context("Failed to parse klines response")
    }

    /// Fetch futures klines parsed into candles, oldest→newest.
    #[instrument(skip(self))]
    pub async fn futures_klines(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let rows = self
            .klines(&self.futures_base_url, "/fapi/v1/klines", symbol, interval, limit)
            .await?;
        rows.iter().map(|row| Candle::from_kline(row)).collect()
    }

    /// Close prices from futures klines.
    pub async fn futures_close_series(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<Vec<f64>> {
        let rows = self
            .klines(&self.futures_base_url, "/fapi/v1/klines", symbol, interval, limit)
            .await?;
        closes_from_rows(&rows)
    }

    /// Close prices from spot klines.
    pub async fn spot_close_series(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<Vec<f64>> {
        let rows = self
            .klines(&self.spot_base_url, "/api/v3/klines", symbol, interval, limit)
            .await?;
        closes_from_rows(&rows)
    }

    // ==================== Orders (Authenticated) ====================

    async fn place_order(&self, params: &[(&str, String)]) -> Result<OrderAck> {
        let url = format!(
            "{}/fapi/v1/order?{}",
            self.futures_base_url,
            self.signed_query(params)
        );

        let response = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .context("Failed to place order")?
            .error_for_status()
            .context("Order rejected")?;

        let ack: OrderAck = response.json().await.context("Failed to parse order response")?;
        debug!(order_id = ack.order_id, symbol = %ack.symbol, status = %ack.status, "order placed");
        Ok(ack)
    }
}

/// Extract the close column (index 4) from raw kline rows.
fn closes_from_rows(rows: &[Vec<serde_json::Value>]) -> Result<Vec<f64>> {
    rows.iter()
        .map(|row| {
            row.get(4)
                .and_then(|v| v.as_str())
                .context("kline close is not a string")?
                .parse::<f64>()
                .context("kline close is not a valid number")
        })
        .collect()
}

#[async_trait]
impl MarketData for BinanceClient {
    #[instrument(skip(self))]
    async fn latest_candle(&self, symbol: &str, interval: Interval) -> Result<Candle> {
        let candles = self.futures_klines(symbol, interval, 1).await?;
        candles
            .into_iter()
            .next_back()
            .context("empty kline response")
    }

    #[instrument(skip(self))]
    async fn last_closed_candle(&self, symbol: &str, interval: Interval) -> Result<Candle> {
        let candles = self.futures_klines(symbol, interval, 2).await?;
        anyhow::ensure!(
            candles.len() >= 2,
            "need two klines to find the last closed candle, got {}",
            candles.len()
        );
        Ok(candles[candles.len() - 2])
    }
}

#[async_trait]
impl OrderGateway for BinanceClient {
    #[instrument(skip(self))]
    async fn position_size(&self, symbol: &str) -> Result<Decimal> {
        let url = format!(
            "{}/fapi/v2/positionRisk?{}",
            self.futures_base_url,
            self.signed_query(&[("symbol", symbol.to_string())])
        );

        let response = self
            .http
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .context("Failed to fetch position")?
            .error_for_status()
            .context("Position request rejected")?;

        let positions: Vec<PositionRisk> = response
            .json()
            .await
            .context("Failed to parse position response")?;

        Ok(positions
            .iter()
            .find(|p| p.symbol == symbol)
            .map(|p| p.position_amt)
            .unwrap_or(Decimal::ZERO))
    }

    #[instrument(skip(self))]
    async fn cancel_all_orders(&self, symbol: &str) -> Result<()> {
        let url = format!(
            "{}/fapi/v1/allOpenOrders?{}",
            self.futures_base_url,
            self.signed_query(&[("symbol", symbol.to_string())])
        );

        self.http
            .delete(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .context("Failed to cancel open orders")?
            .error_for_status()
            .context("Cancel request rejected")?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn submit_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: Decimal,
    ) -> Result<()> {
        self.place_order(&[
            ("symbol", symbol.to_string()),
            ("side", side.as_str().to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", qty.to_string()),
        ])
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn submit_stop_order(
        &self,
        symbol: &str,
        side: OrderSide,
        stop_price: Decimal,
        qty: Decimal,
    ) -> Result<()> {
        self.place_order(&[
            ("symbol", symbol.to_string()),
            ("side", side.as_str().to_string()),
            ("type", "STOP_MARKET".to_string()),
            ("stopPrice", stop_price.to_string()),
            ("closePosition", "false".to_string()),
            ("quantity", qty.to_string()),
            ("timeInForce", "GTC".to_string()),
            ("workingType", "CONTRACT_PRICE".to_string()),
        ])
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn submit_target_order(
        &self,
        symbol: &str,
        side: OrderSide,
        target_price: Decimal,
        qty: Decimal,
    ) -> Result<()> {
        self.place_order(&[
            ("symbol", symbol.to_string()),
            ("side", side.as_str().to_string()),
            ("type", "TAKE_PROFIT_MARKET".to_string()),
            ("stopPrice", target_price.to_string()),
            ("closePosition", "false".to_string()),
            ("quantity", qty.to_string()),
            ("timeInForce", "GTC".to_string()),
            ("workingType", "CONTRACT_PRICE".to_string()),
        ])
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        let url = format!(
            "{}/fapi/v1/leverage?{}",
            self.futures_base_url,
            self.signed_query(&[
                ("symbol", symbol.to_string()),
                ("leverage", leverage.to_string()),
            ])
        );

        self.http
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .context("Failed to change leverage")?
            .error_for_status()
            .context("Leverage request rejected")?;

        Ok(())
    }
}

/// Spot kline endpoint as an ordered-fallback close-series source.
pub struct SpotCloses(pub Arc<BinanceClient>);

/// Futures kline endpoint as an ordered-fallback close-series source.
pub struct FuturesCloses(pub Arc<BinanceClient>);

#[async_trait]
impl CloseSeries for SpotCloses {
    fn name(&self) -> &'static str {
        "spot"
    }

    async fn close_series(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<Vec<f64>> {
        self.0.spot_close_series(symbol, interval, limit).await
    }
}

#[async_trait]
impl CloseSeries for FuturesCloses {
    fn name(&self) -> &'static str {
        "futures"
    }

    async fn close_series(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<Vec<f64>> {
        self.0.futures_close_series(symbol, interval, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(futures_url: String, spot_url: String) -> BinanceClient {
        let config = BinanceConfig {
            api_key: "test-key".to_string(),
            api_secret: "test-secret".to_string(),
            testnet: false,
        };
        BinanceClient::with_base_urls(&config, futures_url, spot_url).unwrap()
    }

    fn kline_row(open_time: i64, o: &str, h: &str, l: &str, c: &str, close_time: i64) -> serde_json::Value {
        json!([open_time, o, h, l, c, "10.0", close_time, "0", 0, "0", "0", "0"])
    }

    #[tokio::test]
    async fn test_futures_klines_parse() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fapi/v1/klines"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                kline_row(1000, "100.0", "110.0", "99.0", "105.0", 1899),
                kline_row(1900, "105.0", "112.0", "104.0", "111.0", 2799),
            ])))
            .mount(&server)
            .await;

        let client = test_client(server.uri(), server.uri());
        let candles = client
            .futures_klines("BTCUSDT", Interval::FifteenMinutes, 2)
            .await
            .unwrap();

        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].high, dec!(110.0));
        assert_eq!(candles[1].close, dec!(111.0));
    }

    #[tokio::test]
    async fn test_last_closed_is_second_to_last() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fapi/v1/klines"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                kline_row(1000, "100.0", "110.0", "99.0", "105.0", 1899),
                kline_row(1900, "105.0", "112.0", "104.0", "111.0", 2799),
            ])))
            .mount(&server)
            .await;

        let client = test_client(server.uri(), server.uri());
        let candle = client
            .last_closed_candle("BTCUSDT", Interval::FifteenMinutes)
            .await
            .unwrap();

        assert_eq!(candle.close_time, 1899);
        assert_eq!(candle.close, dec!(105.0));
    }

    #[tokio::test]
    async fn test_position_size_parses_signed_amount() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fapi/v2/positionRisk"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"symbol": "BTCUSDT", "positionAmt": "-0.5", "entryPrice": "42000.0"}
            ])))
            .mount(&server)
            .await;

        let client = test_client(server.uri(), server.uri());
        let size = client.position_size("BTCUSDT").await.unwrap();
        assert_eq!(size, dec!(-0.5));
    }

    #[tokio::test]
    async fn test_position_size_flat_when_symbol_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fapi/v2/positionRisk"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let client = test_client(server.uri(), server.uri());
        let size = client.position_size("BTCUSDT").await.unwrap();
        assert_eq!(size, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_spot_close_series() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/klines"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                kline_row(1000, "1", "1", "1", "100.5", 1059),
                kline_row(1060, "1", "1", "1", "101.25", 1119),
            ])))
            .mount(&server)
            .await;

        let client = test_client(server.uri(), server.uri());
        let closes = client
            .spot_close_series("BTCUSDT", Interval::OneMinute, 2)
            .await
            .unwrap();
        assert_eq!(closes, vec![100.5, 101.25]);
    }

    #[tokio::test]
    async fn test_order_rejection_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/fapi/v1/order"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"code": -2010, "msg": "Order would trigger immediately."})),
            )
            .mount(&server)
            .await;

        let client = test_client(server.uri(), server.uri());
        let result = client
            .submit_market_order("BTCUSDT", OrderSide::Buy, dec!(0.001))
            .await;
        assert!(result.is_err());
    }
}
