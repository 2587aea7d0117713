// Kraken REST API client

use crate::clients::{AddOrderReceipt, Exchange, OrderInfo, OrderRequest};
use crate::config::ApiConfig;
use crate::error::{BotError, BotResult};
use crate::types::{BotMode, Ohlc, OrderKind, RemoteStatus};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::{Digest, Sha256, Sha512};
use std::collections::HashMap;
use tracing::debug;

type HmacSha512 = Hmac<Sha512>;

pub struct KrakenClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    /// Test mode submits every order with validate=true, so nothing executes.
    validate_orders: bool,
}

impl KrakenClient {
    pub fn new(api: &ApiConfig, mode: BotMode) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: api.rest_url.trim_end_matches('/').to_string(),
            api_key: api.api_key.clone(),
            api_secret: api.api_secret.clone(),
            validate_orders: mode == BotMode::Test,
        }
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Kraken request signature: HMAC-SHA512 of the URL path concatenated
    /// with SHA256(nonce + postdata), keyed by the base64-decoded secret.
    fn sign(&self, url_path: &str, nonce: &str, postdata: &str) -> BotResult<String> {
        let secret = BASE64
            .decode(&self.api_secret)
            .map_err(|e| BotError::Config(format!("API secret is not valid base64: {}", e)))?;

        let mut sha = Sha256::new();
        sha.update(nonce.as_bytes());
        sha.update(postdata.as_bytes());
        let digest = sha.finalize();

        let mut mac = HmacSha512::new_from_slice(&secret)
            .map_err(|e| BotError::Config(format!("API secret rejected by HMAC: {}", e)))?;
        mac.update(url_path.as_bytes());
        mac.update(&digest);
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }

    async fn private_post(&self, url_path: &str, params: &[(&str, String)]) -> BotResult<Value> {
        let nonce = chrono::Utc::now().timestamp_millis().to_string();
        let mut postdata = format!("nonce={}", nonce);
        for (key, value) in params {
            postdata.push('&');
            postdata.push_str(key);
            postdata.push('=');
            postdata.push_str(value);
        }

        let signature = self.sign(url_path, &nonce, &postdata)?;
        debug!("POST {} ({} params)", url_path, params.len());

        let response = self
            .client
            .post(format!("{}{}", self.base_url, url_path))
            .header("API-Key", &self.api_key)
            .header("API-Sign", signature)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(postdata)
            .send()
            .await?;

        let body: Value = response.json().await?;
        Self::extract_result(body, url_path)
    }

    async fn public_get(&self, url_path: &str, query: &[(&str, String)]) -> BotResult<Value> {
        let body: Value = self
            .client
            .get(format!("{}{}", self.base_url, url_path))
            .query(query)
            .send()
            .await?
            .json()
            .await?;
        Self::extract_result(body, url_path)
    }

    /// Every Kraken response carries an `error` array; a non-empty one means
    /// the call failed even if HTTP said 200.
    fn extract_result(body: Value, url_path: &str) -> BotResult<Value> {
        if let Some(errors) = body.get("error").and_then(Value::as_array) {
            if !errors.is_empty() {
                let joined = errors
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(BotError::Exchange(format!("{}: {}", url_path, joined)));
            }
        }
        body.get("result")
            .cloned()
            .ok_or_else(|| BotError::Exchange(format!("{}: response missing result", url_path)))
    }

    fn field_f64(value: &Value) -> BotResult<f64> {
        match value {
            Value::String(s) => s
                .parse::<f64>()
                .map_err(|e| BotError::Exchange(format!("non-numeric field '{}': {}", s, e))),
            Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| BotError::Exchange("numeric field out of range".into())),
            other => Err(BotError::Exchange(format!(
                "expected numeric field, got {}",
                other
            ))),
        }
    }

    fn parse_balance_map(result: &Value) -> BotResult<HashMap<String, f64>> {
        let object = result
            .as_object()
            .ok_or_else(|| BotError::Exchange("balance result is not an object".into()))?;
        let mut balances = HashMap::with_capacity(object.len());
        for (asset, value) in object {
            balances.insert(asset.clone(), Self::field_f64(value)?);
        }
        Ok(balances)
    }

    fn order_params(&self, request: &OrderRequest) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("pair", request.pair.clone()),
            ("type", request.side.as_str().to_string()),
            ("ordertype", request.kind.as_str().to_string()),
            ("volume", request.volume.to_string()),
        ];
        if let Some(price) = request.price {
            params.push(("price", price.to_string()));
            // stop/take-profit limit orders trigger and fill at the same price
            if matches!(
                request.kind,
                OrderKind::StopLossLimit | OrderKind::TakeProfitLimit
            ) {
                params.push(("price2", price.to_string()));
            }
        }
        if let (Some(kind), Some(price)) = (request.close_kind, request.close_price) {
            params.push(("close[ordertype]", kind.as_str().to_string()));
            params.push(("close[price]", price.to_string()));
            if matches!(kind, OrderKind::StopLossLimit | OrderKind::TakeProfitLimit) {
                params.push(("close[price2]", price.to_string()));
            }
        }
        if request.post_only {
            params.push(("oflags", "post".to_string()));
        }
        if self.validate_orders {
            params.push(("validate", "true".to_string()));
        }
        params
    }
}

#[async_trait]
impl Exchange for KrakenClient {
    async fn get_ohlc_data(&self, pair: &str, interval: u32) -> BotResult<Vec<Ohlc>> {
        let result = self
            .public_get(
                "/0/public/OHLC",
                &[("pair", pair.to_string()), ("interval", interval.to_string())],
            )
            .await?;

        // The result object holds one key per pair plus "last".
        let object = result
            .as_object()
            .ok_or_else(|| BotError::Exchange("OHLC result is not an object".into()))?;
        let rows = object
            .iter()
            .find(|(key, _)| key.as_str() != "last")
            .and_then(|(_, value)| value.as_array())
            .ok_or_else(|| BotError::Exchange(format!("no OHLC rows for pair {}", pair)))?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            let fields = row
                .as_array()
                .ok_or_else(|| BotError::Exchange("OHLC row is not an array".into()))?;
            if fields.len() < 8 {
                return Err(BotError::Exchange(format!(
                    "OHLC row has {} fields, expected 8",
                    fields.len()
                )));
            }
            candles.push(Ohlc {
                time: fields[0].as_i64().unwrap_or_default(),
                open: Self::field_f64(&fields[1])?,
                high: Self::field_f64(&fields[2])?,
                low: Self::field_f64(&fields[3])?,
                close: Self::field_f64(&fields[4])?,
                vwap: Self::field_f64(&fields[5])?,
                volume: Self::field_f64(&fields[6])?,
                trades: fields[7].as_u64().unwrap_or_default(),
            });
        }
        Ok(candles)
    }

    async fn get_account_balance(&self) -> BotResult<HashMap<String, f64>> {
        let result = self.private_post("/0/private/Balance", &[]).await?;
        Self::parse_balance_map(&result)
    }

    async fn get_extended_balance(&self) -> BotResult<HashMap<String, f64>> {
        let result = self.private_post("/0/private/BalanceEx", &[]).await?;
        let object = result
            .as_object()
            .ok_or_else(|| BotError::Exchange("BalanceEx result is not an object".into()))?;

        let mut balances = HashMap::with_capacity(object.len());
        for (asset, entry) in object {
            let field = |name: &str| -> BotResult<f64> {
                match entry.get(name) {
                    Some(value) => Self::field_f64(value),
                    None => Ok(0.0),
                }
            };
            let available =
                field("balance")? + field("credit")? - field("credit_used")? - field("hold_trade")?;
            balances.insert(asset.clone(), available);
        }
        Ok(balances)
    }

    async fn add_order(&self, request: &OrderRequest) -> BotResult<AddOrderReceipt> {
        let params = self.order_params(request);
        let result = self.private_post("/0/private/AddOrder", &params).await?;

        let descr = result
            .pointer("/descr/order")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        // validate-only submissions come back without a txid
        let txid = result
            .get("txid")
            .and_then(Value::as_array)
            .and_then(|ids| ids.first())
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if txid.is_empty() && !self.validate_orders {
            return Err(BotError::Exchange(
                "AddOrder accepted but returned no txid".into(),
            ));
        }
        Ok(AddOrderReceipt { txid, descr })
    }

    async fn get_orders_info(
        &self,
        txids: &str,
        trades: bool,
    ) -> BotResult<HashMap<String, OrderInfo>> {
        let result = self
            .private_post(
                "/0/private/QueryOrders",
                &[("txid", txids.to_string()), ("trades", trades.to_string())],
            )
            .await?;

        let object = result
            .as_object()
            .ok_or_else(|| BotError::Exchange("QueryOrders result is not an object".into()))?;

        let mut orders = HashMap::with_capacity(object.len());
        for (txid, entry) in object {
            let status = entry
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("pending")
                .parse::<RemoteStatus>()
                .map_err(BotError::Exchange)?;
            let field = |name: &str| -> BotResult<f64> {
                match entry.get(name) {
                    Some(value) => Self::field_f64(value),
                    None => Ok(0.0),
                }
            };
            orders.insert(
                txid.clone(),
                OrderInfo {
                    status,
                    volume: field("vol")?,
                    volume_executed: field("vol_exec")?,
                    price: field("price")?,
                },
            );
        }
        Ok(orders)
    }

    async fn cancel_order(&self, txid: &str) -> BotResult<()> {
        self.private_post("/0/private/CancelOrder", &[("txid", txid.to_string())])
            .await?;
        Ok(())
    }
}
