//! MarketStack end-of-day stock prices

use chrono::{DateTime, NaiveDate};
use marketflow_core::{ColumnType, RecordBatch, ScalarValue, SourceConfig, TableDescriptor};
use serde_json::Value;
use crate::client::{ApiClient, SourceError};
use crate::source::Source;

const DEFAULT_URL: &str = "http://api.marketstack.com/v1/eod";
const DEFAULT_SYMBOLS: [&str; 5] = ["AAPL", "MSFT", "AMZN", "GOOGL", "FB"];

/// Columns kept from each `data` entry, in output order
const COLUMNS: [(&str, ColumnType); 8] = [
    ("date", ColumnType::Text),
    ("symbol", ColumnType::Text),
    ("open", ColumnType::Float),
    ("high", ColumnType::Float),
    ("low", ColumnType::Float),
    ("close", ColumnType::Float),
    ("volume", ColumnType::Float),
    ("exchange", ColumnType::Text),
];

/// Daily OHLCV bars for a set of tickers
pub struct MarketStackSource {
    name: String,
    table: String,
    symbols: Vec<String>,
    client: ApiClient,
}

impl MarketStackSource {
    pub const ACCESS_KEY_VAR: &'static str = "MARKET_STACK_ACCESS_KEY";
    pub const DEFAULT_TABLE: &'static str = "stock_price";

    pub fn from_config(config: &SourceConfig, access_key: String) -> Result<Self, SourceError> {
        let url = config.url.as_deref().unwrap_or(DEFAULT_URL);
        let symbols = if config.symbols.is_empty() {
            DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect()
        } else {
            config.symbols.clone()
        };

        Ok(Self {
            name: config.name.clone(),
            table: config.table.clone().unwrap_or_else(|| Self::DEFAULT_TABLE.to_string()),
            symbols,
            client: ApiClient::new("MarketStack", url, access_key)?,
        })
    }
}

/// Reduce an API timestamp such as `2024-05-24T00:00:00+0000` to `YYYY-MM-DD`
pub fn normalize_date(raw: &str) -> Option<String> {
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(ts.date_naive().format("%Y-%m-%d").to_string());
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.date_naive().format("%Y-%m-%d").to_string());
    }
    NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d")
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

/// Reshape an `eod` payload into one row per `data` entry
///
/// Adjusted prices, `split_factor` and `dividend` are dropped.
pub fn reshape(payload: &Value) -> Result<RecordBatch, SourceError> {
    if let Some(error) = payload.get("error") {
        return Err(SourceError::Payload(format!("MarketStack reported failure: {}", error)));
    }

    let entries = payload
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| SourceError::Payload("missing 'data' array".to_string()))?;

    let mut batch = RecordBatch::new(COLUMNS.iter().map(|(name, _)| *name))?;
    for (i, entry) in entries.iter().enumerate() {
        let mut row = Vec::with_capacity(COLUMNS.len());
        for (column, _) in COLUMNS {
            let raw = entry.get(column).unwrap_or(&Value::Null);
            let value = if column == "date" {
                let text = raw
                    .as_str()
                    .ok_or_else(|| SourceError::Payload(format!("entry {}: missing date", i)))?;
                let date = normalize_date(text)
                    .ok_or_else(|| SourceError::Payload(format!("entry {}: invalid date '{}'", i, text)))?;
                ScalarValue::Text(date)
            } else {
                ScalarValue::from_json(raw).ok_or_else(|| {
                    SourceError::Payload(format!("entry {}: '{}' is not a scalar", i, column))
                })?
            };
            row.push(value);
        }
        batch.push_row(row)?;
    }

    Ok(batch)
}

#[async_trait::async_trait]
impl Source for MarketStackSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn descriptor(&self) -> TableDescriptor {
        COLUMNS.iter().fold(TableDescriptor::new(self.table.clone()), |table, (name, ty)| {
            if *name == "date" || *name == "symbol" {
                table.with_key_column(*name, *ty)
            } else {
                table.with_column(*name, *ty)
            }
        })
    }

    async fn fetch(&self) -> Result<RecordBatch, SourceError> {
        let payload = self
            .client
            .get_json(&[("symbols", self.symbols.join(","))])
            .await?;
        let batch = reshape(&payload)?;
        tracing::debug!(source = %self.name, rows = batch.len(), "Reshaped end-of-day prices");
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn payload() -> Value {
        serde_json::json!({
            "pagination": {"limit": 100, "offset": 0, "count": 2, "total": 2},
            "data": [
                {"date": "2024-05-24T00:00:00+0000", "symbol": "AAPL", "open": 145.3, "high": 147.2,
                 "low": 144.1, "close": 146.8, "volume": 100000, "adj_high": 147.2, "adj_low": 144.1,
                 "adj_close": 146.8, "adj_open": 145.3, "adj_volume": 100000, "split_factor": 1.0,
                 "dividend": 0.0, "exchange": "XNAS"},
                {"date": "2024-05-24T00:00:00+0000", "symbol": "MSFT", "open": 250.0, "high": 255.0,
                 "low": 248.0, "close": 252.5, "volume": 150000, "adj_high": 255.0, "adj_low": 248.0,
                 "adj_close": 252.5, "adj_open": 250.0, "adj_volume": 150000, "split_factor": 1.0,
                 "dividend": 0.0}
            ]
        })
    }

    #[test]
    fn reshape_eod_payload() {
        let batch = reshape(&payload()).unwrap();
        assert_eq!(
            batch.columns(),
            ["date", "symbol", "open", "high", "low", "close", "volume", "exchange"]
        );
        assert_eq!(batch.len(), 2);
        assert_eq!(
            batch.rows()[0],
            vec![
                ScalarValue::from("2024-05-24"),
                ScalarValue::from("AAPL"),
                ScalarValue::Float(145.3),
                ScalarValue::Float(147.2),
                ScalarValue::Float(144.1),
                ScalarValue::Float(146.8),
                ScalarValue::Int(100000),
                ScalarValue::from("XNAS"),
            ]
        );
        // Absent fields become null
        assert_eq!(batch.rows()[1][7], ScalarValue::Null);
    }

    #[test]
    fn date_normalization() {
        assert_eq!(normalize_date("2024-05-24T00:00:00+0000").as_deref(), Some("2024-05-24"));
        assert_eq!(normalize_date("2024-05-24T00:00:00Z").as_deref(), Some("2024-05-24"));
        assert_eq!(normalize_date("2024-05-24").as_deref(), Some("2024-05-24"));
        assert_eq!(normalize_date("yesterday"), None);
    }

    #[test]
    fn error_payload_is_an_error() {
        let payload = serde_json::json!({"error": {"code": "invalid_access_key"}});
        assert!(reshape(&payload).is_err());
    }
}
