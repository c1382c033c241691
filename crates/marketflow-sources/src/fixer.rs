//! Fixer currency exchange rates

use marketflow_core::{ColumnType, RecordBatch, ScalarValue, SourceConfig, TableDescriptor};
use serde_json::Value;
use crate::client::{ApiClient, SourceError};
use crate::source::Source;

const DEFAULT_URL: &str = "http://data.fixer.io/api/latest";
const DEFAULT_SYMBOLS: [&str; 4] = ["USD", "CNY", "INR", "AUD"];

/// Latest exchange rates for a set of currencies
pub struct FixerSource {
    name: String,
    table: String,
    symbols: Vec<String>,
    client: ApiClient,
}

impl FixerSource {
    pub const ACCESS_KEY_VAR: &'static str = "FIXER_ACCESS_KEY";
    pub const DEFAULT_TABLE: &'static str = "currency_exchange_rate";

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
            client: ApiClient::new("Fixer", url, access_key)?,
        })
    }
}

/// Column holding the rate of one currency
pub fn rate_column(symbol: &str) -> String {
    format!("rate_{}", symbol.to_lowercase())
}

/// Reshape a `latest` payload into one `(date, base, rate_*)` row
///
/// Response metadata (`success`, `timestamp`, `historical`) is dropped.
pub fn reshape(payload: &Value) -> Result<RecordBatch, SourceError> {
    if payload.get("success").and_then(Value::as_bool) == Some(false) {
        let info = payload
            .get("error")
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string());
        return Err(SourceError::Payload(format!("Fixer reported failure: {}", info)));
    }

    let text = |field: &str| -> Result<ScalarValue, SourceError> {
        payload
            .get(field)
            .and_then(Value::as_str)
            .map(ScalarValue::from)
            .ok_or_else(|| SourceError::Payload(format!("missing '{}'", field)))
    };

    let rates = payload
        .get("rates")
        .and_then(Value::as_object)
        .ok_or_else(|| SourceError::Payload("missing 'rates'".to_string()))?;

    let mut rates: Vec<_> = rates.iter().collect();
    rates.sort_by(|a, b| a.0.cmp(b.0));

    let mut columns = vec!["date".to_string(), "base".to_string()];
    let mut row = vec![text("date")?, text("base")?];
    for (symbol, rate) in rates {
        let value = ScalarValue::from_json(rate)
            .ok_or_else(|| SourceError::Payload(format!("rate for {} is not a scalar", symbol)))?;
        columns.push(rate_column(symbol));
        row.push(value);
    }

    Ok(RecordBatch::new(columns)?.with_row(row)?)
}

#[async_trait::async_trait]
impl Source for FixerSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn descriptor(&self) -> TableDescriptor {
        self.symbols.iter().fold(
            TableDescriptor::new(self.table.clone())
                .with_key_column("date", ColumnType::Text)
                .with_column("base", ColumnType::Text),
            |table, symbol| table.with_column(rate_column(symbol), ColumnType::Float),
        )
    }

    async fn fetch(&self) -> Result<RecordBatch, SourceError> {
        let payload = self
            .client
            .get_json(&[("symbols", self.symbols.join(","))])
            .await?;
        reshape(&payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marketflow_core::{LoadMethod, SourceKind};
    use pretty_assertions::assert_eq;

    #[test]
    fn reshape_latest_payload() {
        let payload = serde_json::json!({
            "success": true,
            "timestamp": 1629878400,
            "historical": false,
            "base": "EUR",
            "date": "2024-05-25",
            "rates": {"USD": 1.08, "CNY": 7.86, "INR": 90.16, "AUD": 1.64}
        });

        let batch = reshape(&payload).unwrap();
        assert_eq!(
            batch.columns(),
            ["date", "base", "rate_aud", "rate_cny", "rate_inr", "rate_usd"]
        );
        assert_eq!(
            batch.rows()[0],
            vec![
                ScalarValue::from("2024-05-25"),
                ScalarValue::from("EUR"),
                ScalarValue::Float(1.64),
                ScalarValue::Float(7.86),
                ScalarValue::Float(90.16),
                ScalarValue::Float(1.08),
            ]
        );
    }

    #[test]
    fn reported_failure_is_an_error() {
        let payload = serde_json::json!({
            "success": false,
            "error": {"code": 101, "type": "invalid_access_key"}
        });
        let err = reshape(&payload).unwrap_err();
        assert!(err.to_string().contains("invalid_access_key"));
    }

    #[test]
    fn missing_rates_is_an_error() {
        assert!(reshape(&serde_json::json!({"date": "2024-05-25", "base": "EUR"})).is_err());
    }

    #[test]
    fn descriptor_follows_symbols() {
        let config = SourceConfig {
            name: "fixer".to_string(),
            kind: SourceKind::Fixer,
            table: None,
            load_method: LoadMethod::Upsert,
            symbols: vec!["USD".to_string(), "GBP".to_string()],
            url: None,
        };
        let source = FixerSource::from_config(&config, "key".to_string()).unwrap();
        let table = source.descriptor();
        assert_eq!(table.name, "currency_exchange_rate");
        assert_eq!(table.primary_key(), vec!["date"]);
        assert_eq!(table.column_names(), vec!["date", "base", "rate_usd", "rate_gbp"]);
    }
}
