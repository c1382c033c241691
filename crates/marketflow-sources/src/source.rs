//! Source extraction trait

use marketflow_core::{RecordBatch, SourceConfig, SourceKind, TableDescriptor};
use crate::client::SourceError;
use crate::fixer::FixerSource;
use crate::market_stack::MarketStackSource;

/// One external data source feeding a raw table
#[async_trait::async_trait]
pub trait Source: Send + Sync {
    /// Source name, as declared in the pipeline configuration
    fn name(&self) -> &str;

    /// Raw table the fetched batch is loaded into
    fn descriptor(&self) -> TableDescriptor;

    /// Fetch and reshape the current payload
    async fn fetch(&self) -> Result<RecordBatch, SourceError>;
}

/// Build the source declared by `config`
///
/// `access_key` looks up an API key by environment variable name.
pub fn build_source(
    config: &SourceConfig,
    access_key: impl Fn(&str) -> Option<String>,
) -> Result<Box<dyn Source>, SourceError> {
    match config.kind {
        SourceKind::Fixer => {
            let key = access_key(FixerSource::ACCESS_KEY_VAR).unwrap_or_default();
            Ok(Box::new(FixerSource::from_config(config, key)?))
        }
        SourceKind::MarketStack => {
            let key = access_key(MarketStackSource::ACCESS_KEY_VAR).unwrap_or_default();
            Ok(Box::new(MarketStackSource::from_config(config, key)?))
        }
    }
}
