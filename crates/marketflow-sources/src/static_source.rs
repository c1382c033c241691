use marketflow_core::{RecordBatch, TableDescriptor};
use crate::client::SourceError;
use crate::source::Source;

/// A source returning a fixed batch, or a fixed error
pub struct StaticSource {
    name: String,
    table: TableDescriptor,
    batch: Result<RecordBatch, String>,
}

impl StaticSource {
    pub fn new(name: impl Into<String>, table: TableDescriptor, batch: RecordBatch) -> Self {
        Self {
            name: name.into(),
            table,
            batch: Ok(batch),
        }
    }

    /// A source whose every fetch fails with `message`
    pub fn failing(name: impl Into<String>, table: TableDescriptor, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table,
            batch: Err(message.into()),
        }
    }
}

#[async_trait::async_trait]
impl Source for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn descriptor(&self) -> TableDescriptor {
        self.table.clone()
    }

    async fn fetch(&self) -> Result<RecordBatch, SourceError> {
        self.batch.clone().map_err(SourceError::Http)
    }
}
