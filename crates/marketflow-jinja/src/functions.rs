//! Template functions
//!
//! `ref()`, `source()` and `var()` are built as closures over the render
//! context so they resolve against the pipeline being run.

use marketflow_core::{is_valid_identifier, quote_ident};
use minijinja::{Error, ErrorKind, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// ref() - output table of another transform
///
/// Usage in Jinja: {{ ref('stock_prices_in_currencies') }}
/// Returns: the quoted output table of that transform
pub fn ref_function(
    tables: Arc<BTreeMap<String, String>>,
) -> impl Fn(String) -> Result<Value, Error> + Send + Sync + 'static {
    move |name: String| {
        let table = tables.get(&name).ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidOperation,
                format!("ref() to unknown transform '{}'", name),
            )
        })?;
        Ok(Value::from(quote_ident(table)))
    }
}

/// source() - a raw table loaded during extraction
///
/// Usage in Jinja: {{ source('stock_price') }}
/// Returns: the quoted table name
pub fn source_function(table: String) -> Result<Value, Error> {
    if !is_valid_identifier(&table) {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("source() table '{}' is not a valid identifier", table),
        ));
    }
    Ok(Value::from(quote_ident(&table)))
}

/// var() - static pipeline variable
///
/// Usage in Jinja: {{ var('base_currency') }} or {{ var('base_currency', 'EUR') }}
pub fn var_function(
    vars: Arc<BTreeMap<String, serde_json::Value>>,
) -> impl Fn(String, Option<Value>) -> Result<Value, Error> + Send + Sync + 'static {
    move |name: String, default: Option<Value>| match vars.get(&name) {
        Some(value) => Ok(Value::from_serialize(value)),
        None => default.ok_or_else(|| {
            Error::new(
                ErrorKind::UndefinedError,
                format!("Variable '{}' is not defined", name),
            )
        }),
    }
}
