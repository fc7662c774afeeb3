//! Single-trade creation from a JSON body.

use std::fmt;

use anyhow::Context;
use serde_json::Value;
use tg_db::{InsertOutcome, TradeStore};
use tg_ingest::{normalize_row, Field, Leniency, MappedRow, RowError};
use tg_schemas::Trade;
use tracing::info;

#[derive(Debug)]
pub enum CreateTradeError {
    /// Required fields absent, null or empty, by canonical name.
    Missing(Vec<&'static str>),
    /// A value is present but unusable.
    Invalid(String),
    /// A trade with the same fingerprint already exists.
    Duplicate,
    Store(anyhow::Error),
}

impl fmt::Display for CreateTradeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreateTradeError::Missing(fields) => {
                write!(f, "Missing required fields: {}", fields.join(", "))
            }
            CreateTradeError::Invalid(msg) => write!(f, "{msg}"),
            CreateTradeError::Duplicate => write!(f, "Trade already exists"),
            CreateTradeError::Store(e) => write!(f, "trade insert failed: {e:#}"),
        }
    }
}

impl std::error::Error for CreateTradeError {}

impl From<RowError> for CreateTradeError {
    fn from(e: RowError) -> Self {
        match e {
            RowError::Missing(fields) => CreateTradeError::Missing(fields),
            other => CreateTradeError::Invalid(other.to_string()),
        }
    }
}

/// JSON object -> mapped row. Strings and numbers are accepted for every
/// field; null counts as absent.
fn mapped_row(body: &Value) -> Result<MappedRow, CreateTradeError> {
    let obj = body.as_object().ok_or_else(|| {
        CreateTradeError::Invalid("request body must be a JSON object".to_string())
    })?;

    let mut row = MappedRow::default();
    for field in Field::ALL {
        match obj.get(field.name()) {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) => row.set(field, s.as_str()),
            Some(Value::Number(n)) => row.set(field, n.to_string()),
            Some(_) => {
                return Err(CreateTradeError::Invalid(format!(
                    "field '{}' must be a string or a number",
                    field.name()
                )))
            }
        }
    }
    Ok(row)
}

/// Validate `body` and insert it as one trade for `user_id`.
///
/// Never updates an existing row: a fingerprint collision is
/// [`CreateTradeError::Duplicate`].
pub async fn create_trade(
    store: &dyn TradeStore,
    user_id: &str,
    body: &Value,
) -> Result<Trade, CreateTradeError> {
    let row = mapped_row(body)?;
    let trade = normalize_row(user_id, &row, Leniency::Strict)?;

    match store
        .insert_trade(&trade)
        .await
        .context("insert trade")
        .map_err(CreateTradeError::Store)?
    {
        InsertOutcome::Created(t) => {
            info!(user_id, trade_id = %t.id, symbol = %t.symbol, "trade created");
            Ok(t)
        }
        InsertOutcome::Duplicate => Err(CreateTradeError::Duplicate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_and_strings_are_both_accepted() {
        let row = mapped_row(&json!({
            "symbol": "aapl",
            "side": "buy",
            "qty": 10,
            "price": "150.25",
            "fees": 1.5,
            "pnl": null,
        }))
        .unwrap();
        assert_eq!(row.get(Field::Qty), Some("10"));
        assert_eq!(row.get(Field::Price), Some("150.25"));
        assert_eq!(row.get(Field::Fees), Some("1.5"));
        assert_eq!(row.get(Field::Pnl), None);
    }

    #[test]
    fn empty_string_counts_as_missing() {
        let row = mapped_row(&json!({"symbol": "  ", "side": "BUY"})).unwrap();
        assert_eq!(
            row.missing_required(),
            vec!["symbol", "qty", "price", "opened_at"]
        );
    }

    #[test]
    fn non_scalar_values_are_invalid() {
        let err = mapped_row(&json!({"qty": [1]})).unwrap_err();
        assert!(matches!(err, CreateTradeError::Invalid(_)));
        let err = mapped_row(&json!("nope")).unwrap_err();
        assert!(matches!(err, CreateTradeError::Invalid(_)));
    }
}
