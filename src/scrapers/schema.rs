//! Versioned feed schema adapters
//!
//! The trade subgraph has changed field names across generations. Each
//! generation gets its own adapter; which one is used is explicit
//! configuration, never a guess made from the payload.

use super::feed::{PageQuery, RawTrade};
use crate::models::{NormalizedTrade, Side, UNKNOWN_MARKET, ZERO_ADDRESS};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Relative gap between reported and derived notional worth a debug line
const USD_DIVERGENCE_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SchemaVersion {
    /// `fpmmTrades`: deal-oriented, carries a separate reported `amountUSD`
    Deal,
    /// `fills`: fill-oriented, notional must be derived from size x price
    Fill,
}

impl SchemaVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaVersion::Deal => "deal",
            SchemaVersion::Fill => "fill",
        }
    }

    pub fn adapter(&self) -> Box<dyn FeedSchema> {
        match self {
            SchemaVersion::Deal => Box::new(DealSchema),
            SchemaVersion::Fill => Box::new(FillSchema),
        }
    }

    pub fn all() -> [SchemaVersion; 2] {
        [SchemaVersion::Deal, SchemaVersion::Fill]
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Adapter between one upstream trade shape and the canonical trade
pub trait FeedSchema: Send + Sync {
    fn version(&self) -> SchemaVersion;

    /// Root query field holding the trade collection
    fn collection(&self) -> &'static str;

    /// GraphQL document for one page, timestamp descending
    fn build_query(&self, query: &PageQuery) -> String;

    fn normalize(&self, raw: &RawTrade) -> Result<NormalizedTrade, MalformedRecord>;
}

/// Deal-shaped trades (`fpmmTrades`)
pub struct DealSchema;

impl FeedSchema for DealSchema {
    fn version(&self) -> SchemaVersion {
        SchemaVersion::Deal
    }

    fn collection(&self) -> &'static str {
        "fpmmTrades"
    }

    fn build_query(&self, query: &PageQuery) -> String {
        let mut filters = vec![format!("creationTimestamp_gt: \"{}\"", query.after)];
        if let Some(before) = query.before {
            filters.push(format!("creationTimestamp_lt: \"{}\"", before));
        }
        if query.min_usd > Decimal::ZERO {
            filters.push(format!("amountUSD_gte: \"{}\"", query.min_usd.normalize()));
        }

        format!(
            r#"{{
  fpmmTrades(
    first: {},
    orderBy: creationTimestamp,
    orderDirection: desc,
    where: {{ {} }}
  ) {{
    id
    creationTimestamp
    title
    outcomeIndex
    type
    outcomeTokensAmount
    outcomeTokenPrice
    amountUSD
    creator {{ id }}
  }}
}}"#,
            query.page_size,
            filters.join(", ")
        )
    }

    fn normalize(&self, raw: &RawTrade) -> Result<NormalizedTrade, MalformedRecord> {
        let id = id_field(raw, "id")?;
        let timestamp = timestamp_field(raw, "creationTimestamp")?;
        let price = price_field(raw, "outcomeTokenPrice")?;
        let size = size_field(raw, "outcomeTokensAmount")?;
        let side = side_field(raw, "type")?;
        let outcome_index = outcome_field(raw, "outcomeIndex")?;

        let market = label_field(raw, "title", "question").unwrap_or_else(|| UNKNOWN_MARKET.to_string());
        let maker = label_field(raw, "creator", "id").unwrap_or_else(|| ZERO_ADDRESS.to_string());

        let trade = NormalizedTrade::new(id, timestamp, market, outcome_index, side, size, price, maker);

        // Reported notional is informational only
        if let Ok(reported) = decimal_field(raw, "amountUSD") {
            if diverges(reported, trade.usd_value) {
                debug!(
                    id = %trade.id,
                    reported = %reported,
                    derived = %trade.usd_value,
                    "reported amountUSD disagrees with size x price"
                );
            }
        }

        Ok(trade)
    }
}

/// Fill-shaped trades (`fills`)
pub struct FillSchema;

impl FeedSchema for FillSchema {
    fn version(&self) -> SchemaVersion {
        SchemaVersion::Fill
    }

    fn collection(&self) -> &'static str {
        "fills"
    }

    fn build_query(&self, query: &PageQuery) -> String {
        // No notional column upstream; the classifier enforces min_usd locally
        let mut filters = vec![format!("timestamp_gt: \"{}\"", query.after)];
        if let Some(before) = query.before {
            filters.push(format!("timestamp_lt: \"{}\"", before));
        }

        format!(
            r#"{{
  fills(
    first: {},
    orderBy: timestamp,
    orderDirection: desc,
    where: {{ {} }}
  ) {{
    id
    timestamp
    market {{ question }}
    outcomeIndex
    side
    size
    price
    maker
  }}
}}"#,
            query.page_size,
            filters.join(", ")
        )
    }

    fn normalize(&self, raw: &RawTrade) -> Result<NormalizedTrade, MalformedRecord> {
        let id = id_field(raw, "id")?;
        let timestamp = timestamp_field(raw, "timestamp")?;
        let price = price_field(raw, "price")?;
        let size = size_field(raw, "size")?;
        let side = side_field(raw, "side")?;
        let outcome_index = outcome_field(raw, "outcomeIndex")?;

        let market = label_field(raw, "market", "question").unwrap_or_else(|| UNKNOWN_MARKET.to_string());
        let maker = label_field(raw, "maker", "id").unwrap_or_else(|| ZERO_ADDRESS.to_string());

        Ok(NormalizedTrade::new(id, timestamp, market, outcome_index, side, size, price, maker))
    }
}

/// Why a raw record could not be normalized
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedRecord {
    Missing(&'static str),
    Invalid { field: &'static str, value: String },
}

impl fmt::Display for MalformedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(field) => write!(f, "missing required field '{}'", field),
            Self::Invalid { field, value } => write!(f, "invalid '{}': {}", field, value),
        }
    }
}

impl std::error::Error for MalformedRecord {}

fn present<'a>(raw: &'a RawTrade, field: &'static str) -> Result<&'a Value, MalformedRecord> {
    match raw.get(field) {
        None | Some(Value::Null) => Err(MalformedRecord::Missing(field)),
        Some(v) => Ok(v),
    }
}

fn invalid(field: &'static str, value: &Value) -> MalformedRecord {
    MalformedRecord::Invalid {
        field,
        value: value.to_string(),
    }
}

fn id_field(raw: &RawTrade, field: &'static str) -> Result<String, MalformedRecord> {
    match present(raw, field)? {
        Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(invalid(field, other)),
    }
}

fn decimal_field(raw: &RawTrade, field: &'static str) -> Result<Decimal, MalformedRecord> {
    let value = present(raw, field)?;
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        other => return Err(invalid(field, other)),
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| invalid(field, value))
}

fn price_field(raw: &RawTrade, field: &'static str) -> Result<Decimal, MalformedRecord> {
    let price = decimal_field(raw, field)?;
    if price < Decimal::ZERO || price > Decimal::ONE {
        return Err(MalformedRecord::Invalid {
            field,
            value: price.to_string(),
        });
    }
    Ok(price)
}

fn size_field(raw: &RawTrade, field: &'static str) -> Result<Decimal, MalformedRecord> {
    let size = decimal_field(raw, field)?;
    if size.is_sign_negative() && !size.is_zero() {
        return Err(MalformedRecord::Invalid {
            field,
            value: size.to_string(),
        });
    }
    Ok(size)
}

fn timestamp_field(raw: &RawTrade, field: &'static str) -> Result<i64, MalformedRecord> {
    let value = present(raw, field)?;
    let ts = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match ts {
        Some(ts) if ts > 0 => Ok(ts),
        _ => Err(invalid(field, value)),
    }
}

fn side_field(raw: &RawTrade, field: &'static str) -> Result<Side, MalformedRecord> {
    let value = present(raw, field)?;
    value
        .as_str()
        .and_then(Side::parse)
        .ok_or_else(|| invalid(field, value))
}

fn outcome_field(raw: &RawTrade, field: &'static str) -> Result<u32, MalformedRecord> {
    let value = present(raw, field)?;
    let idx = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    idx.and_then(|i| u32::try_from(i).ok())
        .ok_or_else(|| invalid(field, value))
}

/// Plain string, or an object carrying the label under `nested`
fn label_field(raw: &RawTrade, field: &str, nested: &str) -> Option<String> {
    let label = match raw.get(field)? {
        Value::String(s) => s.as_str(),
        Value::Object(obj) => obj.get(nested)?.as_str()?,
        _ => return None,
    };
    let label = label.trim();
    (!label.is_empty()).then(|| label.to_string())
}

/// Relative gap check; a gap too large to represent counts as diverged
fn diverges(reported: Decimal, derived: Decimal) -> bool {
    if derived.is_zero() {
        return !reported.is_zero();
    }
    reported
        .checked_sub(derived)
        .and_then(|gap| gap.checked_div(derived))
        .map_or(true, |ratio| ratio.abs() > USD_DIVERGENCE_TOLERANCE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawTrade {
        value.as_object().cloned().unwrap()
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_deal_normalizes_and_recomputes_usd() {
        let trade = DealSchema
            .normalize(&raw(json!({
                "id": "0xdeal-1",
                "creationTimestamp": "1700000000",
                "title": "Will BTC close above 100k?",
                "outcomeIndex": "1",
                "type": "Sell",
                "outcomeTokensAmount": "20000",
                "outcomeTokenPrice": "0.65",
                "amountUSD": "99999",
                "creator": { "id": "0xwhale" }
            })))
            .unwrap();

        assert_eq!(trade.id, "0xdeal-1");
        assert_eq!(trade.timestamp, 1_700_000_000);
        assert_eq!(trade.outcome_index, 1);
        assert_eq!(trade.side, Side::Sell);
        assert_eq!(trade.usd_value, dec("13000"));
        assert_eq!(trade.maker_address, "0xwhale");
    }

    #[test]
    fn test_fill_accepts_numeric_fields_and_defaults() {
        let trade = FillSchema
            .normalize(&raw(json!({
                "id": "fill-9",
                "timestamp": 1700000123,
                "outcomeIndex": 0,
                "side": "BUY",
                "size": 1500.5,
                "price": 0.5
            })))
            .unwrap();

        assert_eq!(trade.market, UNKNOWN_MARKET);
        assert_eq!(trade.maker_address, ZERO_ADDRESS);
        assert_eq!(trade.usd_value, dec("750.25"));
    }

    #[test]
    fn test_fill_nested_market_question() {
        let trade = FillSchema
            .normalize(&raw(json!({
                "id": "fill-10",
                "timestamp": "1700000123",
                "market": { "question": "Fed cut in March?" },
                "outcomeIndex": 1,
                "side": "sell",
                "size": "10",
                "price": "0.1",
                "maker": "0xabc"
            })))
            .unwrap();
        assert_eq!(trade.market, "Fed cut in March?");
        assert_eq!(trade.maker_address, "0xabc");
    }

    #[test]
    fn test_missing_required_fields() {
        let base = json!({
            "id": "x",
            "timestamp": "1700000000",
            "outcomeIndex": 0,
            "side": "BUY",
            "size": "10",
            "price": "0.5"
        });

        for field in ["id", "timestamp", "size", "price"] {
            let mut record = raw(base.clone());
            record.remove(field);
            assert_eq!(
                FillSchema.normalize(&record),
                Err(MalformedRecord::Missing(field)),
                "field {}",
                field
            );
        }
    }

    #[test]
    fn test_unparseable_and_out_of_range_values() {
        let mut record = raw(json!({
            "id": "x",
            "timestamp": "yesterday",
            "outcomeIndex": 0,
            "side": "BUY",
            "size": "10",
            "price": "0.5"
        }));
        assert!(matches!(
            FillSchema.normalize(&record),
            Err(MalformedRecord::Invalid { field: "timestamp", .. })
        ));

        record.insert("timestamp".into(), json!(1700000000));
        record.insert("price".into(), json!("1.5"));
        assert!(matches!(
            FillSchema.normalize(&record),
            Err(MalformedRecord::Invalid { field: "price", .. })
        ));

        record.insert("price".into(), json!("0.5"));
        record.insert("size".into(), json!("-3"));
        assert!(matches!(
            FillSchema.normalize(&record),
            Err(MalformedRecord::Invalid { field: "size", .. })
        ));
    }

    #[test]
    fn test_deal_query_carries_filters() {
        let q = DealSchema.build_query(&PageQuery {
            after: 100,
            before: Some(200),
            min_usd: dec("1000.00"),
            page_size: 50,
        });
        assert!(q.contains("fpmmTrades("));
        assert!(q.contains("first: 50"));
        assert!(q.contains("creationTimestamp_gt: \"100\""));
        assert!(q.contains("creationTimestamp_lt: \"200\""));
        assert!(q.contains("amountUSD_gte: \"1000\""));
        assert!(q.contains("orderDirection: desc"));
    }

    #[test]
    fn test_fill_query_without_upper_bound() {
        let q = FillSchema.build_query(&PageQuery {
            after: 100,
            before: None,
            min_usd: dec("1000"),
            page_size: 1000,
        });
        assert!(q.contains("fills("));
        assert!(q.contains("timestamp_gt: \"100\""));
        assert!(!q.contains("timestamp_lt"));
        assert!(!q.contains("amountUSD"));
    }

    #[test]
    fn test_divergence_tolerance() {
        assert!(!diverges(dec("1005"), dec("1000")));
        assert!(diverges(dec("1020"), dec("1000")));
        assert!(diverges(dec("1"), Decimal::ZERO));
    }

    #[test]
    fn test_unrepresentable_gap_counts_as_diverged() {
        let dust = dec("0.00000000000000000000000001");
        assert!(diverges(dec("5000"), dust));
    }

    #[test]
    fn test_dust_price_with_large_reported_amount() {
        let trade = DealSchema
            .normalize(&raw(json!({
                "id": "0xdust",
                "creationTimestamp": "1700000000",
                "outcomeIndex": "0",
                "type": "Buy",
                "outcomeTokensAmount": "1",
                "outcomeTokenPrice": "0.00000000000000000000000001",
                "amountUSD": "5000"
            })))
            .unwrap();
        assert_eq!(trade.usd_value, dec("0.00000000000000000000000001"));
    }
}
