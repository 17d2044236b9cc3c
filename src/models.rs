use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel counterparty used when the feed omits the trader address
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Market label used when the feed omits the market title
pub const UNKNOWN_MARKET: &str = "Unknown Market";

/// Trade direction as reported by the venue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    /// Case-insensitive parse; both feed generations spell sides differently
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "BUY" => Some(Side::Buy),
            "SELL" => Some(Side::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity tiers, ordered from smallest to largest notional.
///
/// `Minnow` is the floor tier: anything that clears the minimum USD threshold
/// but none of the configured tier thresholds lands here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Minnow,
    Dolphin,
    Shark,
    Whale,
    Leviathan,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Minnow => "MINNOW",
            Tier::Dolphin => "DOLPHIN",
            Tier::Shark => "SHARK",
            Tier::Whale => "WHALE",
            Tier::Leviathan => "LEVIATHAN",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "MINNOW" => Some(Tier::Minnow),
            "DOLPHIN" => Some(Tier::Dolphin),
            "SHARK" => Some(Tier::Shark),
            "WHALE" => Some(Tier::Whale),
            "LEVIATHAN" => Some(Tier::Leviathan),
            _ => None,
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Tier::Minnow => "🐟",
            Tier::Dolphin => "🐬",
            Tier::Shark => "🦈",
            Tier::Whale => "🐋",
            Tier::Leviathan => "🐳",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trade after schema normalization, before severity classification.
///
/// `usd_value` is always `size * price`; the reported notional from the feed
/// (if any) never makes it into this struct.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTrade {
    pub id: String,
    pub timestamp: i64,
    pub market: String,
    pub outcome_index: u32,
    pub side: Side,
    pub size: Decimal,
    pub price: Decimal,
    pub usd_value: Decimal,
    pub maker_address: String,
}

impl NormalizedTrade {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        timestamp: i64,
        market: String,
        outcome_index: u32,
        side: Side,
        size: Decimal,
        price: Decimal,
        maker_address: String,
    ) -> Self {
        Self {
            id,
            timestamp,
            market,
            outcome_index,
            side,
            size,
            price,
            usd_value: size * price,
            maker_address,
        }
    }
}

/// A qualifying whale trade as persisted in the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: String,
    pub timestamp: i64,
    pub market: String,
    pub outcome_index: u32,
    pub side: Side,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub size: Decimal,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub usd_value: Decimal,
    pub maker_address: String,
    pub tier: Tier,
}

impl TradeRecord {
    pub fn classified(trade: NormalizedTrade, tier: Tier) -> Self {
        Self {
            id: trade.id,
            timestamp: trade.timestamp,
            market: trade.market,
            outcome_index: trade.outcome_index,
            side: trade.side,
            size: trade.size,
            price: trade.price,
            usd_value: trade.usd_value,
            maker_address: trade.maker_address,
            tier,
        }
    }

    /// Age in seconds relative to `now`; negative for clock-skewed future trades
    #[inline]
    pub fn age_secs(&self, now: i64) -> i64 {
        now - self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_usd_value_is_derived() {
        let trade = NormalizedTrade::new(
            "0xabc".into(),
            1_700_000_000,
            "Will it rain?".into(),
            0,
            Side::Buy,
            dec("2500"),
            dec("0.42"),
            ZERO_ADDRESS.into(),
        );
        assert_eq!(trade.usd_value, dec("1050"));
    }

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Minnow < Tier::Dolphin);
        assert!(Tier::Shark < Tier::Whale);
        assert!(Tier::Whale < Tier::Leviathan);
    }

    #[test]
    fn test_side_parse() {
        assert_eq!(Side::parse("Buy"), Some(Side::Buy));
        assert_eq!(Side::parse(" sell "), Some(Side::Sell));
        assert_eq!(Side::parse("hold"), None);
    }

    #[test]
    fn test_record_serializes_exact_numbers() {
        let record = TradeRecord::classified(
            NormalizedTrade::new(
                "t1".into(),
                100,
                UNKNOWN_MARKET.into(),
                1,
                Side::Sell,
                dec("20000.123456"),
                dec("0.613377"),
                ZERO_ADDRESS.into(),
            ),
            Tier::Whale,
        );
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"usd_value\":12267.615725070912"), "{}", json);
        assert!(json.contains("\"tier\":\"WHALE\""));
        assert!(json.contains("\"side\":\"SELL\""));

        let back: TradeRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.usd_value, back.size * back.price);
    }

    #[test]
    fn test_record_reads_plain_json_numbers() {
        let back: TradeRecord = serde_json::from_str(
            r#"{"id":"t2","timestamp":5,"market":"m","outcome_index":0,"side":"BUY",
                "size":1000,"price":0.5,"usd_value":500.0,"maker_address":"0x0","tier":"SHARK"}"#,
        )
        .unwrap();
        assert_eq!(back.usd_value, dec("500"));
        assert_eq!(back.price, dec("0.5"));
    }
}
