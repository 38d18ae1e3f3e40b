use crate::{
    agents::AgentRegistry,
    decode::{
        RawRecord,
        as_name,
        as_u64,
    },
    price::price_from_fixed,
};
use serde::Serialize;
use serde_json::Value;

const NAMES: (usize, &str) = (0, "names");
const ACCURACIES: (usize, &str) = (1, "accuracies");
const TOTAL_PREDICTIONS: (usize, &str) = (2, "totalPredictions");
const WIN_COUNTS: (usize, &str) = (3, "winCounts");
const LAST_PRICES: (usize, &str) = (4, "lastPrices");

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub name: String,
    pub avatar: &'static str,
    pub accuracy: u64,
    pub total_predictions: u64,
    pub win_count: u64,
    pub last_price: f64,
}

/// Decodes `getGlobalLeaderboard` into one entry per agent that has made at
/// least one prediction, keeping ledger order.
///
/// The five parallel arrays may come back as a tuple or as named fields. The
/// `names` array decides the row count; shorter columns fill with zeroes.
pub fn decode_leaderboard(raw: &RawRecord, registry: &AgentRegistry) -> Vec<LeaderboardEntry> {
    let names = column(raw, NAMES);
    let accuracies = column(raw, ACCURACIES);
    let totals = column(raw, TOTAL_PREDICTIONS);
    let wins = column(raw, WIN_COUNTS);
    let last_prices = column(raw, LAST_PRICES);

    names
        .iter()
        .enumerate()
        .map(|(row, name)| {
            let name = as_name(Some(name));
            LeaderboardEntry {
                avatar: registry.avatar_for(&name),
                name,
                accuracy: as_u64(accuracies.get(row)),
                total_predictions: as_u64(totals.get(row)),
                win_count: as_u64(wins.get(row)),
                last_price: price_from_fixed(as_u64(last_prices.get(row))),
            }
        })
        .filter(|entry| entry.total_predictions > 0)
        .collect()
}

fn column<'a>(raw: &'a RawRecord, (index, key): (usize, &str)) -> &'a [Value] {
    match raw.field(index, key) {
        Some(Value::Array(items)) => items.as_slice(),
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use serde_json::json;

    fn decode(value: Value) -> Vec<LeaderboardEntry> {
        decode_leaderboard(&RawRecord::from(value), &AgentRegistry::default())
    }

    #[test]
    fn decode_leaderboard__positional_arrays__keeps_order_and_scales_price() {
        // given
        let raw = json!([
            ["MoonWatcher", "DataPred", "Nobody"],
            [91, 80, 12],
            [20, 10, 3],
            [7, 4, 1],
            [450_000_000_000u64, "0x2540be400", 0]
        ]);

        // when
        let entries = decode(raw);

        // then
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["MoonWatcher", "DataPred", "Nobody"]);
        assert_eq!(entries[0].avatar, "🌙");
        assert_eq!(entries[1].avatar, "📊");
        assert_eq!(entries[2].avatar, "🤖");
        assert_eq!(entries[0].last_price, 4500.0);
        assert_eq!(entries[1].last_price, 100.0);
        assert_eq!(entries[0].win_count, 7);
    }

    #[test]
    fn decode_leaderboard__inactive_agents__are_filtered_out() {
        let raw = json!({
            "names": ["AlphaBot", "CryptoEye"],
            "accuracies": [0, 55],
            "totalPredictions": [0, 2],
            "winCounts": [0, 1],
            "lastPrices": [0, 100_000_000]
        });

        let entries = decode(raw);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "CryptoEye");
        assert_eq!(entries[0].accuracy, 55);
    }

    #[test]
    fn decode_leaderboard__ragged_columns__fill_missing_cells_with_zero() {
        // given
        let raw = json!([["ChainBrain", "PriceGuru"], [70], [4, 9], [], [1]]);

        // when
        let entries = decode(raw);

        // then
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].accuracy, 0);
        assert_eq!(entries[1].win_count, 0);
        assert_eq!(entries[1].last_price, 0.0);
    }

    #[test]
    fn decode_leaderboard__malformed_payload__is_empty() {
        assert!(decode(json!(null)).is_empty());
        assert!(decode(json!("garbage")).is_empty());
        assert!(decode(json!([42, [1], [1], [1], [1]])).is_empty());
    }
}
