use crate::{
    agents::AgentRegistry,
    decode::{
        PredictionRecord,
        SealRecord,
    },
    price::price_from_fixed,
};
use serde::Serialize;

/// A locked batch of predictions as the client presents it.
///
/// `agent_ids[i]` and `predictions[i]` describe the same ledger prediction;
/// position is the only link between the two.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Seal {
    pub id: u64,
    pub unlock_time: u64,
    pub creator: String,
    pub is_unlocked: bool,
    pub agent_ids: Vec<u32>,
    pub predictions: Vec<f64>,
}

impl Seal {
    pub fn assemble(
        id: u64,
        record: &SealRecord,
        predictions: &[PredictionRecord],
        registry: &AgentRegistry,
    ) -> Self {
        let (agent_ids, prices): (Vec<u32>, Vec<f64>) = predictions
            .iter()
            .map(|p| (registry.resolve_id(&p.name), price_from_fixed(p.price)))
            .unzip();
        Self {
            id,
            unlock_time: record.target_time,
            creator: record.creator.clone(),
            is_unlocked: record.revealed,
            agent_ids,
            predictions: prices,
        }
    }

    pub fn can_unlock(&self, now: u64) -> bool {
        self.unlock_time <= now && !self.is_unlocked
    }

    /// `(agent_id, price)` pairs in ledger order.
    pub fn pairs(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.agent_ids
            .iter()
            .copied()
            .zip(self.predictions.iter().copied())
    }
}

pub fn format_time_remaining(unlock_time: u64, now: u64) -> String {
    let Some(remaining) = unlock_time.checked_sub(now).filter(|r| *r > 0) else {
        return String::from("ready");
    };
    let hours = remaining / 3600;
    let minutes = (remaining % 3600) / 60;
    let seconds = remaining % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// `0x1234…abcd`
pub fn short_address(address: &str) -> String {
    if address.chars().count() <= 12 {
        return address.to_string();
    }
    let head: String = address.chars().take(6).collect();
    let tail: String = address
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("{head}…{tail}")
}
