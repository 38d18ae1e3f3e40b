use rand::Rng;
use std::{
    fmt,
    str::FromStr,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Agent {
    pub id: u32,
    pub name: &'static str,
    pub avatar: &'static str,
}

pub const AGENTS: [Agent; 5] = [
    Agent {
        id: 1,
        name: "AlphaBot",
        avatar: "🤖",
    },
    Agent {
        id: 2,
        name: "CryptoEye",
        avatar: "🦾",
    },
    Agent {
        id: 3,
        name: "ChainBrain",
        avatar: "🧠",
    },
    Agent {
        id: 4,
        name: "PriceGuru",
        avatar: "🔮",
    },
    Agent {
        id: 5,
        name: "MoonWatcher",
        avatar: "🌙",
    },
];

/// Agents that only ever show up on the leaderboard.
const LEADERBOARD_AVATARS: [(&str, &str); 2] = [("DataPred", "📊"), ("BlockSense", "🪙")];

pub const DEFAULT_AVATAR: &str = "🤖";

/// Asset the ledger settles a seal against; the value is the contract's
/// asset-type selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AssetType {
    Btc,
    #[default]
    Eth,
}

impl AssetType {
    pub fn selector(self) -> u64 {
        match self {
            AssetType::Btc => 0,
            AssetType::Eth => 1,
        }
    }

    pub fn ticker(self) -> &'static str {
        match self {
            AssetType::Btc => "BTC",
            AssetType::Eth => "ETH",
        }
    }

    /// Range agents draw their predictions from.
    fn prediction_range(self) -> std::ops::Range<f64> {
        match self {
            AssetType::Btc => 20_000.0..100_000.0,
            AssetType::Eth => 1_000.0..5_000.0,
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ticker())
    }
}

impl FromStr for AssetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "btc" => Ok(AssetType::Btc),
            "eth" => Ok(AssetType::Eth),
            other => Err(format!("unknown asset '{other}', expected eth or btc")),
        }
    }
}

/// One agent's price call, ready to be sealed.
#[derive(Clone, Debug, PartialEq)]
pub struct AgentPrediction {
    pub agent_id: u32,
    pub name: String,
    pub price: f64,
}

#[derive(Clone, Copy, Debug)]
pub struct AgentRegistry {
    agents: &'static [Agent],
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self { agents: &AGENTS }
    }
}

impl AgentRegistry {
    pub fn all(&self) -> &'static [Agent] {
        self.agents
    }

    pub fn by_id(&self, id: u32) -> Option<&'static Agent> {
        self.agents.iter().find(|agent| agent.id == id)
    }

    pub fn by_name(&self, name: &str) -> Option<&'static Agent> {
        self.agents
            .iter()
            .find(|agent| agent.name.eq_ignore_ascii_case(name))
    }

    /// Unknown names resolve to `0`.
    pub fn resolve_id(&self, name: &str) -> u32 {
        self.by_name(name).map(|agent| agent.id).unwrap_or(0)
    }

    pub fn avatar_for(&self, name: &str) -> &'static str {
        if let Some(agent) = self.by_name(name) {
            return agent.avatar;
        }
        LEADERBOARD_AVATARS
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(name))
            .map(|(_, avatar)| *avatar)
            .unwrap_or(DEFAULT_AVATAR)
    }

    /// Draws one price per selected agent, rounded to cents. Ids that are not
    /// registered are skipped.
    pub fn predict<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        asset: AssetType,
        agent_ids: &[u32],
    ) -> Vec<AgentPrediction> {
        agent_ids
            .iter()
            .filter_map(|id| self.by_id(*id))
            .map(|agent| {
                let raw = rng.random_range(asset.prediction_range());
                AgentPrediction {
                    agent_id: agent.id,
                    name: agent.name.to_string(),
                    price: (raw * 100.0).round() / 100.0,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::rng::Mulberry32;

    #[test]
    fn resolve_id__any_case__finds_registered_agent() {
        let registry = AgentRegistry::default();
        assert_eq!(registry.resolve_id("AlphaBot"), 1);
        assert_eq!(registry.resolve_id("alphabot"), 1);
        assert_eq!(registry.resolve_id("ALPHABOT"), 1);
        assert_eq!(registry.resolve_id("moonwatcher"), 5);
    }

    #[test]
    fn resolve_id__unknown_or_empty_name__is_zero() {
        let registry = AgentRegistry::default();
        assert_eq!(registry.resolve_id("GammaBot"), 0);
        assert_eq!(registry.resolve_id(""), 0);
    }

    #[test]
    fn avatar_for__leaderboard_only_and_unknown_names__fall_back() {
        let registry = AgentRegistry::default();
        assert_eq!(registry.avatar_for("chainbrain"), "🧠");
        assert_eq!(registry.avatar_for("datapred"), "📊");
        assert_eq!(registry.avatar_for("Nobody"), DEFAULT_AVATAR);
    }

    #[test]
    fn predict__eth__prices_in_range_with_two_decimals() {
        // given
        let registry = AgentRegistry::default();
        let mut rng = Mulberry32::new(42);

        // when
        let predictions = registry.predict(&mut rng, AssetType::Eth, &[3, 1, 99]);

        // then
        let ids: Vec<u32> = predictions.iter().map(|p| p.agent_id).collect();
        assert_eq!(ids, vec![3, 1]);
        for p in &predictions {
            assert!((1_000.0..=5_000.0).contains(&p.price));
            assert_eq!((p.price * 100.0).round() / 100.0, p.price);
        }
        assert_eq!(predictions[0].name, "ChainBrain");
    }

    #[test]
    fn asset_type__parses_case_insensitively_and_maps_selector() {
        assert_eq!("ETH".parse::<AssetType>(), Ok(AssetType::Eth));
        assert_eq!("btc".parse::<AssetType>(), Ok(AssetType::Btc));
        assert!("doge".parse::<AssetType>().is_err());
        assert_eq!(AssetType::default().selector(), 1);
        assert_eq!(AssetType::Btc.selector(), 0);
    }
}
