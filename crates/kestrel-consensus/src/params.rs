//! Per-network consensus parameters.
//!
//! `ConsensusParams` is immutable once built. Presets exist for each
//! [`Network`]; private networks can deserialize a full parameter set (with
//! the `serde` feature) and must pass [`ConsensusParams::validate`] before use.

use core::fmt;
use core::str::FromStr;

use kestrel_core::Hash32;
use num_bigint::BigUint;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::chain::ChainNode;
use crate::difficulty::{bits_to_target, target_from_hash, target_to_bits};
use crate::error::ConsensusError;

/// Network selector for parameter presets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Network {
    /// Production network.
    Mainnet,
    /// Public test network (min-difficulty blocks allowed).
    Testnet,
    /// Local regression-test network (no retargeting).
    Regtest,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Regtest => "regtest",
        })
    }
}

impl FromStr for Network {
    type Err = ConsensusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "main" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            "regtest" => Ok(Network::Regtest),
            _ => Err(ConsensusError::InvalidParams("unknown network")),
        }
    }
}

/// Immutable consensus configuration for one network.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConsensusParams {
    /// Network these parameters belong to.
    pub network: Network,
    /// Easiest permitted target, big-endian.
    pub pow_limit: Hash32,
    /// Up to and including this tip height the next block gets the easy target.
    pub height_cp: u64,
    /// Above this tip height the next block gets the easy target again.
    ///
    /// One-time network rule switch; `None` disables it.
    pub easy_target_after: Option<u64>,
    /// First height at which the stake-fork rules are enforced.
    pub pos_fork_height: u64,
    /// Number of heights the stake lottery looks back over.
    pub pos_lookback: u64,
    /// Target seconds between blocks.
    pub pow_target_spacing: i64,
    /// Seconds per retarget window before the fork.
    pub pow_target_timespan: i64,
    /// Post-fork retarget windows are `pow_target_timespan / pos_timespan_divisor`.
    pub pos_timespan_divisor: i64,
    /// Testnet carve-out: allow min-difficulty blocks after a long gap.
    pub allow_min_difficulty_blocks: bool,
    /// Tip height from which the min-difficulty carve-out applies.
    pub height_min_diff: u64,
    /// Disable retargeting entirely (regtest).
    pub no_retargeting: bool,
    /// Scale the target down for blocks that lack helper blocks.
    ///
    /// When `false` the missing-helper count is still computed and cached but
    /// the scaling factor is pinned to 1.
    pub helper_penalty: bool,
    /// Reject helper blocks whose signature does not recover to the winner.
    ///
    /// Live network behaviour accepts them (the mismatch is only logged).
    pub enforce_helper_signature: bool,
}

fn limit_with_leading_zero_bytes(zero_bytes: usize) -> Hash32 {
    let mut b = [0xffu8; 32];
    b[..zero_bytes].fill(0);
    Hash32(b)
}

impl ConsensusParams {
    /// Mainnet parameters.
    pub fn mainnet() -> Self {
        Self {
            network: Network::Mainnet,
            pow_limit: limit_with_leading_zero_bytes(4),
            height_cp: 2_016,
            easy_target_after: None,
            pos_fork_height: 100_000,
            pos_lookback: 10_000,
            pow_target_spacing: 10 * 60,
            pow_target_timespan: 14 * 24 * 60 * 60,
            pos_timespan_divisor: 14,
            allow_min_difficulty_blocks: false,
            height_min_diff: 0,
            no_retargeting: false,
            helper_penalty: true,
            enforce_helper_signature: false,
        }
    }

    /// Testnet parameters.
    pub fn testnet() -> Self {
        Self {
            network: Network::Testnet,
            height_cp: 0,
            pos_fork_height: 5_000,
            pos_lookback: 1_000,
            allow_min_difficulty_blocks: true,
            height_min_diff: 1_000,
            ..Self::mainnet()
        }
    }

    /// Regression-test parameters.
    pub fn regtest() -> Self {
        let mut pow_limit = [0xffu8; 32];
        pow_limit[0] = 0x7f;
        Self {
            network: Network::Regtest,
            pow_limit: Hash32(pow_limit),
            height_cp: 0,
            pos_fork_height: 500,
            pos_lookback: 100,
            allow_min_difficulty_blocks: true,
            height_min_diff: 0,
            no_retargeting: true,
            ..Self::mainnet()
        }
    }

    /// Preset for `network`.
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet => Self::mainnet(),
            Network::Testnet => Self::testnet(),
            Network::Regtest => Self::regtest(),
        }
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), ConsensusError> {
        if self.pow_target_spacing <= 0 {
            return Err(ConsensusError::InvalidParams("target spacing must be positive"));
        }
        if self.pos_timespan_divisor <= 0 {
            return Err(ConsensusError::InvalidParams(
                "stake timespan divisor must be positive",
            ));
        }
        if self.difficulty_adjustment_interval(false) == 0
            || self.difficulty_adjustment_interval(true) == 0
        {
            return Err(ConsensusError::InvalidParams(
                "retarget window shorter than one block",
            ));
        }
        if self.pos_lookback == 0 {
            return Err(ConsensusError::InvalidParams("lottery lookback must be positive"));
        }
        bits_to_target(self.pow_limit_bits())
            .map_err(|_| ConsensusError::InvalidParams("pow limit has no valid compact form"))?;
        Ok(())
    }

    /// Seconds per retarget window for the given era.
    pub fn target_timespan(&self, fork: bool) -> i64 {
        if fork {
            self.pow_target_timespan / self.pos_timespan_divisor
        } else {
            self.pow_target_timespan
        }
    }

    /// Blocks per retarget window for the given era.
    pub fn difficulty_adjustment_interval(&self, fork: bool) -> u64 {
        if self.pow_target_spacing <= 0 {
            return 0;
        }
        u64::try_from(self.target_timespan(fork) / self.pow_target_spacing).unwrap_or(0)
    }

    /// `pow_limit` as a number.
    pub fn pow_limit_target(&self) -> BigUint {
        target_from_hash(&self.pow_limit)
    }

    /// `pow_limit` in compact form.
    pub fn pow_limit_bits(&self) -> u32 {
        target_to_bits(&self.pow_limit_target())
    }

    /// Whether the stake-fork rules apply at `node`.
    ///
    /// There is no fork before genesis.
    pub fn enforce_proof_of_stake(&self, node: Option<&ChainNode>) -> bool {
        node.is_some_and(|n| n.height >= self.pos_fork_height)
    }
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self::mainnet()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_consistent() {
        for network in [Network::Mainnet, Network::Testnet, Network::Regtest] {
            let params = ConsensusParams::for_network(network);
            params.validate().expect("preset validates");
            assert_eq!(params.network, network);
        }
    }

    #[test]
    fn mainnet_intervals() {
        let params = ConsensusParams::mainnet();
        assert_eq!(params.difficulty_adjustment_interval(false), 2016);
        assert_eq!(params.difficulty_adjustment_interval(true), 144);
        assert_eq!(params.target_timespan(true), 86_400);
        assert_eq!(params.pow_limit_bits(), 0x1d00_ffff);
    }

    #[test]
    fn rejects_degenerate_windows() {
        let params = ConsensusParams {
            pow_target_timespan: 60,
            pow_target_spacing: 600,
            ..ConsensusParams::mainnet()
        };
        assert!(matches!(
            params.validate(),
            Err(ConsensusError::InvalidParams(_))
        ));

        let params = ConsensusParams {
            pos_lookback: 0,
            ..ConsensusParams::mainnet()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn stake_rules_start_at_fork_height() {
        use crate::chain::ChainIndex;
        use kestrel_core::{BlockHeader, PROTOCOL_VERSION};

        let params = ConsensusParams {
            pos_fork_height: 2,
            ..ConsensusParams::regtest()
        };
        let mut index = ChainIndex::new();
        let mut prev = Hash32::zero();
        let mut ids = Vec::new();
        for h in 0..4u64 {
            let header = BlockHeader {
                version: PROTOCOL_VERSION,
                prev,
                merkle_root: Hash32::zero(),
                timestamp: 1_000 + h,
                bits: 0x207f_ffff,
                nonce: h,
            };
            let id = index.insert_header(&header).expect("insert");
            prev = index.node(id).hash;
            ids.push(id);
        }

        assert!(!params.enforce_proof_of_stake(None));
        let active: Vec<bool> = ids
            .iter()
            .map(|&id| params.enforce_proof_of_stake(Some(index.node(id))))
            .collect();
        assert_eq!(active, [false, false, true, true]);
    }

    #[test]
    fn network_names_parse() {
        assert_eq!("Mainnet".parse::<Network>().expect("parse"), Network::Mainnet);
        assert_eq!("regtest".parse::<Network>().expect("parse"), Network::Regtest);
        assert!("moon".parse::<Network>().is_err());
        assert_eq!(Network::Testnet.to_string(), "testnet");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn params_roundtrip_through_json() {
        let params = ConsensusParams::testnet();
        let json = serde_json::to_string(&params).expect("serialize");
        let back: ConsensusParams = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, params);
    }
}
