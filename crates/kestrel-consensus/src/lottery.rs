// Consensus-critical. Changes require a network upgrade + tests.
//! Supply-weighted stake lottery.
//!
//! Every matured atom issued inside the lookback window is one ticket. The
//! block hash at the drawn height picks a ticket, modulo the number of
//! tickets; the ticket lands in one output of one earlier block, and that
//! output's destination wins.
//!
//! Tickets are ordered by height, then by transaction, then by output. The
//! draw is a pure function of the chain and the supply ledger.

use kestrel_core::{extract_destination, KeyId};
use num_bigint::BigUint;
use thiserror::Error;
use tracing::debug;

use crate::chain::{ChainView, NodeId};
use crate::params::ConsensusParams;

/// Why a draw produced no winner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum NoWinner {
    /// No supply matured inside the window.
    #[error("no mature supply in lottery window")]
    EmptyWindow,
    /// The drawn height is above the given node.
    #[error("no ancestor at drawn height")]
    NoAncestor,
    /// The ledger never crossed the winning ticket.
    #[error("winning block not found")]
    WinningBlockNotFound,
    /// The winning block's body could not be read.
    #[error("winning block unavailable")]
    BlockUnavailable,
    /// The winning block's outputs do not reach the winning ticket.
    #[error("winning output not found")]
    OutputNotFound,
    /// The winning output's script has no extractable destination.
    #[error("winning output has no destination")]
    NoDestination,
}

/// A successful draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LotteryWinner {
    /// Winning payout address.
    pub address: KeyId,
    /// Drawn ticket, relative to the start of the window.
    pub winning_sat: u64,
    /// Height of the block holding the winning output.
    pub winning_height: u64,
    /// Tickets in the window.
    pub money_supply_used: u64,
}

/// First height of the lottery window ending at `height`.
pub fn window_start(height: u64, params: &ConsensusParams) -> u64 {
    height
        .saturating_add(1)
        .saturating_sub(params.pos_lookback)
        .max(1)
}

/// Run the lottery for `height` on the chain ending at `node`.
pub fn draw(
    view: &ChainView<'_>,
    node: NodeId,
    height: u64,
    params: &ConsensusParams,
) -> Result<LotteryWinner, NoWinner> {
    let at = view
        .index
        .ancestor(node, height)
        .ok_or(NoWinner::NoAncestor)?;

    let start = window_start(height, params);
    let base = view.mature_supply(start - 1);
    let supply_used = |h: u64| view.mature_supply(h).saturating_sub(base);

    let money_supply_used = supply_used(height);
    if money_supply_used == 0 || start > height {
        return Err(NoWinner::EmptyWindow);
    }

    let entropy = BigUint::from_bytes_be(view.node(at).hash.as_bytes());
    let winning_sat = (entropy % money_supply_used)
        .iter_u64_digits()
        .next()
        .unwrap_or(0);

    // First height whose cumulative supply passes the ticket.
    let (mut lo, mut hi) = (start, height);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if supply_used(mid) > winning_sat {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    if supply_used(lo) <= winning_sat {
        return Err(NoWinner::WinningBlockNotFound);
    }

    let winning_height = lo - 1;
    let winning_block_number = supply_used(winning_height);
    let winning_id = view
        .index
        .ancestor(at, winning_height)
        .ok_or(NoWinner::WinningBlockNotFound)?;

    debug!(
        height,
        money_supply_used,
        winning_sat,
        winning_block_number,
        winning_height,
        "lottery draw"
    );

    let block = view.read_block(winning_id).map_err(|err| {
        debug!(winning_height, %err, "winning block unavailable");
        NoWinner::BlockUnavailable
    })?;

    let mut counter = winning_block_number;
    let script = block
        .txs
        .iter()
        .flat_map(|tx| tx.outputs.iter())
        .find(|out| {
            counter = counter.saturating_add(out.value.0);
            counter >= winning_sat
        })
        .map(|out| out.script_pubkey.as_slice())
        .ok_or(NoWinner::OutputNotFound)?;

    let address = extract_destination(script).ok_or(NoWinner::NoDestination)?;

    Ok(LotteryWinner {
        address,
        winning_sat,
        winning_height,
        money_supply_used,
    })
}

/// Winning address for `height` on the chain ending at `node`.
///
/// Successful draws are memoized on the node at `height`.
pub fn get_winning_address(
    view: &ChainView<'_>,
    node: NodeId,
    height: u64,
    params: &ConsensusParams,
) -> Option<KeyId> {
    let at = view.index.ancestor(node, height)?;
    if let Some(address) = view.node(at).winning_address() {
        return Some(address);
    }
    match draw(view, at, height, params) {
        Ok(winner) => Some(view.node(at).memoize_winning_address(winner.address)),
        Err(reason) => {
            debug!(height, %reason, "no lottery winner");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainIndex;
    use kestrel_core::{
        pay_to_key_id, Amount, Block, BlockHeader, Hash32, Transaction, TxOut, PROTOCOL_VERSION,
    };
    use kestrel_state::{MatureSupplyLedger, MemoryBlockStore, SupplyLedger};

    fn block(prev: Hash32, nonce: u64, outputs: &[(u64, u8)]) -> Block {
        Block {
            header: BlockHeader {
                version: PROTOCOL_VERSION,
                prev,
                merkle_root: Hash32::zero(),
                timestamp: 1_000 + nonce,
                bits: 0x207f_ffff,
                nonce,
            },
            txs: vec![Transaction {
                version: PROTOCOL_VERSION,
                inputs: vec![],
                outputs: outputs
                    .iter()
                    .map(|&(value, owner)| TxOut {
                        value: Amount(value),
                        script_pubkey: pay_to_key_id(&KeyId([owner; 20])),
                    })
                    .collect(),
                lock_time: 0,
            }],
            helper: None,
        }
    }

    /// Block `h` pays `paid[h]` to the owner byte `h`; the ledger is given separately.
    fn chain(paid: &[u64], cumulative: Vec<u64>) -> (ChainIndex, NodeId, MatureSupplyLedger) {
        let mut index = ChainIndex::new();
        let mut prev = Hash32::zero();
        let mut tip = None;
        for (h, &amount) in paid.iter().enumerate() {
            let id = index
                .insert_block(block(prev, h as u64, &[(amount, h as u8)]))
                .expect("insert");
            prev = index.node(id).hash;
            tip = Some(id);
        }
        let ledger = MatureSupplyLedger::from_cumulative(cumulative).expect("ledger");
        (index, tip.expect("non-empty"), ledger)
    }

    #[test]
    fn window_start_clamps_to_one() {
        let params = ConsensusParams {
            pos_lookback: 10,
            ..ConsensusParams::regtest()
        };
        assert_eq!(window_start(0, &params), 1);
        assert_eq!(window_start(5, &params), 1);
        assert_eq!(window_start(10, &params), 1);
        assert_eq!(window_start(11, &params), 2);
    }

    #[test]
    fn empty_window_has_no_winner() {
        let (index, tip, ledger) = chain(&[50, 50, 50], vec![0, 0, 0]);
        let store = MemoryBlockStore::new();
        let view = ChainView::new(&index, &store, &ledger);
        let params = ConsensusParams::regtest();
        assert_eq!(draw(&view, tip, 2, &params), Err(NoWinner::EmptyWindow));
        assert_eq!(draw(&view, tip, 9, &params), Err(NoWinner::NoAncestor));
        assert_eq!(get_winning_address(&view, tip, 2, &params), None);
    }

    #[test]
    fn draw_is_deterministic_and_in_window() {
        let (index, tip, ledger) = chain(&[50; 8], vec![0, 7, 10, 21, 21, 26, 35, 37]);
        let store = MemoryBlockStore::new();
        let view = ChainView::new(&index, &store, &ledger);
        let params = ConsensusParams {
            pos_lookback: 5,
            ..ConsensusParams::regtest()
        };

        for height in 1..=7u64 {
            let winner = draw(&view, tip, height, &params).expect("winner");
            assert_eq!(Ok(winner), draw(&view, tip, height, &params));

            let start = window_start(height, &params);
            let base = ledger.cumulative_mature_supply(start - 1);
            assert_eq!(
                winner.money_supply_used,
                ledger.cumulative_mature_supply(height) - base
            );
            assert!(winner.winning_sat < winner.money_supply_used);
            assert!(winner.winning_height + 1 >= start);
            assert!(winner.winning_height < height);
            // The ticket falls inside the issuance of the height after the winner.
            let crossing = winner.winning_height + 1;
            assert!(ledger.cumulative_mature_supply(crossing) - base > winner.winning_sat);
            assert!(ledger.cumulative_mature_supply(winner.winning_height) - base <= winner.winning_sat);
            // Single-owner blocks: the owner byte is the block height.
            assert_eq!(winner.address, KeyId([winner.winning_height as u8; 20]));
        }
    }

    #[test]
    fn winner_is_memoized_on_drawn_node() {
        let (index, tip, ledger) = chain(&[100; 4], vec![0, 7, 10, 21]);
        let store = MemoryBlockStore::new();
        let view = ChainView::new(&index, &store, &ledger);
        let params = ConsensusParams::regtest();

        let address = get_winning_address(&view, tip, 3, &params).expect("winner");
        assert_eq!(index.node(tip).winning_address(), Some(address));
    }

    #[test]
    fn unreadable_block_is_no_winner() {
        let mut index = ChainIndex::new();
        let genesis = block(Hash32::zero(), 0, &[(0, 0)]);
        let g = index.insert_header(&genesis.header).expect("genesis");
        let one = block(index.node(g).hash, 1, &[(10, 1)]);
        let tip = index.insert_header(&one.header).expect("one");
        let ledger = MatureSupplyLedger::from_cumulative(vec![0, 10]).expect("ledger");
        let store = MemoryBlockStore::new();
        let view = ChainView::new(&index, &store, &ledger);

        assert_eq!(
            draw(&view, tip, 1, &ConsensusParams::regtest()),
            Err(NoWinner::BlockUnavailable)
        );
    }
}
