#![allow(dead_code)]

use kestrel_consensus::{ChainIndex, ChainView, ConsensusParams, NodeId, EASY_TARGET_BITS};
use kestrel_core::{
    block_full_hash, block_header_hash, key_id, pay_to_key_id, sign_helper_block, Amount, Block,
    BlockHeader, Hash32, HelperBlock, KeyId, SigningKey, Transaction, TxOut, PROTOCOL_VERSION,
};
use kestrel_state::{block_merkle_root, BlockStore, MatureSupplyLedger, MemoryBlockStore};

/// Matured atoms added per non-genesis block.
pub const ISSUANCE: u64 = 50;

/// How the next block's helper is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Helper {
    Valid,
    Missing,
    WrongPrev,
    WrongMerkle,
    WrongSigner,
}

pub fn signer(seed: u8) -> SigningKey {
    SigningKey::from_slice(&[seed; 32]).expect("valid scalar")
}

pub fn coinbase(height: u64, outputs: &[(u64, KeyId)]) -> Transaction {
    Transaction {
        version: PROTOCOL_VERSION,
        inputs: vec![],
        outputs: outputs
            .iter()
            .map(|(value, owner)| TxOut {
                value: Amount(*value),
                script_pubkey: pay_to_key_id(owner),
            })
            .collect(),
        lock_time: height as u32,
    }
}

/// Bump the nonce until the header hash satisfies `accept`.
pub fn grind(block: &mut Block, accept: impl Fn(&Hash32) -> bool) {
    for _ in 0..1_000_000u32 {
        let hash = block_header_hash(&block.header).expect("header hash");
        if accept(&hash) {
            return;
        }
        block.header.nonce = block.header.nonce.wrapping_add(1);
    }
    panic!("failed to grind test block");
}

/// In-memory chain where every output pays the lottery key.
pub struct TestChain {
    pub index: ChainIndex,
    pub store: MemoryBlockStore,
    pub ledger: MatureSupplyLedger,
    pub params: ConsensusParams,
    pub winner: SigningKey,
    pub winner_id: KeyId,
    pub tip: Option<NodeId>,
}

impl TestChain {
    pub fn new(params: ConsensusParams) -> Self {
        let winner = signer(7);
        let winner_id = key_id(winner.verifying_key());
        Self {
            index: ChainIndex::new(),
            store: MemoryBlockStore::new(),
            ledger: MatureSupplyLedger::new(),
            params,
            winner,
            winner_id,
            tip: None,
        }
    }

    pub fn view(&self) -> ChainView<'_> {
        ChainView::new(&self.index, &self.store, &self.ledger)
    }

    pub fn tip(&self) -> NodeId {
        self.tip.expect("chain has a tip")
    }

    /// Body of an indexed block, read back from the store.
    pub fn store_block(&self, id: NodeId) -> Block {
        self.store
            .read_block(&self.index.node(id).hash)
            .expect("stored block")
    }

    pub fn next_height(&self) -> u64 {
        self.tip.map_or(0, |t| self.index.node(t).height + 1)
    }

    /// Block on the current tip paying `outputs`, with a helper built per `mode`.
    pub fn next_block_with(&self, outputs: &[(u64, KeyId)], mode: Helper) -> Block {
        let height = self.next_height();
        let (prev, time) = match self.tip {
            Some(t) => {
                let node = self.index.node(t);
                (node.hash, node.time + 600)
            }
            None => (Hash32::zero(), 1_600_000_000),
        };

        let mut block = Block {
            header: BlockHeader {
                version: PROTOCOL_VERSION,
                prev,
                merkle_root: Hash32::zero(),
                timestamp: time,
                bits: EASY_TARGET_BITS,
                nonce: 0,
            },
            txs: vec![coinbase(height, outputs)],
            helper: None,
        };
        let merkle = block_merkle_root(&block).expect("merkle");
        block.header.merkle_root = merkle;

        let Some(tip) = self.tip else {
            return block;
        };
        if mode == Helper::Missing {
            return block;
        }

        let prev_block = self.index.node(tip).block().expect("cached body");
        let mut helper = HelperBlock {
            hash_prev_block: block_full_hash(prev_block).expect("full hash"),
            hash_merkle_root: merkle,
            payment_address: self.winner_id,
            signature: vec![],
        };
        match mode {
            Helper::WrongPrev => helper.hash_prev_block = prev,
            Helper::WrongMerkle => helper.hash_merkle_root = Hash32([0xab; 32]),
            _ => {}
        }
        let key = if mode == Helper::WrongSigner {
            signer(9)
        } else {
            self.winner.clone()
        };
        helper.signature = sign_helper_block(&helper, &key).expect("sign");
        block.helper = Some(helper);
        block
    }

    pub fn next_block(&self, mode: Helper) -> Block {
        self.next_block_with(&[(ISSUANCE, self.winner_id)], mode)
    }

    /// Index and store `block`, recording `matured` new atoms in the ledger.
    pub fn append(&mut self, block: Block, matured: u64) -> NodeId {
        self.store.insert(block.clone()).expect("store");
        let id = self.index.insert_block(block).expect("index");
        self.ledger.push_matured(matured).expect("ledger");
        self.tip = Some(id);
        id
    }

    /// Append a standard block (genesis matures nothing).
    pub fn push(&mut self, mode: Helper) -> NodeId {
        let matured = if self.tip.is_some() { ISSUANCE } else { 0 };
        let block = self.next_block(mode);
        self.append(block, matured)
    }

    pub fn push_n(&mut self, n: usize, mode: Helper) -> NodeId {
        for _ in 0..n {
            self.push(mode);
        }
        self.tip()
    }
}
