//! Merkle commitment over the initial states of a channel's open threads.
//!
//! Pairs are hashed in ascending order, so a proof is just the sibling
//! path; the contract walks it without direction bits.

use crate::types::{EngineError, ThreadState, Violation, ViolationKind};
use ethers::types::{Bytes, H256};
use ethers::utils::keccak256;

/// Root of a channel with no open threads. Also the filler leaf for odd levels.
pub const EMPTY_ROOT_HASH: H256 = H256([0u8; 32]);

/// keccak256 of the two nodes, smaller first.
pub fn hash_pair(a: &H256, b: &H256) -> H256 {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    let mut combined = [0u8; 64];
    combined[..32].copy_from_slice(low.as_bytes());
    combined[32..].copy_from_slice(high.as_bytes());
    H256::from(keccak256(combined))
}

#[derive(Clone, Debug)]
pub struct ThreadMerkleTree {
    /// Padded levels, leaves first, root level last.
    layers: Vec<Vec<H256>>,
}

impl ThreadMerkleTree {
    pub fn new(threads: &[ThreadState]) -> Result<Self, EngineError> {
        Self::from_leaves(threads.iter().map(ThreadState::hash).collect())
    }

    pub fn from_leaves(leaves: Vec<H256>) -> Result<Self, EngineError> {
        if leaves.is_empty() {
            return Err(EngineError::EmptyTree);
        }

        let mut layers = Vec::new();
        let mut level = leaves;
        loop {
            if level.len() % 2 != 0 {
                level.push(EMPTY_ROOT_HASH);
            }
            let parents: Vec<H256> = level
                .chunks(2)
                .map(|pair| hash_pair(&pair[0], &pair[1]))
                .collect();
            layers.push(level);
            if parents.len() == 1 {
                layers.push(parents);
                break;
            }
            level = parents;
        }

        Ok(Self { layers })
    }

    pub fn root(&self) -> H256 {
        self.layers
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or(EMPTY_ROOT_HASH)
    }

    /// Leaves including the padding leaf, if one was added.
    pub fn leaves(&self) -> &[H256] {
        self.layers.first().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Sibling path from `leaf` up to the root, or `None` if `leaf` is not in
    /// the tree.
    pub fn proof(&self, leaf: H256) -> Option<Vec<H256>> {
        let mut index = self.leaves().iter().position(|l| *l == leaf)?;
        let mut path = Vec::with_capacity(self.layers.len().saturating_sub(1));
        for level in &self.layers[..self.layers.len() - 1] {
            path.push(level[index ^ 1]);
            index /= 2;
        }
        Some(path)
    }
}

/// Thread root committed in a channel state for the given open threads.
pub fn build_root(threads: &[ThreadState]) -> H256 {
    match ThreadMerkleTree::new(threads) {
        Ok(tree) => tree.root(),
        Err(_) => EMPTY_ROOT_HASH,
    }
}

/// Proof for `thread` against the root of `threads`: the leaf hash first,
/// then the sibling path.
pub fn thread_proof(thread: &ThreadState, threads: &[ThreadState]) -> Result<Vec<H256>, EngineError> {
    let tree = ThreadMerkleTree::new(threads)?;
    let leaf = thread.hash();
    let path = tree.proof(leaf).ok_or_else(|| {
        Violation::new(ViolationKind::ThreadState, "thread is not in the open thread set")
    })?;

    let mut proof = Vec::with_capacity(path.len() + 1);
    proof.push(leaf);
    proof.extend(path);
    Ok(proof)
}

/// Concatenated 32-byte words, as submitted to the contract.
pub fn marshal_proof(proof: &[H256]) -> Bytes {
    let mut blob = Vec::with_capacity(proof.len() * 32);
    for word in proof {
        blob.extend_from_slice(word.as_bytes());
    }
    Bytes::from(blob)
}

/// `0x`-prefixed hex of the marshalled proof.
pub fn marshal_proof_hex(proof: &[H256]) -> String {
    format!("0x{}", hex::encode(marshal_proof(proof)))
}

/// Check a proof produced by [`thread_proof`].
pub fn verify_proof(proof: &[H256], root: H256) -> bool {
    match proof.split_first() {
        Some((leaf, path)) => path.iter().fold(*leaf, |cursor, sibling| hash_pair(&cursor, sibling)) == root,
        None => false,
    }
}

/// On-chain style check of a marshalled proof. The first word is skipped;
/// the leaf is recomputed by the caller from the thread fields.
pub fn verify_marshalled_proof(blob: &[u8], leaf: H256, root: H256) -> bool {
    if blob.is_empty() || blob.len() % 32 != 0 {
        return false;
    }
    let cursor = blob[32..]
        .chunks(32)
        .map(H256::from_slice)
        .fold(leaf, |cursor, sibling| hash_pair(&cursor, &sibling));
    cursor == root
}
