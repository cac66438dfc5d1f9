//! Merkle tree over transaction hashes.

use crate::hash::{combine_hashes, HexHash};
use serde::{Deserialize, Serialize};

/// Side of the sibling relative to the running hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub hash: HexHash,
    pub side: Side,
}

pub type MerkleProof = Vec<ProofStep>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleNode {
    pub hash: HexHash,
    pub left: Option<Box<MerkleNode>>,
    pub right: Option<Box<MerkleNode>>,
}

impl MerkleNode {
    pub fn leaf(hash: HexHash) -> Self {
        MerkleNode { hash, left: None, right: None }
    }

    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct MerkleTree {
    leaves: Vec<HexHash>,
    root: Option<MerkleNode>,
}

impl MerkleTree {
    /// Build bottom-up. An odd node at the end of a level is paired with itself.
    pub fn new(leaves: Vec<HexHash>) -> Self {
        let root = Self::build(&leaves);
        MerkleTree { leaves, root }
    }

    fn build(leaves: &[HexHash]) -> Option<MerkleNode> {
        let mut level: Vec<MerkleNode> = leaves.iter().cloned().map(MerkleNode::leaf).collect();
        if level.is_empty() {
            return None;
        }

        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            let mut nodes = level.into_iter();
            while let Some(left) = nodes.next() {
                let right = nodes.next().unwrap_or_else(|| left.clone());
                let hash = combine_hashes(&[&left.hash, &right.hash]);
                next.push(MerkleNode {
                    hash,
                    left: Some(Box::new(left)),
                    right: Some(Box::new(right)),
                });
            }
            level = next;
        }

        level.pop()
    }

    pub fn root(&self) -> Option<&MerkleNode> {
        self.root.as_ref()
    }

    pub fn root_hash(&self) -> Option<&str> {
        self.root.as_ref().map(|n| n.hash.as_str())
    }

    pub fn leaves(&self) -> &[HexHash] {
        &self.leaves
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Inclusion proof for the first leaf equal to `leaf_hash`.
    ///
    /// A leaf sitting on a level's padded position gets itself as a `Right`
    /// sibling, mirroring how the tree was built. Unknown leaves yield an
    /// empty proof.
    pub fn get_proof(&self, leaf_hash: &str) -> MerkleProof {
        let Some(mut index) = self.leaves.iter().position(|h| h == leaf_hash) else {
            return Vec::new();
        };

        let mut proof = Vec::new();
        let mut level = self.leaves.clone();

        while level.len() > 1 {
            let step = if index % 2 == 0 {
                let sibling = level.get(index + 1).unwrap_or(&level[index]);
                ProofStep { hash: sibling.clone(), side: Side::Right }
            } else {
                ProofStep { hash: level[index - 1].clone(), side: Side::Left }
            };
            proof.push(step);

            level = level
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => combine_hashes(&[left, right]),
                    [single] => combine_hashes(&[single, single]),
                    _ => unreachable!("chunks(2) yields one or two items"),
                })
                .collect();
            index /= 2;
        }

        proof
    }

    /// Fold the proof from the leaf upwards and compare against `expected_root`.
    pub fn verify_proof(leaf_hash: &str, proof: &[ProofStep], expected_root: &str) -> bool {
        let computed = proof.iter().fold(leaf_hash.to_string(), |current, step| match step.side {
            Side::Left => combine_hashes(&[&step.hash, &current]),
            Side::Right => combine_hashes(&[&current, &step.hash]),
        });
        computed == expected_root
    }
}

/// Root over `leaves`, or `None` when there are none.
pub fn merkle_root(leaves: &[HexHash]) -> Option<HexHash> {
    MerkleTree::new(leaves.to_vec()).root_hash().map(str::to_string)
}
