// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//!
//! Partitions of an integer set
//!
//! We consider a set of N integers [0 ... n-1].
//! A partition is a division of the set into K disjoint, non-empty blocks.
//! Blocks can be split and merged. Block ids are stable: a block keeps its
//! id until it's merged into another block, and a dead block id can be
//! revived by a later split.
//!

use std::{collections::HashMap, fmt::Display, hash::Hash};

// Implementation:
// - block_id[x] = id of the block that contains x
// - members[j] = elements of block j in increasing order
//
// Block 0 is special: it is the empty block.
// Any other block is either live (non-empty) or dead (empty, available for reuse).
//

///
/// A partition with element-to-block and block-to-elements maps
///
#[derive(Debug, Clone)]
pub struct Partition {
    // mapping from element to block id
    block_id: Box<[u32]>,
    // elements of each block
    members: Vec<Vec<u32>>,
    // number of live blocks
    live: usize,
}

impl Partition {
    ///
    /// Partition of [0 .. n-1] into blocks defined by a key function:
    /// x and y are in the same block iff key(x) == key(y).
    /// - blocks are numbered from 1 in order of their smallest element
    ///
    pub fn from_keys<K, F>(n: u32, key: F) -> Self
    where
        K: Eq + Hash,
        F: Fn(u32) -> K,
    {
        let mut block_id = vec![0; n as usize].into_boxed_slice();
        let mut members: Vec<Vec<u32>> = vec![Vec::new()];
        let mut ids: HashMap<K, u32> = HashMap::new();
        for x in 0..n {
            let id = *ids.entry(key(x)).or_insert_with(|| {
                members.push(Vec::new());
                (members.len() - 1) as u32
            });
            block_id[x as usize] = id;
            members[id as usize].push(x);
        }
        let live = members.len() - 1;
        Partition {
            block_id,
            members,
            live,
        }
    }

    ///
    /// Partition of [0 .. n-1] into n singleton blocks: x is in block x+1
    ///
    pub fn singletons(n: u32) -> Self {
        Self::from_keys(n, |x| x)
    }

    ///
    /// Number of block ids in use, including block 0 and dead blocks
    ///
    pub fn num_blocks(&self) -> u32 {
        self.members.len() as u32
    }

    ///
    /// Index = number of equivalence classes = number of live blocks
    ///
    pub fn index(&self) -> u32 {
        self.live as u32
    }

    ///
    /// Size of block i
    ///
    pub fn block_size(&self, i: u32) -> u32 {
        self.members.get(i as usize).map_or(0, |m| m.len() as u32)
    }

    ///
    /// Check whether i is a live block
    ///
    pub fn is_live(&self, i: u32) -> bool {
        i > 0 && self.block_size(i) > 0
    }

    ///
    /// Ids of all live blocks in increasing order
    ///
    pub fn live_blocks(&self) -> impl Iterator<Item = u32> + '_ {
        (1..self.num_blocks()).filter(move |&i| self.is_live(i))
    }

    ///
    /// Elements of block i in increasing order
    ///
    pub fn block_elements(&self, i: u32) -> &[u32] {
        self.members
            .get(i as usize)
            .map(|m| m.as_slice())
            .unwrap_or(&[])
    }

    ///
    /// Block id for element x
    ///
    pub fn block_id(&self, x: u32) -> u32 {
        self.block_id[x as usize]
    }

    // Find or create a dead block id
    fn fresh_block(&mut self, into: Option<u32>) -> u32 {
        match into {
            Some(j) => {
                let j = j as usize;
                if j >= self.members.len() {
                    self.members.resize_with(j + 1, Vec::new);
                }
                debug_assert!(j > 0 && self.members[j].is_empty());
                j as u32
            }
            None => {
                self.members.push(Vec::new());
                (self.members.len() - 1) as u32
            }
        }
    }

    ///
    /// Move elements of block i that satisfy p into another block
    /// - if into is Some(j), block j must be dead and it receives the elements
    /// - otherwise a new block id is allocated
    ///
    /// Return the id of the block that receives the elements, or 0
    /// if no element or every element of block i satisfies p
    /// (in which case nothing changes).
    ///
    pub fn split_block<P>(&mut self, i: u32, p: P, into: Option<u32>) -> u32
    where
        P: Fn(u32) -> bool,
    {
        let (moved, kept): (Vec<u32>, Vec<u32>) =
            self.block_elements(i).iter().copied().partition(|&x| p(x));
        if moved.is_empty() || kept.is_empty() {
            return 0;
        }
        let j = self.fresh_block(into);
        for &x in &moved {
            self.block_id[x as usize] = j;
        }
        self.members[i as usize] = kept;
        self.members[j as usize] = moved;
        self.live += 1;
        j
    }

    ///
    /// Merge block j into block i
    /// - block j becomes dead
    ///
    pub fn merge_blocks(&mut self, i: u32, j: u32) {
        debug_assert!(i != j && self.is_live(i) && self.is_live(j));
        let moved = std::mem::take(&mut self.members[j as usize]);
        for &x in &moved {
            self.block_id[x as usize] = i;
        }
        let target = &mut self.members[i as usize];
        target.extend(moved);
        target.sort_unstable();
        self.live -= 1;
    }
}

impl Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for i in self.live_blocks() {
            write!(f, "block[{i}]: ")?;
            for x in self.block_elements(i) {
                write!(f, " {x}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
