// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//!
//! Fixed-width bit vectors
//!

use std::fmt::Display;

///
/// A vector of `len` bits packed in 64-bit words
///
// Invariant: bits at positions >= len are zero
//
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bits {
    len: usize,
    words: Box<[u64]>,
}

impl Bits {
    ///
    /// All-zero vector of length len
    ///
    pub fn zeros(len: usize) -> Self {
        let n = len.div_ceil(64);
        Bits {
            len,
            words: vec![0; n].into_boxed_slice(),
        }
    }

    ///
    /// All-one vector of length len
    ///
    pub fn ones(len: usize) -> Self {
        let mut result = Self::zeros(len);
        for w in result.words.iter_mut() {
            *w = u64::MAX;
        }
        result.clear_padding();
        result
    }

    fn clear_padding(&mut self) {
        let r = self.len % 64;
        if r != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << r) - 1;
            }
        }
    }

    ///
    /// Number of bits
    ///
    pub fn len(&self) -> usize {
        self.len
    }

    ///
    /// Check whether all bits are zero
    ///
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    ///
    /// Number of one bits
    ///
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    ///
    /// Get bit i
    ///
    pub fn get(&self, i: usize) -> bool {
        debug_assert!(i < self.len);
        self.words[i / 64] & (1 << (i % 64)) != 0
    }

    ///
    /// Set bit i
    ///
    pub fn set(&mut self, i: usize) {
        debug_assert!(i < self.len);
        self.words[i / 64] |= 1 << (i % 64);
    }

    ///
    /// self := self | other
    ///
    pub fn or_with(&mut self, other: &Bits) {
        debug_assert_eq!(self.len, other.len);
        for (x, y) in self.words.iter_mut().zip(other.words.iter()) {
            *x |= y;
        }
    }

    ///
    /// self := self & other
    ///
    pub fn and_with(&mut self, other: &Bits) {
        debug_assert_eq!(self.len, other.len);
        for (x, y) in self.words.iter_mut().zip(other.words.iter()) {
            *x &= y;
        }
    }

    ///
    /// Combine self and other word by word with function f
    ///
    pub fn combine<F>(&self, other: &Bits, f: F) -> Bits
    where
        F: Fn(u64, u64) -> u64,
    {
        debug_assert_eq!(self.len, other.len);
        let words = self
            .words
            .iter()
            .zip(other.words.iter())
            .map(|(&x, &y)| f(x, y))
            .collect();
        let mut result = Bits {
            len: self.len,
            words,
        };
        result.clear_padding();
        result
    }

    ///
    /// Check whether self is a subset of other
    ///
    pub fn is_subset(&self, other: &Bits) -> bool {
        debug_assert_eq!(self.len, other.len);
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(&x, &y)| x & !y == 0)
    }

    ///
    /// Indices of all one bits in increasing order
    ///
    pub fn ones_iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(move |&i| self.get(i))
    }
}

impl Display for Bits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for i in 0..self.len {
            write!(f, "{}", if self.get(i) { '1' } else { '0' })?;
        }
        Ok(())
    }
}
