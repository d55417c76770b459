// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//!
//! Worklists for graph exploration
//!

use std::{
    collections::{HashSet, VecDeque},
    hash::Hash,
};

///
/// A FIFO queue that doesn't contain the same element twice.
/// - the push operation adds an element at the end of the queue
///   if this element is not already in the queue. Otherwise, it's a no-op.
/// - the pop operation takes the element at the front of the queue.
///   Once popped, an element can be pushed again.
///
#[derive(Debug)]
pub struct Worklist<T> {
    queue: VecDeque<T>,
    queued: HashSet<T>,
}

impl<T: Eq + Hash + Clone> Default for Worklist<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Eq + Hash + Clone> Worklist<T> {
    ///
    /// Create an empty worklist
    ///
    pub fn new() -> Self {
        Worklist {
            queue: VecDeque::new(),
            queued: HashSet::new(),
        }
    }

    ///
    /// Add an element at the end of the queue if it's not already queued
    /// - return true if the element was added
    ///
    pub fn push(&mut self, element: T) -> bool {
        if self.queued.insert(element.clone()) {
            self.queue.push_back(element);
            true
        } else {
            false
        }
    }

    ///
    /// Remove the first element
    /// - return None if the worklist is empty
    ///
    pub fn pop(&mut self) -> Option<T> {
        let x = self.queue.pop_front()?;
        self.queued.remove(&x);
        Some(x)
    }
}
