// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//!
//! Sets of events of a fixed event graph
//!

use std::fmt::Display;

use crate::events::EventId;

///
/// A set of events with ids in [0 .. N-1]
/// - the bound N is the number of events in the graph
/// - insert and contains are O(1) operations
///
// Invariants:
// - elem[0 .. size-1] lists the elements in insertion order
// - for every x in [0 .. N-1], pos[x] is an index in elem
// - x is in the set iff pos[x] < size and elem[pos[x]] == x
//
#[derive(Debug, Clone)]
pub struct EventSet {
    max: u32,
    size: u32,
    pos: Box<[u32]>,
    elem: Box<[u32]>,
}

impl Display for EventSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for e in self.iter() {
            write!(f, " {e}")?;
        }
        write!(f, " }}")
    }
}

impl EventSet {
    ///
    /// Create an empty set for a graph of max events
    ///
    pub fn new(max: usize) -> Self {
        let pos = vec![0; max].into_boxed_slice();
        let elem = vec![0; max].into_boxed_slice();
        EventSet {
            max: max as u32,
            size: 0,
            pos,
            elem,
        }
    }

    ///
    /// Check whether the set is empty
    ///
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    ///
    /// Check whether e is in the set
    ///
    pub fn contains(&self, e: EventId) -> bool {
        let x = e.0;
        debug_assert!(x < self.max);
        let i = self.pos[x as usize];
        i < self.size && self.elem[i as usize] == x
    }

    ///
    /// Add e to the set
    ///
    pub fn insert(&mut self, e: EventId) {
        if !self.contains(e) {
            let s = self.size;
            self.pos[e.index()] = s;
            self.elem[s as usize] = e.0;
            self.size += 1;
        }
    }

    ///
    /// Iterator
    ///
    pub fn iter(&self) -> impl Iterator<Item = EventId> + '_ {
        self.elem[..self.size as usize].iter().map(|&x| EventId(x))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test() {
        let set = &mut EventSet::new(100);
        set.insert(EventId(10));
        set.insert(EventId(20));
        set.insert(EventId(10));
        set.insert(EventId(40));
        set.insert(EventId(40));

        println!("After adding 10, 20, 40: {}", set);
        assert!(set.contains(EventId(10)));
        assert!(set.contains(EventId(20)));
        assert!(set.contains(EventId(40)));
        assert!(!set.contains(EventId(30)));
        
        let order: Vec<u32> = set.iter().map(|e| e.0).collect();
        assert_eq!(order, vec![10, 20, 40]);

        let other = EventSet::new(100);
        assert!(other.is_empty());
        assert!(!other.contains(EventId(10)));
    }
}
