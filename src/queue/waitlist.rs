//! Waiting list and away list
//!
//! A player's standing is kept in one map, so being queued and being away
//! are mutually exclusive by construction. The queue order lives in a
//! separate sequence that only ever holds players whose standing is
//! `Queued`.

use crate::types::PlayerId;
use std::collections::{HashMap, VecDeque};

/// Where a player stands with respect to the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Standing {
    Queued,
    Afk,
}

/// Result of an enqueue request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Added at the tail
    Appended,
    /// Inserted ahead of other players; their positions shifted
    Inserted,
    /// Already queued, nothing changed
    AlreadyQueued,
}

/// Ordered waiting list plus the away set
#[derive(Debug, Clone, Default)]
pub struct Waitlist {
    order: VecDeque<PlayerId>,
    standing: HashMap<PlayerId, Standing>,
}

impl Waitlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a player at `position`, or at the tail when `None`.
    ///
    /// Positions past the tail are clamped. An away player loses the away
    /// standing when queued.
    pub fn enqueue(&mut self, player: PlayerId, position: Option<usize>) -> EnqueueOutcome {
        if self.is_queued(player) {
            return EnqueueOutcome::AlreadyQueued;
        }

        self.standing.insert(player, Standing::Queued);
        match position {
            Some(index) if index < self.order.len() => {
                self.order.insert(index, player);
                EnqueueOutcome::Inserted
            }
            _ => {
                self.order.push_back(player);
                EnqueueOutcome::Appended
            }
        }
    }

    /// Remove a player from the queue; returns whether they were queued
    pub fn remove(&mut self, player: PlayerId) -> bool {
        if !self.is_queued(player) {
            return false;
        }
        self.standing.remove(&player);
        self.order.retain(|queued| *queued != player);
        true
    }

    /// Zero-based queue position
    pub fn position_of(&self, player: PlayerId) -> Option<usize> {
        if !self.is_queued(player) {
            return None;
        }
        self.order.iter().position(|queued| *queued == player)
    }

    /// First `n` queued players, without removing them
    pub fn front(&self, n: usize) -> Vec<PlayerId> {
        self.order.iter().take(n).copied().collect()
    }

    pub fn pop_front(&mut self) -> Option<PlayerId> {
        let player = self.order.pop_front()?;
        self.standing.remove(&player);
        Some(player)
    }

    /// Mark a player away. Fails if they already are; a queued player is
    /// taken out of the queue.
    pub fn mark_afk(&mut self, player: PlayerId) -> bool {
        match self.standing.get(&player) {
            Some(Standing::Afk) => false,
            Some(Standing::Queued) => {
                self.order.retain(|queued| *queued != player);
                self.standing.insert(player, Standing::Afk);
                true
            }
            None => {
                self.standing.insert(player, Standing::Afk);
                true
            }
        }
    }

    /// Clear the away standing; returns whether the player was away
    pub fn clear_afk(&mut self, player: PlayerId) -> bool {
        if self.is_afk(player) {
            self.standing.remove(&player);
            true
        } else {
            false
        }
    }

    pub fn standing(&self, player: PlayerId) -> Option<Standing> {
        self.standing.get(&player).copied()
    }

    pub fn is_queued(&self, player: PlayerId) -> bool {
        self.standing(player) == Some(Standing::Queued)
    }

    pub fn is_afk(&self, player: PlayerId) -> bool {
        self.standing(player) == Some(Standing::Afk)
    }

    /// Queued players in admission order
    pub fn queued(&self) -> Vec<PlayerId> {
        self.order.iter().copied().collect()
    }

    /// Away players, sorted by id for stable output
    pub fn afk(&self) -> Vec<PlayerId> {
        let mut afk: Vec<PlayerId> = self
            .standing
            .iter()
            .filter(|(_, standing)| **standing == Standing::Afk)
            .map(|(player, _)| *player)
            .collect();
        afk.sort_unstable();
        afk
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn afk_count(&self) -> usize {
        self.standing.len() - self.order.len()
    }

    /// Empty the queue; away players keep their standing
    pub fn clear_queue(&mut self) -> Vec<PlayerId> {
        let cleared: Vec<PlayerId> = self.order.drain(..).collect();
        for player in &cleared {
            self.standing.remove(player);
        }
        cleared
    }

    /// Forget a player entirely (disconnect)
    pub fn forget(&mut self, player: PlayerId) -> Option<Standing> {
        let standing = self.standing.remove(&player)?;
        if standing == Standing::Queued {
            self.order.retain(|queued| *queued != player);
        }
        Some(standing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_enqueue_appends_and_ignores_duplicates() {
        let mut list = Waitlist::new();
        assert_eq!(list.enqueue(1, None), EnqueueOutcome::Appended);
        assert_eq!(list.enqueue(2, None), EnqueueOutcome::Appended);
        assert_eq!(list.enqueue(1, None), EnqueueOutcome::AlreadyQueued);
        assert_eq!(list.queued(), vec![1, 2]);
    }

    #[test]
    fn test_enqueue_at_position() {
        let mut list = Waitlist::new();
        list.enqueue(1, None);
        list.enqueue(2, None);
        assert_eq!(list.enqueue(3, Some(0)), EnqueueOutcome::Inserted);
        assert_eq!(list.queued(), vec![3, 1, 2]);

        // Past the tail is a plain append
        assert_eq!(list.enqueue(4, Some(10)), EnqueueOutcome::Appended);
        assert_eq!(list.position_of(4), Some(3));
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut list = Waitlist::new();
        list.enqueue(1, None);
        assert!(!list.remove(42));
        assert_eq!(list.queued(), vec![1]);
        assert!(list.remove(1));
        assert!(list.is_empty());
    }

    #[test]
    fn test_front_and_pop() {
        let mut list = Waitlist::new();
        for id in [5, 6, 7] {
            list.enqueue(id, None);
        }
        assert_eq!(list.front(2), vec![5, 6]);
        assert_eq!(list.len(), 3);
        assert_eq!(list.pop_front(), Some(5));
        assert!(!list.is_queued(5));
        assert_eq!(list.position_of(6), Some(0));
    }

    #[test]
    fn test_mark_afk_leaves_queue() {
        let mut list = Waitlist::new();
        list.enqueue(1, None);
        list.enqueue(2, None);

        assert!(list.mark_afk(1));
        assert!(list.is_afk(1));
        assert!(!list.is_queued(1));
        assert_eq!(list.queued(), vec![2]);

        assert!(!list.mark_afk(1));
        assert_eq!(list.afk_count(), 1);
    }

    #[test]
    fn test_enqueue_clears_afk() {
        let mut list = Waitlist::new();
        list.mark_afk(3);
        list.enqueue(3, None);
        assert!(list.is_queued(3));
        assert!(!list.is_afk(3));
        assert!(list.afk().is_empty());
    }

    #[test]
    fn test_clear_queue_keeps_afk() {
        let mut list = Waitlist::new();
        list.enqueue(1, None);
        list.enqueue(2, None);
        list.mark_afk(3);

        assert_eq!(list.clear_queue(), vec![1, 2]);
        assert!(list.is_empty());
        assert_eq!(list.afk(), vec![3]);
    }

    #[test]
    fn test_forget() {
        let mut list = Waitlist::new();
        list.enqueue(1, None);
        list.mark_afk(2);
        assert_eq!(list.forget(1), Some(Standing::Queued));
        assert_eq!(list.forget(2), Some(Standing::Afk));
        assert_eq!(list.forget(3), None);
        assert!(list.is_empty());
        assert_eq!(list.afk_count(), 0);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Enqueue(PlayerId, Option<usize>),
        Remove(PlayerId),
        MarkAfk(PlayerId),
        ClearAfk(PlayerId),
        PopFront,
        Forget(PlayerId),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        let id = 0u64..12;
        prop_oneof![
            (id.clone(), proptest::option::of(0usize..14)).prop_map(|(p, i)| Op::Enqueue(p, i)),
            id.clone().prop_map(Op::Remove),
            id.clone().prop_map(Op::MarkAfk),
            id.clone().prop_map(Op::ClearAfk),
            Just(Op::PopFront),
            id.prop_map(Op::Forget),
        ]
    }

    proptest! {
        #[test]
        fn prop_queue_and_afk_stay_exclusive(ops in proptest::collection::vec(op_strategy(), 0..80)) {
            let mut list = Waitlist::new();
            for op in ops {
                match op {
                    Op::Enqueue(p, i) => { list.enqueue(p, i); }
                    Op::Remove(p) => { list.remove(p); }
                    Op::MarkAfk(p) => { list.mark_afk(p); }
                    Op::ClearAfk(p) => { list.clear_afk(p); }
                    Op::PopFront => { list.pop_front(); }
                    Op::Forget(p) => { list.forget(p); }
                }

                let queued = list.queued();
                let afk = list.afk();

                // No duplicates in the queue
                let mut unique = queued.clone();
                unique.sort_unstable();
                unique.dedup();
                prop_assert_eq!(unique.len(), queued.len());

                // Never both queued and away
                for player in &queued {
                    prop_assert!(!afk.contains(player));
                    prop_assert!(list.is_queued(*player));
                }
                for player in &afk {
                    prop_assert!(list.position_of(*player).is_none());
                }
                prop_assert_eq!(list.afk_count(), afk.len());
            }
        }
    }
}
