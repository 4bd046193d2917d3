//! Referral graph maintenance.
//!
//! Referral edges form a forest: each user has at most one referrer. For every
//! user the store keeps derived counts over the subtree below it:
//! depth 1 is "direct", depths 2 and 3 are "indirect".
//!
//! Counts are always recomputed from the edges, never incremented, so applying
//! the same edge twice cannot drift them.

use alloy::primitives::Address;
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::storage::{ReferralCounts, Storage};
use stakedrop_core::REFERRAL_DEPTH;

#[derive(Debug, Clone)]
struct Node {
    address: Address,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// Arena of referral nodes keyed by address.
#[derive(Debug, Clone, Default)]
pub struct ReferralForest {
    nodes: Vec<Node>,
    index: HashMap<Address, usize>,
}

impl ReferralForest {
    /// Create an empty forest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a forest from `(user, referrer)` edges.
    pub fn from_edges<I>(edges: I) -> Self
    where
        I: IntoIterator<Item = (Address, Address)>,
    {
        let mut forest = Self::new();
        for (user, referrer) in edges {
            forest.add_edge(user, referrer);
        }
        forest
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the forest has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether `address` is a node.
    pub fn contains(&self, address: &Address) -> bool {
        self.index.contains_key(address)
    }

    /// Add a node without edges. Returns its index.
    pub fn insert(&mut self, address: Address) -> usize {
        if let Some(&id) = self.index.get(&address) {
            return id;
        }
        let id = self.nodes.len();
        self.nodes.push(Node {
            address,
            parent: None,
            children: Vec::new(),
        });
        self.index.insert(address, id);
        id
    }

    /// Link `user` under `referrer`.
    ///
    /// Self-edges and a second referrer for the same user are ignored.
    /// Returns true when the edge was added.
    pub fn add_edge(&mut self, user: Address, referrer: Address) -> bool {
        if user == referrer {
            return false;
        }

        let child = self.insert(user);
        if self.nodes[child].parent.is_some() {
            return false;
        }
        let parent = self.insert(referrer);

        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
        true
    }

    /// Referrer of `address`, if any.
    pub fn parent(&self, address: &Address) -> Option<Address> {
        let id = *self.index.get(address)?;
        self.nodes[id]
            .parent
            .map(|parent| self.nodes[parent].address)
    }

    /// Up to `max_hops` ancestors of `address`, nearest first.
    pub fn ancestors(&self, address: &Address, max_hops: usize) -> Vec<Address> {
        let mut ancestors = Vec::new();
        let Some(&start) = self.index.get(address) else {
            return ancestors;
        };

        let mut visited = HashSet::from([start]);
        let mut current = self.nodes[start].parent;
        while let Some(id) = current {
            if ancestors.len() == max_hops || !visited.insert(id) {
                break;
            }
            ancestors.push(self.nodes[id].address);
            current = self.nodes[id].parent;
        }
        ancestors
    }

    /// Number of descendants at each depth `1..=max_depth`.
    ///
    /// Entry `d - 1` holds the count at depth `d`. Nodes reached twice are
    /// counted once, so malformed cyclic input terminates.
    pub fn descendants_by_depth(&self, address: &Address, max_depth: usize) -> Vec<u64> {
        let mut levels = vec![0u64; max_depth];
        let Some(&start) = self.index.get(address) else {
            return levels;
        };

        let mut visited = HashSet::from([start]);
        let mut frontier = vec![start];

        for level in levels.iter_mut() {
            let mut next = Vec::new();
            for id in &frontier {
                for &child in &self.nodes[*id].children {
                    if visited.insert(child) {
                        next.push(child);
                    }
                }
            }
            *level = next.len() as u64;
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        levels
    }

    /// Direct and indirect referral counts for `address`.
    pub fn referral_counts(&self, address: &Address) -> ReferralCounts {
        let levels = self.descendants_by_depth(address, REFERRAL_DEPTH);
        ReferralCounts {
            direct: levels.first().copied().unwrap_or(0),
            indirect: levels.iter().skip(1).sum(),
        }
    }

    /// Every node address.
    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.nodes.iter().map(|node| &node.address)
    }
}

/// Keeps the stored referral counts in line with the referral edges.
#[derive(Debug, Clone)]
pub struct ReferralMaintainer {
    storage: Storage,
}

impl ReferralMaintainer {
    /// Create a maintainer over `storage`.
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Recompute counts after `user` gained a referrer.
    ///
    /// Refreshes `user` and its ancestors up to the counted depth, which is
    /// every node whose counts can include the new edge. Only the bounded
    /// subtree under the furthest ancestor is loaded. Returns the number of
    /// users updated.
    pub async fn refresh_user(&self, user: &Address) -> Result<u64> {
        let ancestors = self.load_ancestors(user).await?;

        let mut forest = ReferralForest::new();
        forest.insert(*user);
        let mut below = *user;
        for ancestor in &ancestors {
            forest.add_edge(below, *ancestor);
            below = *ancestor;
        }

        // The furthest ancestor needs its subtree down to its own depth
        // window, which also covers the windows of every node below it.
        let top = ancestors.last().copied().unwrap_or(*user);
        self.load_subtree(&mut forest, top, ancestors.len() + REFERRAL_DEPTH)
            .await?;

        let updates: Vec<(Address, ReferralCounts)> = std::iter::once(*user)
            .chain(ancestors.iter().copied())
            .map(|address| (address, forest.referral_counts(&address)))
            .collect();

        let updated = self.storage.update_referral_counts_batch(&updates).await?;
        debug!(user = %user, ancestors = ancestors.len(), updated, "Referral counts refreshed");

        Ok(updated)
    }

    /// Recompute counts for every user from the full edge set.
    pub async fn recalculate_all(&self) -> Result<u64> {
        let edges = self.storage.get_all_referral_edges().await?;
        let users = self.storage.get_all_user_addresses().await?;

        let mut forest = ReferralForest::from_edges(edges);
        for user in &users {
            forest.insert(*user);
        }

        let updates: Vec<(Address, ReferralCounts)> = users
            .iter()
            .map(|address| (*address, forest.referral_counts(address)))
            .collect();

        let updated = self.storage.update_referral_counts_batch(&updates).await?;
        info!(users = updated, nodes = forest.len(), "Recalculated referral counts");

        Ok(updated)
    }

    async fn load_ancestors(&self, user: &Address) -> Result<Vec<Address>> {
        let mut ancestors = Vec::with_capacity(REFERRAL_DEPTH);
        let mut seen = HashSet::from([*user]);
        let mut current = *user;

        while ancestors.len() < REFERRAL_DEPTH {
            match self.storage.get_referrer(&current).await? {
                Some(referrer) if seen.insert(referrer) => {
                    ancestors.push(referrer);
                    current = referrer;
                }
                _ => break,
            }
        }

        Ok(ancestors)
    }

    async fn load_subtree(
        &self,
        forest: &mut ReferralForest,
        root: Address,
        depth: usize,
    ) -> Result<()> {
        let mut seen = HashSet::from([root]);
        let mut frontier = vec![root];

        for _ in 0..depth {
            if frontier.is_empty() {
                break;
            }
            let edges = self.storage.children_of(&frontier).await?;
            frontier = Vec::with_capacity(edges.len());
            for (child, parent) in edges {
                forest.add_edge(child, parent);
                if seen.insert(child) {
                    frontier.push(child);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::setup_storage;

    fn addr(n: u8) -> Address {
        Address::repeat_byte(n)
    }

    #[test]
    fn test_chain_counts() {
        // A -> B -> C -> D (B referred by A, and so on)
        let (a, b, c, d) = (addr(1), addr(2), addr(3), addr(4));
        let forest = ReferralForest::from_edges([(b, a), (c, b), (d, c)]);

        let counts_a = forest.referral_counts(&a);
        assert_eq!(counts_a.direct, 1);
        assert_eq!(counts_a.indirect, 2);
        assert_eq!(counts_a.total(), counts_a.direct + 2);

        assert_eq!(forest.referral_counts(&b).indirect, 1);
        assert_eq!(forest.referral_counts(&c).indirect, 0);
        assert_eq!(forest.referral_counts(&d), ReferralCounts::default());
    }

    #[test]
    fn test_depth_is_bounded() {
        // Five-long chain: the fifth level is outside the window
        let forest = ReferralForest::from_edges((1..5).map(|i| (addr(i + 1), addr(i))));

        assert_eq!(forest.descendants_by_depth(&addr(1), 5), vec![1, 1, 1, 1, 0]);
        let counts = forest.referral_counts(&addr(1));
        assert_eq!(counts.direct, 1);
        assert_eq!(counts.indirect, 2);
    }

    #[test]
    fn test_fan_out() {
        let root = addr(1);
        let mut forest = ReferralForest::new();
        for i in 10..13 {
            forest.add_edge(addr(i), root);
            for j in 0..2 {
                forest.add_edge(addr(i * 10 + j), addr(i));
            }
        }

        assert_eq!(forest.descendants_by_depth(&root, 3), vec![3, 6, 0]);
    }

    #[test]
    fn test_edges_are_first_write_wins() {
        let mut forest = ReferralForest::new();
        assert!(forest.add_edge(addr(2), addr(1)));
        assert!(!forest.add_edge(addr(2), addr(3)));
        assert!(!forest.add_edge(addr(4), addr(4)));

        assert_eq!(forest.parent(&addr(2)), Some(addr(1)));
        assert_eq!(forest.parent(&addr(4)), None);
    }

    #[test]
    fn test_cycle_terminates() {
        let forest = ReferralForest::from_edges([(addr(1), addr(2)), (addr(2), addr(1))]);

        assert_eq!(forest.descendants_by_depth(&addr(1), 3), vec![1, 0, 0]);
        assert_eq!(forest.ancestors(&addr(1), 3), vec![addr(2)]);
    }

    #[test]
    fn test_ancestors_nearest_first() {
        let forest = ReferralForest::from_edges((1..6).map(|i| (addr(i + 1), addr(i))));
        assert_eq!(
            forest.ancestors(&addr(6), 3),
            vec![addr(5), addr(4), addr(3)]
        );
        assert!(forest.ancestors(&addr(1), 3).is_empty());
    }

    #[tokio::test]
    async fn test_incremental_refresh_matches_full_sweep() {
        let (storage, _temp_db) = setup_storage().await;
        let maintainer = ReferralMaintainer::new(storage.clone());

        // Chain A -> B -> C -> D plus a second branch under B
        let edges = [
            (addr(2), addr(1)),
            (addr(3), addr(2)),
            (addr(4), addr(3)),
            (addr(5), addr(2)),
            (addr(6), addr(5)),
        ];
        for (user, referrer) in edges {
            storage.set_referrer(&user, &referrer).await.unwrap();
            maintainer.refresh_user(&user).await.unwrap();
        }

        let mut incremental = Vec::new();
        for n in 1..=6 {
            let user = storage.get_user(&addr(n)).await.unwrap().unwrap();
            incremental.push((user.direct_referrals, user.indirect_referrals));
        }

        assert_eq!(maintainer.recalculate_all().await.unwrap(), 6);

        let mut swept = Vec::new();
        for n in 1..=6 {
            let user = storage.get_user(&addr(n)).await.unwrap().unwrap();
            assert_eq!(user.total_referrals, user.direct_referrals + user.indirect_referrals);
            swept.push((user.direct_referrals, user.indirect_referrals));
        }

        assert_eq!(incremental, swept);
        // A: direct B; indirect C, E, D, F
        assert_eq!(swept[0], (1, 4));
        // B: direct C, E; indirect D, F
        assert_eq!(swept[1], (2, 2));
        assert_eq!(swept[2], (1, 0));

        storage.close().await;
    }
}
