use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use super::StratumOrderedStore;
use crate::column::Stratum;

struct TreeNode {
    stratum: Stratum,
    parent: Option<Arc<TreeNode>>,
}

impl Drop for TreeNode {
    // Unlink iteratively so long uniquely-owned chains don't overflow the stack.
    fn drop(&mut self) {
        let mut next = self.parent.take();
        while let Some(node) = next {
            match Arc::try_unwrap(node) {
                Ok(mut node) => next = node.parent.take(),
                Err(_) => break,
            }
        }
    }
}

/// Strata as a parent-linked chain from the newest stratum back to rank 0.
///
/// Clones share every node, so copying a column is O(1) and descendants keep
/// pointing at their ancestor's strata until a deletion forces a rebuild of
/// the strata newer than the deleted rank.
#[derive(Clone, Default)]
pub struct StratumOrderedStoreTree {
    leaf: Option<Arc<TreeNode>>,
    num_strata_retained: usize,
}

impl StratumOrderedStoreTree {
    fn iter_newest_first(&self) -> impl Iterator<Item = &TreeNode> {
        std::iter::successors(self.leaf.as_deref(), |node| node.parent.as_deref())
    }
}

impl fmt::Debug for StratumOrderedStoreTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter_retained_strata()).finish()
    }
}

impl StratumOrderedStore for StratumOrderedStoreTree {
    fn deposit_stratum(&mut self, stratum: Stratum) {
        debug_assert!(self
            .leaf
            .as_ref()
            .map_or(true, |leaf| stratum.rank.is_none() || leaf.stratum.rank < stratum.rank));
        let parent = self.leaf.take();
        self.leaf = Some(Arc::new(TreeNode { stratum, parent }));
        self.num_strata_retained += 1;
    }

    fn del_ranks(&mut self, ranks: &[u64]) {
        let condemned: BTreeSet<u64> = ranks.iter().copied().collect();
        let Some(&oldest_condemned) = condemned.first() else {
            return;
        };

        let mut kept_newer = Vec::new();
        let mut num_deleted = 0;
        let mut base = self.leaf.clone();
        while let Some(node) = base {
            if node.stratum.rank < Some(oldest_condemned) {
                base = Some(node);
                break;
            }
            if node.stratum.rank.is_some_and(|rank| condemned.contains(&rank)) {
                num_deleted += 1;
            } else {
                kept_newer.push(node.stratum.clone());
            }
            base = node.parent.clone();
        }

        for stratum in kept_newer.into_iter().rev() {
            base = Some(Arc::new(TreeNode {
                stratum,
                parent: base,
            }));
        }
        self.leaf = base;
        self.num_strata_retained -= num_deleted;
    }

    fn get_num_strata_retained(&self) -> usize {
        self.num_strata_retained
    }

    fn get_stratum_at_column_index(&self, index: usize) -> Option<&Stratum> {
        let steps_from_leaf = self.num_strata_retained.checked_sub(index + 1)?;
        self.iter_newest_first()
            .nth(steps_from_leaf)
            .map(|node| &node.stratum)
    }

    fn get_column_index_of_rank(&self, rank: u64) -> Option<usize> {
        self.iter_newest_first()
            .take_while(|node| node.stratum.rank >= Some(rank))
            .position(|node| node.stratum.rank == Some(rank))
            .map(|steps_from_leaf| self.num_strata_retained - 1 - steps_from_leaf)
    }

    fn iter_retained_strata(&self) -> Box<dyn Iterator<Item = &Stratum> + '_> {
        let mut strata: Vec<&Stratum> = self.iter_newest_first().map(|n| &n.stratum).collect();
        strata.reverse();
        Box::new(strata.into_iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::differentia::Differentia;

    #[test]
    fn satisfies_store_contract() {
        super::super::check_store_contract::<StratumOrderedStoreTree>();
    }

    #[test]
    fn clones_share_older_nodes() {
        let mut store = StratumOrderedStoreTree::default();
        for rank in 0..5 {
            store.deposit_stratum(Stratum::new(rank, Differentia::new(rank, 8)));
        }
        let mut child = store.clone();
        child.del_ranks(&[4]);
        child.deposit_stratum(Stratum::new(5, Differentia::new(0, 8)));

        let parent_node = store.iter_newest_first().nth(1).unwrap();
        let child_node = child.iter_newest_first().nth(1).unwrap();
        assert!(std::ptr::eq(parent_node, child_node));
    }

    #[test]
    fn drops_long_chain() {
        let mut store = StratumOrderedStoreTree::default();
        for rank in 0..200_000 {
            store.deposit_stratum(Stratum::new(rank, Differentia::new(0, 1)));
        }
        assert_eq!(store.get_num_strata_retained(), 200_000);
        drop(store);
    }
}
