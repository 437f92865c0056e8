use std::collections::BTreeMap;

use super::StratumOrderedStore;
use crate::column::Stratum;

/// Strata keyed by rank in an ordered map.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StratumOrderedStoreDict {
    strata: BTreeMap<u64, Stratum>,
}

impl StratumOrderedStore for StratumOrderedStoreDict {
    fn deposit_stratum(&mut self, stratum: Stratum) {
        let Some(rank) = stratum.rank else {
            unreachable!("dict store keys strata by rank");
        };
        debug_assert!(self
            .strata
            .last_key_value()
            .map_or(true, |(&newest, _)| newest < rank));
        self.strata.insert(rank, stratum);
    }

    fn del_ranks(&mut self, ranks: &[u64]) {
        for rank in ranks {
            self.strata.remove(rank);
        }
    }

    fn get_num_strata_retained(&self) -> usize {
        self.strata.len()
    }

    fn get_stratum_at_column_index(&self, index: usize) -> Option<&Stratum> {
        self.strata.values().nth(index)
    }

    fn get_column_index_of_rank(&self, rank: u64) -> Option<usize> {
        self.strata
            .contains_key(&rank)
            .then(|| self.strata.range(..rank).count())
    }

    fn get_stratum_at_rank(&self, rank: u64) -> Option<&Stratum> {
        self.strata.get(&rank)
    }

    fn iter_retained_strata(&self) -> Box<dyn Iterator<Item = &Stratum> + '_> {
        Box::new(self.strata.values())
    }
}
