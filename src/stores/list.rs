use super::StratumOrderedStore;
use crate::column::Stratum;

/// Contiguous vector of strata; rank lookups by binary search.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StratumOrderedStoreList {
    strata: Vec<Stratum>,
}

impl StratumOrderedStore for StratumOrderedStoreList {
    const RANDOM_ACCESS: bool = true;

    fn deposit_stratum(&mut self, stratum: Stratum) {
        debug_assert!(self
            .strata
            .last()
            .map_or(true, |s| stratum.rank.is_none() || s.rank < stratum.rank));
        self.strata.push(stratum);
    }

    fn del_ranks(&mut self, ranks: &[u64]) {
        match ranks {
            [] => {}
            // Usually the former newest stratum, so removal is near the end.
            [rank] => {
                if let Some(index) = self.get_column_index_of_rank(*rank) {
                    self.strata.remove(index);
                }
            }
            _ => {
                let mut condemned = ranks.to_vec();
                condemned.sort_unstable();
                self.strata.retain(|s| {
                    s.rank
                        .map_or(true, |rank| condemned.binary_search(&rank).is_err())
                });
            }
        }
    }

    fn del_column_indices(&mut self, indices: &[usize]) {
        match indices {
            [] => {}
            [index] => {
                if *index < self.strata.len() {
                    self.strata.remove(*index);
                }
            }
            _ => {
                let mut condemned = indices.to_vec();
                condemned.sort_unstable();
                let mut index = 0;
                self.strata.retain(|_| {
                    let keep = condemned.binary_search(&index).is_err();
                    index += 1;
                    keep
                });
            }
        }
    }

    fn get_num_strata_retained(&self) -> usize {
        self.strata.len()
    }

    fn get_stratum_at_column_index(&self, index: usize) -> Option<&Stratum> {
        self.strata.get(index)
    }

    fn get_column_index_of_rank(&self, rank: u64) -> Option<usize> {
        self.strata.binary_search_by_key(&Some(rank), |s| s.rank).ok()
    }

    fn iter_retained_strata(&self) -> Box<dyn Iterator<Item = &Stratum> + '_> {
        Box::new(self.strata.iter())
    }
}
