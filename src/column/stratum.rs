use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::differentia::Differentia;

/// Opaque user payload carried alongside a stratum, shared by reference
/// between clones.
pub type Annotation = Arc<serde_json::Value>;

/// A single stratum: a random differentia fingerprint, usually paired with
/// its deposition rank.
///
/// `rank` is `None` in columns whose policy recomputes ranks from the column
/// index; the column then answers every rank query through the policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stratum {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u64>,
    pub differentia: Differentia,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<Annotation>,
}

impl Stratum {
    pub fn new(rank: u64, differentia: Differentia) -> Self {
        Self {
            rank: Some(rank),
            differentia,
            annotation: None,
        }
    }

    pub fn without_rank(differentia: Differentia) -> Self {
        Self {
            rank: None,
            differentia,
            annotation: None,
        }
    }

    pub fn with_annotation(mut self, annotation: Option<Annotation>) -> Self {
        self.annotation = annotation;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn annotation_shared_between_clones() {
        let stratum = Stratum::new(3, Differentia::new(9, 8))
            .with_annotation(Some(Arc::new(json!({ "taxon": "a" }))));
        let copy = stratum.clone();
        assert!(Arc::ptr_eq(
            stratum.annotation.as_ref().unwrap(),
            copy.annotation.as_ref().unwrap()
        ));
    }

    #[test]
    fn serializes_without_empty_annotation() {
        let stratum = Stratum::new(3, Differentia::new(9, 8));
        assert_eq!(
            serde_json::to_value(&stratum).unwrap(),
            json!({ "rank": 3, "differentia": 9 })
        );
        assert_eq!(
            serde_json::to_value(Stratum::without_rank(Differentia::new(9, 8))).unwrap(),
            json!({ "differentia": 9 })
        );
        let parsed: Stratum = serde_json::from_value(json!({ "differentia": 9 })).unwrap();
        assert_eq!(parsed.rank, None);
    }
}
