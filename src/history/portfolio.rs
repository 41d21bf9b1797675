use crate::assets::AssetId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Signed per-asset reservation deltas for one trader. Composes by
/// pointwise addition; the empty map is the identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenPortfolio(pub HashMap<Option<AssetId>, i64>);

impl OpenPortfolio {
    pub fn new() -> Self {
        OpenPortfolio::default()
    }

    pub fn add(&mut self, asset: Option<AssetId>, delta: i64) {
        if delta != 0 {
            let slot = self.0.entry(asset).or_insert(0);
            *slot += delta;
            if *slot == 0 {
                self.0.remove(&asset);
            }
        }
    }

    pub fn combine(mut self, other: OpenPortfolio) -> OpenPortfolio {
        for (asset, delta) in other.0 {
            self.add(asset, delta);
        }
        self
    }

    /// Pointwise negation, used to release everything a live order holds.
    pub fn negate(&self) -> OpenPortfolio {
        OpenPortfolio(self.0.iter().map(|(a, d)| (*a, -d)).collect())
    }

    pub fn get(&self, asset: &Option<AssetId>) -> i64 {
        self.0.get(asset).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Option<AssetId>, &i64)> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointwise_addition_and_identity() {
        let mut a = OpenPortfolio::new();
        a.add(None, 10);
        a.add(Some(AssetId([7; 32])), 5);

        let mut b = OpenPortfolio::new();
        b.add(None, -4);

        let combined = a.clone().combine(b);
        assert_eq!(combined.get(&None), 6);
        assert_eq!(combined.get(&Some(AssetId([7; 32]))), 5);

        assert_eq!(a.clone().combine(OpenPortfolio::new()), a);
    }

    #[test]
    fn test_zero_entries_collapse() {
        let mut p = OpenPortfolio::new();
        p.add(None, 3);
        p.add(None, -3);
        assert!(p.is_empty());
        assert_eq!(p.clone().combine(p.negate()), OpenPortfolio::new());
    }
}
