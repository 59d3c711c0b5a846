use std::collections::HashMap;
use std::sync::Mutex;

/// How a symbol group is ordered for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMode {
    /// Reference ranking (market rank); symbols without a rank keep their
    /// original list position, after the ranked ones.
    #[default]
    Natural,
    Ascending,
    Descending,
}

impl SortMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "natural" => Some(Self::Natural),
            "ascending" => Some(Self::Ascending),
            "descending" => Some(Self::Descending),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Natural => "natural",
            Self::Ascending => "ascending",
            Self::Descending => "descending",
        }
    }
}

#[derive(Default)]
struct GroupState {
    values: HashMap<String, f64>,
    mode: SortMode,
}

#[derive(Default)]
struct Inner {
    groups: HashMap<String, GroupState>,
    reference_rank: HashMap<String, usize>,
}

/// Per-group scalar snapshots used purely for ordering.
///
/// Kept separate from the full record cache: ordering only needs the latest
/// value per symbol, which is far cheaper to populate than full history.
#[derive(Default)]
pub struct SortEngine {
    inner: Mutex<Inner>,
}

impl SortEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the market-rank reference ordering used by `Natural` mode.
    /// Position in `symbols` is the rank, best first.
    pub fn set_reference_ranking(&self, symbols: &[String]) {
        let mut inner = self.inner.lock().unwrap();
        inner.reference_rank = symbols
            .iter()
            .enumerate()
            .map(|(rank, s)| (s.clone(), rank))
            .collect();
    }

    pub fn set_mode(&self, group: &str, mode: SortMode) {
        let mut inner = self.inner.lock().unwrap();
        inner.groups.entry(group.to_owned()).or_default().mode = mode;
    }

    pub fn mode(&self, group: &str) -> SortMode {
        let inner = self.inner.lock().unwrap();
        inner.groups.get(group).map(|g| g.mode).unwrap_or_default()
    }

    pub fn record_value(&self, group: &str, symbol: &str, value: f64) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .groups
            .entry(group.to_owned())
            .or_default()
            .values
            .insert(symbol.to_owned(), value);
    }

    pub fn value(&self, group: &str, symbol: &str) -> Option<f64> {
        let inner = self.inner.lock().unwrap();
        inner
            .groups
            .get(group)
            .and_then(|g| g.values.get(symbol))
            .copied()
    }

    #[allow(dead_code)]
    pub fn has_value(&self, group: &str, symbol: &str) -> bool {
        self.value(group, symbol).is_some()
    }

    /// Drop every snapshot; modes survive. Runs alongside the cache's
    /// `invalidate_all` on any parameter change.
    pub fn clear_values(&self) {
        let mut inner = self.inner.lock().unwrap();
        for group in inner.groups.values_mut() {
            group.values.clear();
        }
    }

    /// Order `symbols` by the group's active mode.
    ///
    /// Missing values sort to the worst end of the active direction
    /// (descending treats missing as -inf, ascending as +inf) so unloaded
    /// symbols float to the bottom without corrupting the partial ordering
    /// already computed. Ties keep original list position.
    pub fn order(&self, group: &str, symbols: &[String]) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        let state = inner.groups.get(group);
        let mode = state.map(|g| g.mode).unwrap_or_default();

        let mut out: Vec<String> = symbols.to_vec();
        match mode {
            SortMode::Natural => {
                let rank = &inner.reference_rank;
                let original: HashMap<&str, usize> = symbols
                    .iter()
                    .enumerate()
                    .map(|(i, s)| (s.as_str(), i))
                    .collect();
                out.sort_by_key(|s| {
                    (
                        rank.get(s).copied().unwrap_or(usize::MAX),
                        original[s.as_str()],
                    )
                });
            }
            SortMode::Ascending => {
                let key = |s: &str| -> f64 {
                    state
                        .and_then(|g| g.values.get(s))
                        .copied()
                        .unwrap_or(f64::INFINITY)
                };
                out.sort_by(|a, b| key(a).total_cmp(&key(b)));
            }
            SortMode::Descending => {
                let key = |s: &str| -> f64 {
                    state
                        .and_then(|g| g.values.get(s))
                        .copied()
                        .unwrap_or(f64::NEG_INFINITY)
                };
                out.sort_by(|a, b| key(b).total_cmp(&key(a)));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn sort_mode_round_trip() {
        for mode in [SortMode::Natural, SortMode::Ascending, SortMode::Descending] {
            assert_eq!(SortMode::from_str(mode.as_str()), Some(mode));
        }
        assert_eq!(SortMode::from_str("sideways"), None);
    }

    #[test]
    fn missing_values_sort_to_worst_end() {
        let engine = SortEngine::new();
        engine.record_value("g", "A", 10.0);
        engine.record_value("g", "C", 30.0);
        let list = symbols(&["A", "B", "C"]);

        engine.set_mode("g", SortMode::Ascending);
        assert_eq!(engine.order("g", &list), symbols(&["A", "C", "B"]));

        engine.set_mode("g", SortMode::Descending);
        assert_eq!(engine.order("g", &list), symbols(&["C", "A", "B"]));
    }

    #[test]
    fn ties_keep_original_list_position() {
        let engine = SortEngine::new();
        for s in ["A", "B", "C"] {
            engine.record_value("g", s, 50.0);
        }
        let list = symbols(&["A", "B", "C"]);
        engine.set_mode("g", SortMode::Ascending);
        assert_eq!(engine.order("g", &list), list);
        engine.set_mode("g", SortMode::Descending);
        assert_eq!(engine.order("g", &list), list);
    }

    #[test]
    fn natural_uses_reference_ranking_with_fallback() {
        let engine = SortEngine::new();
        engine.set_reference_ranking(&symbols(&["C", "A"]));
        // B and D are unranked: they keep original relative order, after
        // the ranked symbols.
        let list = symbols(&["A", "B", "C", "D"]);
        assert_eq!(engine.order("g", &list), symbols(&["C", "A", "B", "D"]));
    }

    #[test]
    fn natural_without_ranking_keeps_original_order() {
        let engine = SortEngine::new();
        let list = symbols(&["B", "A", "C"]);
        assert_eq!(engine.order("g", &list), list);
    }

    #[test]
    fn clear_values_keeps_modes() {
        let engine = SortEngine::new();
        engine.set_mode("g", SortMode::Descending);
        engine.record_value("g", "A", 1.0);
        engine.clear_values();
        assert!(!engine.has_value("g", "A"));
        assert_eq!(engine.mode("g"), SortMode::Descending);
    }

    #[test]
    fn groups_are_independent() {
        let engine = SortEngine::new();
        engine.record_value("g1", "A", 1.0);
        assert!(engine.has_value("g1", "A"));
        assert!(!engine.has_value("g2", "A"));
    }
}
