//! # Filter & Sort Engine
//!
//! Applies the list view's filter state to the candidate pool and orders
//! the survivors. Pure and synchronous: it is re-run on every filter change
//! and never mutates its input.
//!
//! Predicates, in order (all must pass):
//!
//! | # | Predicate | Passes when |
//! |---|-----------|-------------|
//! | a | category  | `All`, or the entity's category matches |
//! | b | search    | empty text, or a case-insensitive substring of any search field |
//! | c | radius    | `distance_from_center <= max_radius_km` |
//! | d | budget    | no budget set, no price on the entity, or `price_start <= max_price` |

use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};
use tracing::debug;

use crate::model::{Category, Entity, Value};
use crate::{Error, Result};

/// Radius used until the user picks one.
pub const DEFAULT_RADIUS_KM: f64 = 15.0;

// ============================================================================
// FilterState
// ============================================================================

/// Category predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

impl CategoryFilter {
    pub fn matches(&self, category: Category) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(c) => *c == category,
        }
    }
}

impl FromStr for CategoryFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "all" | "all types" => Ok(CategoryFilter::All),
            _ => s.parse().map(CategoryFilter::Only),
        }
    }
}

/// Immutable snapshot of the list view's filters.
///
/// Never mutated in place: every `with_*` returns a new, validated value, so
/// a reader always sees all predicates from the same snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawFilterState")]
pub struct FilterState {
    search_text: String,
    category: CategoryFilter,
    max_radius_km: f64,
    max_price: Option<f64>,
}

#[derive(Deserialize)]
struct RawFilterState {
    #[serde(default)]
    search_text: String,
    #[serde(default)]
    category: CategoryFilter,
    max_radius_km: f64,
    #[serde(default)]
    max_price: Option<f64>,
}

impl TryFrom<RawFilterState> for FilterState {
    type Error = Error;

    fn try_from(raw: RawFilterState) -> Result<Self> {
        FilterState::new(raw.search_text, raw.category, raw.max_radius_km)?
            .with_max_price(raw.max_price)
    }
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            search_text: String::new(),
            category: CategoryFilter::All,
            max_radius_km: DEFAULT_RADIUS_KM,
            max_price: None,
        }
    }
}

impl FilterState {
    /// The filters a fresh screen starts with.
    pub fn reset() -> Self {
        Self::default()
    }

    pub fn new(
        search_text: impl Into<String>,
        category: CategoryFilter,
        max_radius_km: f64,
    ) -> Result<Self> {
        check_radius(max_radius_km)?;
        Ok(Self {
            search_text: search_text.into(),
            category,
            max_radius_km,
            max_price: None,
        })
    }

    pub fn with_search(self, search_text: impl Into<String>) -> Self {
        Self { search_text: search_text.into(), ..self }
    }

    pub fn with_category(self, category: CategoryFilter) -> Self {
        Self { category, ..self }
    }

    pub fn with_radius(self, max_radius_km: f64) -> Result<Self> {
        check_radius(max_radius_km)?;
        Ok(Self { max_radius_km, ..self })
    }

    pub fn with_max_price(self, max_price: Option<f64>) -> Result<Self> {
        if let Some(p) = max_price {
            if !p.is_finite() || p < 0.0 {
                return Err(Error::InvalidArgument(format!("max_price must be finite and >= 0, got {p}")));
            }
        }
        Ok(Self { max_price, ..self })
    }

    pub fn search_text(&self) -> &str { &self.search_text }
    pub fn category(&self) -> CategoryFilter { self.category }
    pub fn max_radius_km(&self) -> f64 { self.max_radius_km }
    pub fn max_price(&self) -> Option<f64> { self.max_price }
}

fn check_radius(km: f64) -> Result<()> {
    if km.is_finite() && km > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidRadius(km))
    }
}

// ============================================================================
// Search fields & sort keys
// ============================================================================

/// Text the search predicate looks at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchField {
    Name,
    CategoryLabel,
    Attribute(String),
}

impl SearchField {
    fn text(&self, entity: &Entity) -> Option<String> {
        match self {
            SearchField::Name => Some(entity.name.clone()),
            SearchField::CategoryLabel => Some(entity.category.label().to_owned()),
            SearchField::Attribute(key) => entity.get(key).and_then(Value::search_text),
        }
    }
}

/// Ordering policy. Ties always break on id ascending.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Distance,
    RatingDesc,
    PriceAsc,
    Name,
    /// Newest first by a datetime attribute (e.g. `posted_at`).
    Recency { attribute: String },
}

/// Missing values sort after present ones regardless of direction.
fn cmp_present<T>(a: Option<T>, b: Option<T>, cmp: impl FnOnce(T, T) -> Ordering) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => cmp(a, b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl SortKey {
    fn compare(&self, a: &Entity, b: &Entity) -> Ordering {
        let primary = match self {
            SortKey::Distance => a.distance_from_center().total_cmp(&b.distance_from_center()),
            SortKey::RatingDesc => cmp_present(a.rating(), b.rating(), |x, y| y.total_cmp(&x)),
            SortKey::PriceAsc => cmp_present(a.price(), b.price(), |x, y| x.total_cmp(&y)),
            SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            SortKey::Recency { attribute } => cmp_present(
                a.get(attribute).and_then(Value::as_datetime),
                b.get(attribute).and_then(Value::as_datetime),
                |x, y| y.cmp(&x),
            ),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }
}

// ============================================================================
// FilterEngine
// ============================================================================

/// Filter + sort over a candidate pool.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterEngine {
    search_fields: SmallVec<[SearchField; 4]>,
    sort: SortKey,
}

impl Default for FilterEngine {
    fn default() -> Self {
        Self {
            search_fields: smallvec![SearchField::Name, SearchField::CategoryLabel],
            sort: SortKey::Distance,
        }
    }
}

impl FilterEngine {
    pub fn new(search_fields: impl IntoIterator<Item = SearchField>, sort: SortKey) -> Self {
        Self {
            search_fields: search_fields.into_iter().collect(),
            sort,
        }
    }

    pub fn with_sort(self, sort: SortKey) -> Self {
        Self { sort, ..self }
    }

    /// Does a single entity pass every predicate?
    pub fn matches(&self, entity: &Entity, filter: &FilterState) -> bool {
        if !filter.category.matches(entity.category) {
            return false;
        }
        if !filter.search_text.is_empty() {
            let needle = filter.search_text.to_lowercase();
            let hit = self
                .search_fields
                .iter()
                .filter_map(|f| f.text(entity))
                .any(|text| text.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        if entity.distance_from_center() > filter.max_radius_km {
            return false;
        }
        match (filter.max_price, entity.price()) {
            (Some(budget), Some(price)) => price <= budget,
            _ => true,
        }
    }

    /// Filter and order. Returns a new list; an empty list is a valid answer.
    pub fn apply(&self, entities: &[Entity], filter: &FilterState) -> Vec<Entity> {
        let mut out: Vec<Entity> = entities
            .iter()
            .filter(|e| self.matches(e, filter))
            .cloned()
            .collect();
        out.sort_by(|a, b| self.sort.compare(a, b));
        debug!(
            candidates = entities.len(),
            matched = out.len(),
            radius_km = filter.max_radius_km,
            "applied filters"
        );
        out
    }
}

// ============================================================================
// FilterCell: generation-stamped snapshots
// ============================================================================

/// Monotonic filter-state generation. Reconciliation for an older generation
/// than the latest applied one is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Generation(self.0 + 1)
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// A filter state together with the generation it was published under.
#[derive(Debug, Clone)]
pub struct FilterSnapshot {
    pub generation: Generation,
    pub state: Arc<FilterState>,
}

/// Holder of the current filter snapshot. Replacement swaps the whole
/// snapshot at once; readers never observe a half-updated state.
pub struct FilterCell {
    current: RwLock<FilterSnapshot>,
}

impl FilterCell {
    pub fn new(state: FilterState) -> Self {
        Self {
            current: RwLock::new(FilterSnapshot {
                generation: Generation::default(),
                state: Arc::new(state),
            }),
        }
    }

    pub fn snapshot(&self) -> FilterSnapshot {
        self.current.read().clone()
    }

    /// Publish a new state under the next generation.
    pub fn replace(&self, state: FilterState) -> FilterSnapshot {
        let mut current = self.current.write();
        let next = FilterSnapshot {
            generation: current.generation.next(),
            state: Arc::new(state),
        };
        *current = next.clone();
        debug!(generation = %next.generation, "filter state replaced");
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityId, GeoPoint};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn center() -> GeoPoint {
        GeoPoint::new(28.6139, 77.2090).unwrap()
    }

    /// Entity `km` kilometers due north of the center.
    fn at_km(id: &str, name: &str, category: Category, km: f64) -> Entity {
        let p = GeoPoint::new(28.6139 + km / crate::distance::KM_PER_DEGREE, 77.2090).unwrap();
        Entity::new(id, name, category, p).anchored_at(center())
    }

    fn pool() -> Vec<Entity> {
        vec![
            at_km("s1", "Paws & Claws Clinic", Category::Vet, 2.0)
                .with_attribute("rating", 4.8)
                .with_attribute("price_start", 500),
            at_km("s2", "Happy Tails Grooming", Category::Groomer, 0.5)
                .with_attribute("rating", 4.2)
                .with_attribute("price_start", 350),
            at_km("s3", "City Pet Hospital", Category::Vet, 1.0)
                .with_attribute("rating", 4.8),
            at_km("s4", "Bark Avenue Spa", Category::Groomer, 6.0)
                .with_attribute("price_start", 900),
        ]
    }

    fn ids(v: &[Entity]) -> Vec<&str> {
        v.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_default_orders_by_distance() {
        let out = FilterEngine::default().apply(&pool(), &FilterState::default());
        assert_eq!(ids(&out), vec!["s2", "s3", "s1", "s4"]);
    }

    #[test]
    fn test_category_and_radius() {
        let f = FilterState::new("", CategoryFilter::Only(Category::Vet), 1.5).unwrap();
        let out = FilterEngine::default().apply(&pool(), &f);
        assert_eq!(ids(&out), vec!["s3"]);
    }

    #[test]
    fn test_search_is_case_insensitive_over_fields() {
        let engine = FilterEngine::default();
        let out = engine.apply(&pool(), &FilterState::default().with_search("HOSPITAL"));
        assert_eq!(ids(&out), vec!["s3"]);
        // category label is a search field by default
        let out = engine.apply(&pool(), &FilterState::default().with_search("groom"));
        assert_eq!(ids(&out), vec!["s2", "s4"]);
    }

    #[test]
    fn test_search_attribute_field() {
        let pool = vec![
            at_km("n1", "Rohan Iyer", Category::Dog, 0.5).with_attribute("breed", "Indie"),
            at_km("n2", "Simran K", Category::Cat, 1.2).with_attribute("breed", "Persian"),
        ];
        let engine = FilterEngine::new(
            [SearchField::Name, SearchField::Attribute("breed".into())],
            SortKey::Distance,
        );
        let out = engine.apply(&pool, &FilterState::default().with_search("persian"));
        assert_eq!(ids(&out), vec!["n2"]);
    }

    #[test]
    fn test_budget_predicate() {
        let f = FilterState::default().with_max_price(Some(500.0)).unwrap();
        let out = FilterEngine::default().apply(&pool(), &f);
        // s3 has no price and passes
        assert_eq!(ids(&out), vec!["s2", "s3", "s1"]);
    }

    #[test]
    fn test_rating_sort_breaks_ties_by_id() {
        let engine = FilterEngine::default().with_sort(SortKey::RatingDesc);
        let out = engine.apply(&pool(), &FilterState::default());
        assert_eq!(ids(&out), vec!["s1", "s3", "s2", "s4"]);
    }

    #[test]
    fn test_price_sort_missing_last() {
        let engine = FilterEngine::default().with_sort(SortKey::PriceAsc);
        let out = engine.apply(&pool(), &FilterState::default());
        assert_eq!(ids(&out), vec!["s2", "s1", "s4", "s3"]);
    }

    #[test]
    fn test_recency_sort() {
        let t = |d| Utc.with_ymd_and_hms(2024, 5, d, 9, 0, 0).unwrap();
        let pool = vec![
            at_km("a", "Lost beagle", Category::Dog, 1.0).with_attribute("posted_at", t(1)),
            at_km("b", "Found cat", Category::Cat, 2.0).with_attribute("posted_at", t(3)),
            at_km("c", "Parrot", Category::Other, 0.2),
        ];
        let engine = FilterEngine::default().with_sort(SortKey::Recency { attribute: "posted_at".into() });
        let out = engine.apply(&pool, &FilterState::default());
        assert_eq!(ids(&out), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_apply_does_not_mutate_input() {
        let input = pool();
        let before = input.clone();
        let _ = FilterEngine::default().apply(&input, &FilterState::default().with_search("x"));
        assert_eq!(input, before);
    }

    #[test]
    fn test_radius_precondition() {
        assert!(matches!(FilterState::default().with_radius(0.0), Err(Error::InvalidRadius(_))));
        assert!(FilterState::default().with_radius(-3.0).is_err());
        assert!(FilterState::default().with_radius(f64::NAN).is_err());
        assert!(FilterState::default().with_max_price(Some(-1.0)).is_err());
        let bad = serde_json::from_str::<FilterState>(r#"{"max_radius_km": 0}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_reset_clears_every_predicate() {
        let narrowed = FilterState::new("clinic", CategoryFilter::Only(Category::Vet), 2.0)
            .unwrap()
            .with_max_price(Some(400.0))
            .unwrap();
        assert_ne!(narrowed, FilterState::reset());

        let reset = FilterState::reset();
        assert_eq!(reset.search_text(), "");
        assert_eq!(reset.category(), CategoryFilter::All);
        assert_eq!(reset.max_radius_km(), DEFAULT_RADIUS_KM);
        assert_eq!(reset.max_price(), None);
        assert_eq!(FilterEngine::default().apply(&pool(), &reset).len(), 4);
    }

    #[test]
    fn test_category_filter_labels() {
        assert_eq!("All Types".parse::<CategoryFilter>().unwrap(), CategoryFilter::All);
        assert_eq!(
            "Cats Only".parse::<CategoryFilter>().unwrap(),
            CategoryFilter::Only(Category::Cat)
        );
    }

    #[test]
    fn test_filter_cell_generations() {
        let cell = FilterCell::new(FilterState::default());
        assert_eq!(cell.snapshot().generation, Generation(0));
        let s = cell.replace(FilterState::default().with_search("vet"));
        assert_eq!(s.generation, Generation(1));
        assert_eq!(cell.snapshot().state.search_text(), "vet");
    }

    fn arb_pool() -> impl Strategy<Value = Vec<Entity>> {
        let names = ["Paws", "Tails", "Bark", "Clinic", "Spa", "Mimi"];
        prop::collection::vec((0.0f64..20.0, 0usize..6, 0usize..9), 0..40).prop_map(move |rows| {
            rows.into_iter()
                .enumerate()
                .map(|(i, (km, n, c))| {
                    let mut e = at_km("x", names[n], Category::ALL[c], km);
                    e.id = EntityId(format!("e{i}"));
                    e
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_shrinking_radius_never_grows(pool in arb_pool(), r1 in 0.1f64..25.0, r2 in 0.1f64..25.0) {
            let (small, large) = if r1 <= r2 { (r1, r2) } else { (r2, r1) };
            let engine = FilterEngine::default();
            let a = engine.apply(&pool, &FilterState::default().with_radius(large).unwrap());
            let b = engine.apply(&pool, &FilterState::default().with_radius(small).unwrap());
            prop_assert!(b.len() <= a.len());
        }

        #[test]
        fn prop_search_tightening_never_grows(pool in arb_pool(), needle in "[a-z]{1,3}") {
            let engine = FilterEngine::default();
            let all = engine.apply(&pool, &FilterState::default());
            let some = engine.apply(&pool, &FilterState::default().with_search(needle));
            prop_assert!(some.len() <= all.len());
        }

        #[test]
        fn prop_apply_is_repeatable(pool in arb_pool(), r in 0.1f64..25.0) {
            let engine = FilterEngine::default().with_sort(SortKey::Name);
            let f = FilterState::default().with_radius(r).unwrap();
            prop_assert_eq!(engine.apply(&pool, &f), engine.apply(&pool, &f));
        }
    }
}
