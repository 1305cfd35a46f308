//! Filter, search and sort over a [`Dataset`], producing an ordered list of row indices.
//!
//! The stages always run in the same order: per-column filters narrow first,
//! the global search narrows what is left, and only then is the survivor set
//! sorted. The chart is built from the output of the first two stages.

use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::trace;

use crate::store::Dataset;

/// Per-column substring patterns, ANDed together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    patterns: BTreeMap<String, String>,
}

impl FilterSet {
    /// Set the pattern for `column`. An empty pattern removes the filter.
    pub fn set(&mut self, column: &str, pattern: &str) {
        if pattern.is_empty() {
            self.patterns.remove(column);
        } else {
            self.patterns.insert(column.to_string(), pattern.to_string());
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.patterns.get(column).map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.patterns.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.patterns.iter().map(|(c, p)| (c.as_str(), p.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn flip(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec {
    pub column: Option<String>,
    pub direction: SortDirection,
}

impl SortSpec {
    #[cfg(test)]
    pub fn by(column: &str, direction: SortDirection) -> Self {
        Self {
            column: Some(column.to_string()),
            direction,
        }
    }

    /// Selecting the active column flips its direction, any other column starts ascending.
    pub fn toggle(&mut self, column: &str) {
        if self.column.as_deref() == Some(column) {
            self.direction = self.direction.flip();
        } else {
            self.column = Some(column.to_string());
            self.direction = SortDirection::Ascending;
        }
    }

    pub fn is_active(&self, column: &str) -> bool {
        self.column.as_deref() == Some(column)
    }
}

/// Lowercased copy of one column, indexed by row.
fn fold_column(dataset: &Dataset, cidx: usize) -> Vec<String> {
    (0..dataset.len())
        .map(|ridx| dataset.cell(ridx, cidx).to_lowercase())
        .collect()
}

/// Filter and search stages, in dataset order.
pub fn select(dataset: &Dataset, filters: &FilterSet, search: &str) -> Vec<usize> {
    let start_time = Instant::now();

    // Resolve columns once; `None` stands for a column the dataset does not have.
    let constraints: Vec<(Option<usize>, String)> = filters
        .iter()
        .map(|(column, pattern)| (dataset.column_index(column), pattern.to_lowercase()))
        .collect();
    let search = search.to_lowercase();
    let ncols = dataset.columns().len();

    // Each column is folded at most once.
    let folded: Vec<Option<Vec<String>>> = (0..ncols)
        .into_par_iter()
        .map(|cidx| {
            let needed =
                !search.is_empty() || constraints.iter().any(|(c, _)| *c == Some(cidx));
            needed.then(|| fold_column(dataset, cidx))
        })
        .collect();

    let rows: Vec<usize> = (0..dataset.len())
        .into_par_iter()
        .filter(|&ridx| {
            constraints.iter().all(|(cidx, pattern)| {
                match cidx.and_then(|c| folded[c].as_ref()) {
                    Some(column) => column[ridx].contains(pattern.as_str()),
                    None => pattern.is_empty(),
                }
            })
        })
        .filter(|&ridx| {
            search.is_empty()
                || folded
                    .iter()
                    .flatten()
                    .any(|column| column[ridx].contains(search.as_str()))
        })
        .collect();

    trace!(
        "Selected {}/{} rows in {}ms",
        rows.len(),
        dataset.len(),
        start_time.elapsed().as_millis()
    );
    rows
}

fn as_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Three-way comparison of two cell values.
///
/// Numbers compare by value and come before text; text compares lexically.
pub fn compare_values(a: &str, b: &str) -> Ordering {
    match (as_number(a), as_number(b)) {
        (Some(a_num), Some(b_num)) => a_num.partial_cmp(&b_num).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Sort stage. Stable, so equal keys keep their incoming order in both directions.
pub fn sort_rows(dataset: &Dataset, mut rows: Vec<usize>, sort: &SortSpec) -> Vec<usize> {
    let Some(column) = sort.column.as_deref() else {
        return rows;
    };
    let cidx = dataset.column_index(column);
    let key = |ridx: usize| cidx.map(|c| dataset.cell(ridx, c)).unwrap_or("");

    match sort.direction {
        SortDirection::Ascending => rows.sort_by(|&a, &b| compare_values(key(a), key(b))),
        SortDirection::Descending => rows.sort_by(|&a, &b| compare_values(key(b), key(a))),
    }
    rows
}

/// Full pipeline: filter, then search, then sort.
pub fn evaluate(dataset: &Dataset, filters: &FilterSet, search: &str, sort: &SortSpec) -> Vec<usize> {
    sort_rows(dataset, select(dataset, filters, search), sort)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dataset() -> Dataset {
        Dataset::from_records(
            vec!["id".into(), "entity_type".into(), "city".into()],
            vec![
                vec!["3".into(), "Person".into(), "Vienna".into()],
                vec!["10".into(), "company".into(), "Berlin".into()],
                vec!["2".into(), "person".into(), "berlin".into()],
                vec!["2".into(), "Company".into(), "Graz".into()],
                vec!["".into(), "person".into(), "Linz".into()],
            ],
        )
    }

    #[test]
    fn empty_query_keeps_everything_in_order() {
        let ds = dataset();
        let rows = evaluate(&ds, &FilterSet::default(), "", &SortSpec::default());
        assert_eq!(rows, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn filters_are_case_insensitive_and_anded() {
        let ds = dataset();
        let mut filters = FilterSet::default();
        filters.set("entity_type", "PERSON");
        assert_eq!(select(&ds, &filters, ""), vec![0, 2, 4]);

        filters.set("city", "ber");
        assert_eq!(select(&ds, &filters, ""), vec![2]);
    }

    #[test]
    fn empty_pattern_removes_filter() {
        let mut filters = FilterSet::default();
        filters.set("city", "graz");
        filters.set("city", "");
        assert!(filters.is_empty());
    }

    #[test]
    fn filter_on_missing_column_matches_nothing_but_empty() {
        let ds = dataset();
        let mut filters = FilterSet::default();
        filters.set("nope", "x");
        assert!(select(&ds, &filters, "").is_empty());
    }

    #[test]
    fn folding_handles_non_ascii_and_repeated_queries() {
        let ds = Dataset::from_records(
            vec!["name".into(), "city".into()],
            vec![
                vec!["Ärger".into(), "MÜNCHEN".into()],
                vec!["anna".into(), "münster".into()],
                vec!["Bob".into(), "Graz".into()],
            ],
        );
        let mut filters = FilterSet::default();
        filters.set("city", "MÜN");
        assert_eq!(select(&ds, &filters, ""), vec![0, 1]);
        assert_eq!(select(&ds, &filters, "är"), vec![0]);
        // the same column used by a filter and the search
        assert_eq!(select(&ds, &filters, "CHEN"), vec![0]);
        assert_eq!(select(&ds, &FilterSet::default(), "z"), vec![2]);
    }

    #[test]
    fn search_is_or_across_columns_after_filters() {
        let ds = dataset();
        assert_eq!(select(&ds, &FilterSet::default(), "BERLIN"), vec![1, 2]);

        let mut filters = FilterSet::default();
        filters.set("entity_type", "company");
        assert_eq!(select(&ds, &filters, "berlin"), vec![1]);
        assert_eq!(select(&ds, &filters, "2"), vec![3]);
    }

    #[test]
    fn numbers_sort_by_value_before_text() {
        let ds = dataset();
        let rows = evaluate(&ds, &FilterSet::default(), "", &SortSpec::by("id", SortDirection::Ascending));
        // 2, 2 (stable), 3, 10, then the empty cell
        assert_eq!(rows, vec![2, 3, 0, 1, 4]);
    }

    #[test]
    fn descending_keeps_equal_keys_in_prior_order() {
        let ds = dataset();
        let rows = evaluate(&ds, &FilterSet::default(), "", &SortSpec::by("id", SortDirection::Descending));
        assert_eq!(rows, vec![4, 1, 0, 2, 3]);
    }

    #[test]
    fn sort_on_unknown_column_keeps_order() {
        let ds = dataset();
        let rows = evaluate(&ds, &FilterSet::default(), "", &SortSpec::by("nope", SortDirection::Descending));
        assert_eq!(rows, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn toggle_policy() {
        let mut sort = SortSpec::default();
        sort.toggle("id");
        assert_eq!(sort, SortSpec::by("id", SortDirection::Ascending));
        sort.toggle("id");
        assert_eq!(sort, SortSpec::by("id", SortDirection::Descending));
        sort.toggle("city");
        assert_eq!(sort, SortSpec::by("city", SortDirection::Ascending));
    }

    #[test]
    fn compare_values_ignores_nan_spelling() {
        assert_eq!(compare_values("NaN", "1"), Ordering::Greater);
        assert_eq!(compare_values("1.5", "01.50"), Ordering::Equal);
        assert_eq!(compare_values("abc", "abd"), Ordering::Less);
    }

    fn records() -> impl Strategy<Value = Vec<Vec<String>>> {
        prop::collection::vec(prop::collection::vec("[a-cA-C0-2]{0,3}", 3), 0..40)
    }

    proptest! {
        #[test]
        fn prop_filter_survival(records in records(), pattern in "[a-cA-C0-2]{0,2}") {
            let columns = vec!["x".to_string(), "y".to_string(), "z".to_string()];
            let ds = Dataset::from_records(columns, records.clone());
            let mut filters = FilterSet::default();
            filters.set("y", &pattern);
            let rows = select(&ds, &filters, "");
            let expected: Vec<usize> = records
                .iter()
                .enumerate()
                .filter(|(_, r)| r[1].to_lowercase().contains(&pattern.to_lowercase()))
                .map(|(i, _)| i)
                .collect();
            prop_assert_eq!(rows, expected);
        }

        #[test]
        fn prop_search_survival(records in records(), query in "[a-cA-C0-2]{0,2}") {
            let columns = vec!["x".to_string(), "y".to_string(), "z".to_string()];
            let ds = Dataset::from_records(columns, records.clone());
            let rows = select(&ds, &FilterSet::default(), &query);
            let q = query.to_lowercase();
            let expected: Vec<usize> = records
                .iter()
                .enumerate()
                .filter(|(_, r)| q.is_empty() || r.iter().any(|c| c.to_lowercase().contains(&q)))
                .map(|(i, _)| i)
                .collect();
            prop_assert_eq!(rows, expected);
        }

        #[test]
        fn prop_sort_is_stable(records in records()) {
            let columns = vec!["x".to_string(), "y".to_string(), "z".to_string()];
            let ds = Dataset::from_records(columns, records);
            let rows = evaluate(&ds, &FilterSet::default(), "", &SortSpec::by("x", SortDirection::Ascending));
            for pair in rows.windows(2) {
                let ord = compare_values(ds.cell(pair[0], 0), ds.cell(pair[1], 0));
                prop_assert!(ord != Ordering::Greater);
                if ord == Ordering::Equal {
                    prop_assert!(pair[0] < pair[1]);
                }
            }
        }
    }
}
