//! Persisted column layout: order, visibility and width.
//!
//! Widths are keyed by column position, not by name. A layout saved for one
//! file is applied positionally to whatever file is opened next, and entries
//! for columns that do not exist are carried along untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::storage::KeyValueStore;

pub const COLUMN_STATE_KEY: &str = "columnState";
pub const COLUMN_WIDTHS_KEY: &str = "columnWidths";

pub const DEFAULT_COLUMN_WIDTH: u16 = 16;
pub const MIN_COLUMN_WIDTH: u16 = 3;
pub const MAX_COLUMN_WIDTH: u16 = 200;

/// One entry of the persisted column state array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnState {
    pub col_id: String,
    #[serde(default)]
    pub hide: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnLayout {
    /// Width per column position
    pub widths: BTreeMap<usize, u16>,
    /// Column keys in display order, with their visibility
    pub columns: Vec<ColumnState>,
}

impl ColumnLayout {
    pub fn width(&self, column: usize) -> u16 {
        self.widths
            .get(&column)
            .copied()
            .unwrap_or(DEFAULT_COLUMN_WIDTH)
    }

    pub fn set_width(&mut self, column: usize, width: u16) {
        self.widths
            .insert(column, width.clamp(MIN_COLUMN_WIDTH, MAX_COLUMN_WIDTH));
    }

    pub fn order(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.col_id.as_str()).collect()
    }

    pub fn is_hidden(&self, key: &str) -> bool {
        self.columns.iter().any(|c| c.col_id == key && c.hide)
    }

    /// Dataset column indices in display order.
    ///
    /// Saved keys come first in their saved order, columns the layout has never
    /// seen follow in dataset order. Keys without a matching column are skipped.
    pub fn resolve_order(&self, columns: &[String]) -> Vec<usize> {
        let mut order: Vec<usize> = self
            .columns
            .iter()
            .filter_map(|state| columns.iter().position(|c| *c == state.col_id))
            .collect();
        for idx in 0..columns.len() {
            if !order.contains(&idx) {
                order.push(idx);
            }
        }
        order
    }

    /// Same as [`resolve_order`](Self::resolve_order) without hidden columns.
    pub fn visible_order(&self, columns: &[String]) -> Vec<usize> {
        self.resolve_order(columns)
            .into_iter()
            .filter(|&idx| !self.is_hidden(&columns[idx]))
            .collect()
    }

    /// Make sure every dataset column has an entry, appending unseen ones at the end.
    fn adopt(&mut self, columns: &[String]) {
        for column in columns {
            if !self.columns.iter().any(|c| c.col_id == *column) {
                self.columns.push(ColumnState {
                    col_id: column.clone(),
                    hide: false,
                });
            }
        }
    }

    /// Shift `key` by `delta` places among the dataset's columns.
    ///
    /// Stale entries keep their slots; only the relative order of live columns changes.
    pub fn move_column(&mut self, columns: &[String], key: &str, delta: isize) -> bool {
        self.adopt(columns);
        let live: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| columns.contains(&c.col_id))
            .map(|(pos, _)| pos)
            .collect();
        let Some(from) = live.iter().position(|&pos| self.columns[pos].col_id == key) else {
            return false;
        };
        let to = from as isize + delta;
        if to < 0 || to as usize >= live.len() {
            return false;
        }
        self.columns.swap(live[from], live[to as usize]);
        true
    }

    pub fn toggle_hidden(&mut self, columns: &[String], key: &str) {
        self.adopt(columns);
        if let Some(state) = self.columns.iter_mut().find(|c| c.col_id == key) {
            state.hide = !state.hide;
        }
    }

    pub fn show_all(&mut self) {
        for state in self.columns.iter_mut() {
            state.hide = false;
        }
    }
}

/// Keep every entry with an index key and a numeric width, rounded and clamped.
fn decode_widths(raw: BTreeMap<String, Value>) -> BTreeMap<usize, u16> {
    raw.into_iter()
        .filter_map(|(key, value)| {
            let column = key.parse::<usize>().ok();
            let width = value.as_f64().filter(|w| w.is_finite());
            match (column, width) {
                (Some(column), Some(width)) => {
                    let width = width
                        .round()
                        .clamp(f64::from(MIN_COLUMN_WIDTH), f64::from(MAX_COLUMN_WIDTH));
                    Some((column, width as u16))
                }
                _ => {
                    warn!("Skipping stored width {key:?}: {value}");
                    None
                }
            }
        })
        .collect()
}

/// Loads and saves a [`ColumnLayout`] through a key-value store.
pub struct ViewStateStore<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> ViewStateStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Read the saved layout. Missing or unreadable entries fall back to defaults.
    pub fn load(&self) -> ColumnLayout {
        let columns = self
            .store
            .get_json::<Vec<ColumnState>>(COLUMN_STATE_KEY)
            .unwrap_or_else(|e| {
                warn!("Discarding stored {COLUMN_STATE_KEY}: {e}");
                None
            })
            .unwrap_or_default();
        let widths = self
            .store
            .get_json::<BTreeMap<String, Value>>(COLUMN_WIDTHS_KEY)
            .unwrap_or_else(|e| {
                warn!("Discarding stored {COLUMN_WIDTHS_KEY}: {e}");
                None
            })
            .map(decode_widths)
            .unwrap_or_default();
        let layout = ColumnLayout { widths, columns };
        debug!(
            "Loaded layout: order {:?}, {} widths",
            layout.order(),
            layout.widths.len()
        );
        layout
    }

    /// Write the layout. Failures are logged and otherwise ignored.
    pub fn save(&self, layout: &ColumnLayout) {
        if let Err(e) = self.store.set_json(COLUMN_STATE_KEY, &layout.columns) {
            warn!("Could not save {COLUMN_STATE_KEY}: {e}");
        }
        if let Err(e) = self.store.set_json(COLUMN_WIDTHS_KEY, &layout.widths) {
            warn!("Could not save {COLUMN_WIDTHS_KEY}: {e}");
        }
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use proptest::prelude::*;

    fn names(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn empty_storage_gives_default_layout() {
        let store = ViewStateStore::new(MemoryStore::new());
        let layout = store.load();
        assert_eq!(layout, ColumnLayout::default());
        assert_eq!(layout.width(4), DEFAULT_COLUMN_WIDTH);
    }

    #[test]
    fn corrupt_entries_fall_back_silently() {
        let kv = MemoryStore::new();
        kv.set(COLUMN_STATE_KEY, "not json").unwrap();
        kv.set(COLUMN_WIDTHS_KEY, "{\"0\": \"wide\"}").unwrap();
        let layout = ViewStateStore::new(kv).load();
        assert_eq!(layout, ColumnLayout::default());
    }

    #[test]
    fn bad_width_entries_are_skipped_one_by_one() {
        let kv = MemoryStore::new();
        kv.set(
            COLUMN_WIDTHS_KEY,
            r#"{"0": 150.5, "1": 1000, "2": -4, "3": "wide", "x": 20, "4": 30, "5": null}"#,
        )
        .unwrap();
        let layout = ViewStateStore::new(kv).load();
        assert_eq!(
            layout.widths,
            BTreeMap::from([(0, 151), (1, MAX_COLUMN_WIDTH), (2, MIN_COLUMN_WIDTH), (4, 30)])
        );
        assert_eq!(layout.width(3), DEFAULT_COLUMN_WIDTH);
    }

    #[test]
    fn persisted_format_uses_string_index_keys() {
        let store = ViewStateStore::new(MemoryStore::new());
        let mut layout = ColumnLayout::default();
        layout.set_width(2, 30);
        layout.toggle_hidden(&names(&["a"]), "a");
        store.save(&layout);

        assert_eq!(
            store.store().get(COLUMN_WIDTHS_KEY).as_deref(),
            Some("{\"2\":30}")
        );
        assert_eq!(
            store.store().get(COLUMN_STATE_KEY).as_deref(),
            Some("[{\"colId\":\"a\",\"hide\":true}]")
        );
    }

    #[test]
    fn widths_are_clamped() {
        let mut layout = ColumnLayout::default();
        layout.set_width(0, 0);
        layout.set_width(1, u16::MAX);
        assert_eq!(layout.width(0), MIN_COLUMN_WIDTH);
        assert_eq!(layout.width(1), MAX_COLUMN_WIDTH);
    }

    #[test]
    fn stale_keys_are_ignored_not_purged() {
        let layout = ColumnLayout {
            widths: BTreeMap::new(),
            columns: vec![
                ColumnState { col_id: "gone".into(), hide: false },
                ColumnState { col_id: "b".into(), hide: false },
            ],
        };
        let columns = names(&["a", "b", "c"]);
        assert_eq!(layout.resolve_order(&columns), vec![1, 0, 2]);

        let mut layout = layout;
        assert!(layout.move_column(&columns, "a", -1));
        assert_eq!(layout.order(), vec!["gone", "a", "b", "c"]);
        assert_eq!(layout.resolve_order(&columns), vec![0, 1, 2]);
    }

    #[test]
    fn move_column_stops_at_edges() {
        let columns = names(&["a", "b"]);
        let mut layout = ColumnLayout::default();
        assert!(!layout.move_column(&columns, "a", -1));
        assert!(layout.move_column(&columns, "a", 1));
        assert_eq!(layout.resolve_order(&columns), vec![1, 0]);
        assert!(!layout.move_column(&columns, "a", 1));
    }

    #[test]
    fn hidden_columns_drop_out_of_visible_order() {
        let columns = names(&["a", "b", "c"]);
        let mut layout = ColumnLayout::default();
        layout.toggle_hidden(&columns, "b");
        assert_eq!(layout.visible_order(&columns), vec![0, 2]);
        layout.show_all();
        assert_eq!(layout.visible_order(&columns), vec![0, 1, 2]);
    }

    fn layouts() -> impl Strategy<Value = ColumnLayout> {
        (
            prop::collection::btree_map(0usize..50, MIN_COLUMN_WIDTH..MAX_COLUMN_WIDTH, 0..10),
            prop::collection::vec(("[a-z_]{1,8}", any::<bool>()), 0..10),
        )
            .prop_map(|(widths, cols)| ColumnLayout {
                widths,
                columns: cols
                    .into_iter()
                    .map(|(col_id, hide)| ColumnState { col_id, hide })
                    .collect(),
            })
    }

    proptest! {
        #[test]
        fn prop_layout_round_trips(layout in layouts()) {
            let store = ViewStateStore::new(MemoryStore::new());
            store.save(&layout);
            prop_assert_eq!(store.load(), layout);
        }
    }
}
