use std::collections::HashMap;
use tracing::trace;

use crate::store::Dataset;

/// Key of the single entry emitted when there is nothing to group.
pub const NO_DATA_KEY: &str = "No data";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupCount {
    pub key: String,
    pub count: usize,
}

/// Count `rows` per distinct value of `column`, in order of first appearance.
///
/// Values are compared exactly, without case folding. The result is never
/// empty: no rows yields a single `"No data"` entry with count zero.
pub fn aggregate(dataset: &Dataset, rows: &[usize], column: usize) -> Vec<GroupCount> {
    trace!("Aggregate {} rows by column {}", rows.len(), column);
    if rows.is_empty() {
        return vec![GroupCount {
            key: NO_DATA_KEY.to_string(),
            count: 0,
        }];
    }

    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<GroupCount> = Vec::new();
    for &ridx in rows {
        let value = dataset.cell(ridx, column);
        match positions.get(value) {
            Some(&pos) => groups[pos].count += 1,
            None => {
                positions.insert(value, groups.len());
                groups.push(GroupCount {
                    key: value.to_string(),
                    count: 1,
                });
            }
        }
    }
    groups
}
