use polars::prelude::*;
use rayon::prelude::*;
use std::io::Cursor;
use tracing::{debug, trace};

use crate::domain::TVError;

pub struct Column {
    idx: usize,
    name: String,
    max_width: usize,
    data: Vec<String>,
}

impl Column {
    pub fn as_string(&self) -> String {
        format!(
            "{} \"{}\", width_max: {}, # rows {}",
            self.idx,
            self.name,
            self.max_width,
            self.data.len(),
        )
    }
}

/// All rows of one load, stored column by column.
///
/// Length and column set never change after [`Dataset::load`]. The only
/// mutation is [`Dataset::set_cell`].
#[derive(Default)]
pub struct Dataset {
    columns: Vec<String>,
    data: Vec<Column>,
    nrows: usize,
}

/// Borrowed view on one record, yielding `(column, value)` in column order.
#[derive(Clone, Copy)]
pub struct Row<'a> {
    dataset: &'a Dataset,
    idx: usize,
}

impl<'a> Row<'a> {
    pub fn values(&self) -> impl Iterator<Item = &'a str> + 'a {
        let idx = self.idx;
        self.dataset.data.iter().map(move |c| c.data[idx].as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        let idx = self.idx;
        self.dataset
            .data
            .iter()
            .map(move |c| (c.name.as_str(), c.data[idx].as_str()))
    }
}

impl Dataset {
    /// Parse header-row CSV text. Any parse failure rejects the whole input.
    pub fn load(raw: &str) -> Result<Self, TVError> {
        // Every column is read as text so cell values keep their exact spelling.
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .into_reader_with_file_handle(Cursor::new(raw.as_bytes().to_vec()))
            .finish()?;

        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        if names.is_empty() {
            return Err(TVError::ParseFailed("No columns found".into()));
        }

        // Each column is converted in its own task.
        let columns: Result<Vec<Column>, PolarsError> = names
            .par_iter()
            .enumerate()
            .map(|(idx, name)| Self::load_column(&df, idx, name))
            .collect();
        let columns = columns?;

        for c in columns.iter() {
            debug!("Column: {}", c.as_string());
        }

        Ok(Self {
            nrows: df.height(),
            columns: names,
            data: columns,
        })
    }

    fn load_column(df: &DataFrame, idx: usize, col_name: &str) -> Result<Column, PolarsError> {
        let col = df.column(col_name)?.cast(&DataType::String)?;
        let series = col.str()?;
        let mut data = Vec::with_capacity(series.len());

        let mut max_width = col_name.chars().count();
        for value in series.into_iter() {
            // Short rows leave nulls behind; those read as empty cells.
            let cell = value.unwrap_or_default().to_string();
            max_width = max_width.max(cell.chars().count());
            data.push(cell);
        }

        Ok(Column {
            idx,
            name: col_name.to_string(),
            max_width,
            data,
        })
    }

    /// Short rows are padded with empty cells.
    #[cfg(test)]
    pub fn from_records(columns: Vec<String>, records: Vec<Vec<String>>) -> Self {
        let nrows = records.len();
        let mut data: Vec<Column> = columns
            .iter()
            .enumerate()
            .map(|(idx, name)| Column {
                idx,
                name: name.clone(),
                max_width: name.chars().count(),
                data: Vec::with_capacity(nrows),
            })
            .collect();
        for mut record in records {
            record.resize(columns.len(), String::new());
            for (column, cell) in data.iter_mut().zip(record) {
                column.max_width = column.max_width.max(cell.chars().count());
                column.data.push(cell);
            }
        }
        Self {
            columns,
            data,
            nrows,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.nrows
    }

    pub fn is_empty(&self) -> bool {
        self.nrows == 0
    }

    pub fn cell(&self, row: usize, column: usize) -> &str {
        &self.data[column].data[row]
    }

    /// Value of `column` in `row`, or `""` when the dataset has no such column.
    #[cfg(test)]
    pub fn value(&self, row: usize, column: &str) -> &str {
        self.column_index(column)
            .map(|cidx| self.data[cidx].data[row].as_str())
            .unwrap_or("")
    }

    pub fn row(&self, idx: usize) -> Row<'_> {
        assert!(idx < self.nrows, "row {idx} out of range 0..{}", self.nrows);
        Row { dataset: self, idx }
    }

    pub fn max_width(&self, column: usize) -> usize {
        self.data.get(column).map(|c| c.max_width).unwrap_or(0)
    }

    /// Overwrite one cell in place.
    ///
    /// Indices come from the store's own bounds; anything outside them is a bug and panics.
    pub fn set_cell(&mut self, row: usize, column: usize, value: String) {
        assert!(row < self.nrows, "row {row} out of range 0..{}", self.nrows);
        let col = &mut self.data[column];
        trace!("Set cell {}:{} \"{}\" -> \"{}\"", row, col.name, col.data[row], value);
        col.max_width = col.max_width.max(value.chars().count());
        col.data[row] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_keeps_header_order_and_raw_text() {
        let ds = Dataset::load("id,name,score\n01,Alice,1.50\n2,Bob,3\n").unwrap();
        assert_eq!(ds.columns(), &["id", "name", "score"]);
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.cell(0, 0), "01");
        assert_eq!(ds.value(0, "score"), "1.50");
        assert_eq!(ds.value(1, "name"), "Bob");
    }

    #[test]
    fn load_header_only_gives_empty_dataset() {
        let ds = Dataset::load("id,entity_type\n").unwrap();
        assert!(ds.is_empty());
        assert_eq!(ds.columns().len(), 2);
    }

    #[test]
    fn load_empty_text_fails() {
        assert!(Dataset::load("").is_err());
    }

    #[test]
    fn load_rejects_rows_with_extra_fields() {
        let result = Dataset::load("a,b\n1,2\n3,4,5,6\n");
        let err = result.err().expect("ragged input must not load");
        assert!(!err.is_fetch());
    }

    #[test]
    fn quoted_fields_survive() {
        let ds = Dataset::load("name,comment\n\"Smith, Jane\",\"said \"\"hi\"\"\"\n").unwrap();
        assert_eq!(ds.cell(0, 0), "Smith, Jane");
        assert_eq!(ds.cell(0, 1), "said \"hi\"");
    }

    #[test]
    fn unknown_column_reads_as_empty() {
        let ds = Dataset::from_records(vec!["a".into()], vec![vec!["x".into()]]);
        assert_eq!(ds.value(0, "missing"), "");
    }

    #[test]
    fn row_iterates_in_column_order() {
        let ds = Dataset::from_records(
            vec!["id".into(), "kind".into()],
            vec![vec!["7".into(), "person".into()]],
        );
        let pairs: Vec<(&str, &str)> = ds.row(0).iter().collect();
        assert_eq!(pairs, vec![("id", "7"), ("kind", "person")]);
        assert_eq!(ds.row(0).values().collect::<Vec<_>>(), vec!["7", "person"]);
    }

    #[test]
    fn set_cell_is_visible_immediately() {
        let mut ds = Dataset::from_records(
            vec!["id".into(), "kind".into()],
            vec![vec!["1".into(), "person".into()]],
        );
        ds.set_cell(0, 1, "a much longer value".into());
        assert_eq!(ds.value(0, "kind"), "a much longer value");
        assert_eq!(ds.max_width(1), "a much longer value".len());
    }

    #[test]
    #[should_panic]
    fn set_cell_out_of_range_panics() {
        let mut ds = Dataset::from_records(vec!["id".into()], vec![vec!["1".into()]]);
        ds.set_cell(1, 0, "2".into());
    }
}
