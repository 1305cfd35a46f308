use std::fmt;
use std::io::Error;

use clap::ValueEnum;
use derive_setters::Setters;
use polars::error::PolarsError;

pub const HELP_TEXT: &str = "\
Navigation
  h j k l / arrows   move the cursor
  n / PgDn           next page
  p / PgUp           previous page
  Home / End         first / last page

Query
  /                  search all columns
  f                  filter current column (empty clears)
  x                  clear filters and search
  s                  sort current column (again to flip)
  a                  chart rows grouped by current column

Editing
  e / Enter          edit current cell
  y / Y              copy cell / row

Columns (pivot view)
  + / -              widen / narrow column
  H / L              move column left / right
  c / C              hide column / show all
  mouse              drag header separator to resize, click header to sort

General
  t                  switch between table and pivot view
  ?                  this help
  Esc                close popup, chart or prompt
  q                  quit";

#[derive(Debug, Clone, Setters)]
#[setters(prefix = "with_")]
pub struct TVConfig {
    pub event_poll_time: u64,
    pub table_page_size: usize,
    pub pivot_page_size: usize,
    pub max_column_width: u16,
}

impl Default for TVConfig {
    fn default() -> Self {
        Self {
            event_poll_time: 100,
            table_page_size: 10,
            pivot_page_size: 15,
            max_column_width: 40,
        }
    }
}

/// The two views a session can be opened in. Each one loads the dataset on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Route {
    #[default]
    Table,
    Pivot,
}

impl Route {
    pub fn other(self) -> Self {
        match self {
            Route::Table => Route::Pivot,
            Route::Pivot => Route::Table,
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            Route::Table => "/",
            Route::Pivot => "/pivot_table",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CMDMode {
    SearchTable,
    FilterByColumn,
    EditCell,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Quit,
    Exit,
    Enter,
    Help,
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    NextPage,
    PreviousPage,
    FirstPage,
    LastPage,
    Search,
    Filter,
    ClearFilters,
    Sort,
    Histogram,
    EditCell,
    CopyCell,
    CopyRow,
    WidenColumn,
    NarrowColumn,
    MoveColumnLeft,
    MoveColumnRight,
    HideColumn,
    ShowAllColumns,
    SwitchRoute,
    Resize(usize, usize),
    MouseDown(u16, u16),
    MouseDrag(u16, u16),
    MouseUp(u16, u16),
    RawKey(ratatui::crossterm::event::KeyEvent),
}

#[derive(Debug)]
pub enum TVError {
    IoError(Error),
    PolarsError(PolarsError),
    LoadingFailed(String),
    ParseFailed(String),
    StorageFailed(String),
    FileNotFound,
    PermissionDenied,
}

impl TVError {
    /// True for errors raised while reaching the source, false for errors in its content.
    pub fn is_fetch(&self) -> bool {
        matches!(
            self,
            TVError::IoError(_)
                | TVError::LoadingFailed(_)
                | TVError::FileNotFound
                | TVError::PermissionDenied
        )
    }
}

impl fmt::Display for TVError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TVError::IoError(e) => write!(f, "IO error: {e}"),
            TVError::PolarsError(e) => write!(f, "CSV parse error: {e}"),
            TVError::LoadingFailed(msg) => write!(f, "Loading failed: {msg}"),
            TVError::ParseFailed(msg) => write!(f, "CSV parse error: {msg}"),
            TVError::StorageFailed(msg) => write!(f, "Storage error: {msg}"),
            TVError::FileNotFound => write!(f, "File not found"),
            TVError::PermissionDenied => write!(f, "Permission denied"),
        }
    }
}

impl std::error::Error for TVError {}

impl From<Error> for TVError {
    fn from(err: Error) -> Self {
        TVError::IoError(err)
    }
}

impl From<PolarsError> for TVError {
    fn from(err: PolarsError) -> Self {
        TVError::PolarsError(err)
    }
}

impl From<serde_json::Error> for TVError {
    fn from(err: serde_json::Error) -> Self {
        TVError::StorageFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_and_parse_errors_are_told_apart() {
        assert!(TVError::FileNotFound.is_fetch());
        assert!(TVError::LoadingFailed("Not a file!".into()).is_fetch());
        assert!(!TVError::ParseFailed("bad quote".into()).is_fetch());
    }

    #[test]
    fn routes_toggle() {
        assert_eq!(Route::Table.other(), Route::Pivot);
        assert_eq!(Route::Pivot.other().path(), "/");
    }

    #[test]
    fn config_setters_chain() {
        let cfg = TVConfig::default().with_table_page_size(25).with_event_poll_time(50);
        assert_eq!(cfg.table_page_size, 25);
        assert_eq!(cfg.event_poll_time, 50);
        assert_eq!(cfg.pivot_page_size, 15);
    }
}
