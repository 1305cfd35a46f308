use arboard::Clipboard;
use ratatui::crossterm::event::KeyEvent;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::aggregate::{GroupCount, aggregate};
use crate::domain::{CMDMode, HELP_TEXT, Message, Route, TVConfig, TVError};
use crate::gesture::{PointerCapture, ResizeGesture};
use crate::inputter::{InputResult, Inputter};
use crate::layout::{ColumnLayout, ViewStateStore};
use crate::paginate::{Page, PageState, paginate};
use crate::pipeline::{FilterSet, SortDirection, SortSpec, evaluate, select, sort_rows};
use crate::storage::KeyValueStore;
use crate::store::Dataset;
use crate::ui::{COLUMN_SPACER, COLUMN_WIDTH_MARGIN, TABLE_HEADER_HEIGHT};

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Status {
    READY,
    LOADING,
    FAILED,
    QUITTING,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Modus {
    TABLE,
    POPUP,
    CMDINPUT,
    HISTOGRAM,
}

/// Everything the user can change about the query. Lives for one session only.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState {
    pub filters: FilterSet,
    pub search: String,
    pub sort: SortSpec,
    pub page: PageState,
    pub group_column: Option<String>,
}

impl QueryState {
    pub fn new(page_size: usize) -> Self {
        Self {
            filters: FilterSet::default(),
            search: String::new(),
            sort: SortSpec::default(),
            page: PageState::new(page_size),
            group_column: None,
        }
    }
}

/// Output of one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct DerivedView {
    /// Filtered and sorted dataset row indices
    pub ordered: Arc<Vec<usize>>,
    pub filtered_count: usize,
    pub page: Page,
    /// Group counts over the filtered rows, when a group column is set
    pub chart: Option<Vec<GroupCount>>,
}

/// Run filter, search, aggregation, sort and pagination for `query`.
///
/// The chart is built from the filtered rows before they are sorted, so its
/// group order is the dataset's first-appearance order.
pub fn recompute(dataset: &Dataset, query: &QueryState) -> DerivedView {
    let start_time = Instant::now();
    let group_column = query
        .group_column
        .as_deref()
        .and_then(|name| dataset.column_index(name));
    let (ordered, chart) = match group_column {
        Some(cidx) => {
            let filtered = select(dataset, &query.filters, &query.search);
            let chart = aggregate(dataset, &filtered, cidx);
            (sort_rows(dataset, filtered, &query.sort), Some(chart))
        }
        None => (
            evaluate(dataset, &query.filters, &query.search, &query.sort),
            None,
        ),
    };
    let filtered_count = ordered.len();
    let page = paginate(&ordered, &query.page);
    trace!(
        "Recompute: {}/{} rows, page {}/{}, took {}ms",
        filtered_count,
        dataset.len(),
        query.page.page_index + 1,
        page.total_pages,
        start_time.elapsed().as_millis()
    );
    DerivedView {
        ordered: Arc::new(ordered),
        filtered_count,
        page,
        chart,
    }
}

#[derive(Clone, Debug, Default)]
pub struct ColumnView {
    pub name: String,
    pub width: usize,
    pub data: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct ChartView {
    pub column: String,
    pub groups: Vec<GroupCount>,
    pub offset: usize,
}

#[derive(Default, Clone, Debug)]
pub struct UILayout {
    pub width: usize,
    pub height: usize,
    pub table_width: usize,
}

impl UILayout {
    pub fn from_values(ui_width: usize, ui_height: usize) -> Self {
        let layout = UILayout {
            width: ui_width,
            height: ui_height,
            table_width: ui_width,
        };
        trace!("Build UILayout: {:?}", layout);
        layout
    }
}

pub struct UIData {
    pub name: String,
    pub route: Route,
    pub status: Status,
    pub table: Vec<ColumnView>,
    pub nrows: usize, // Rows left after filter and search
    pub query_summary: String,
    pub total_rows: usize,
    pub page_index: usize,
    pub total_pages: usize,
    pub selected_row: usize,
    pub selected_column: usize,
    pub chart: Option<ChartView>,
    pub show_popup: bool,
    pub popup_message: String,
    pub last_update: Instant,
    pub cmdinput: InputResult,
    pub cmd_mode: Option<CMDMode>,
    pub active_cmdinput: bool,
    pub status_message: String,
}

impl UIData {
    pub fn empty() -> Self {
        UIData {
            name: String::new(),
            route: Route::Table,
            status: Status::LOADING,
            table: Vec::new(),
            nrows: 0,
            query_summary: String::new(),
            total_rows: 0,
            page_index: 0,
            total_pages: 1,
            selected_row: 0,
            selected_column: 0,
            chart: None,
            show_popup: false,
            popup_message: String::new(),
            last_update: Instant::now(),
            cmdinput: InputResult::default(),
            cmd_mode: None,
            active_cmdinput: false,
            status_message: String::new(),
        }
    }
}

pub struct Model {
    config: TVConfig,
    source: String,
    route: Route,
    pub status: Status,
    modus: Modus,
    previous_modus: Modus,
    dataset: Dataset,
    query: QueryState,
    view: DerivedView,
    layout: ColumnLayout,
    view_state: ViewStateStore<Box<dyn KeyValueStore>>,
    capture: PointerCapture,
    resize: Option<(ResizeGesture, Option<u16>)>,
    curser_row: usize,    // Row within the current page
    curser_column: usize, // Position in the display order
    offset_column: usize,
    chart_offset: usize,
    uilayout: UILayout,
    uidata: UIData,
    clipboard: Option<Clipboard>,
    input: Inputter,
    cmd_mode: Option<CMDMode>,
    last_input: InputResult,
    active_cmdinput: bool,
    status_message: String,
}

impl Model {
    pub fn init(
        config: &TVConfig,
        route: Route,
        source: String,
        store: Box<dyn KeyValueStore>,
        ui_width: usize,
        ui_height: usize,
    ) -> Self {
        let view_state = ViewStateStore::new(store);
        let layout = view_state.load();
        let page_size = Self::page_size_for(config, route);
        let mut model = Self {
            config: config.clone(),
            source,
            route,
            status: Status::LOADING,
            modus: Modus::TABLE,
            previous_modus: Modus::TABLE,
            dataset: Dataset::default(),
            query: QueryState::new(page_size),
            view: DerivedView::default(),
            layout,
            view_state,
            capture: PointerCapture::default(),
            resize: None,
            curser_row: 0,
            curser_column: 0,
            offset_column: 0,
            chart_offset: 0,
            uilayout: UILayout::from_values(ui_width, ui_height),
            uidata: UIData::empty(),
            clipboard: None,
            input: Inputter::default(),
            cmd_mode: None,
            last_input: InputResult::default(),
            active_cmdinput: false,
            status_message: String::new(),
        };
        model.set_status_message("Loading ...");
        model.refresh();
        model
    }

    fn page_size_for(config: &TVConfig, route: Route) -> usize {
        match route {
            Route::Table => config.table_page_size,
            Route::Pivot => config.pivot_page_size,
        }
    }

    /// Hand the result of a background load to the model.
    pub fn finish_loading(&mut self, result: Result<Dataset, TVError>) {
        self.abort_resize();
        match result {
            Ok(dataset) => {
                info!(
                    "Dataset ready: {} rows, {} columns",
                    dataset.len(),
                    dataset.columns().len()
                );
                self.dataset = dataset;
                self.status = Status::READY;
                if self.dataset.is_empty() {
                    self.set_status_message(format!("No rows in {}", self.source));
                } else {
                    self.set_status_message(format!("Loaded {} rows", self.dataset.len()));
                }
            }
            Err(e) => {
                warn!("Load failed: {e}");
                self.dataset = Dataset::default();
                self.status = Status::FAILED;
                let stage = if e.is_fetch() { "fetch" } else { "parse" };
                self.set_status_message(format!("Error ({stage}): {e}"));
            }
        }
        self.query = QueryState::new(Self::page_size_for(&self.config, self.route));
        self.curser_row = 0;
        self.curser_column = 0;
        self.offset_column = 0;
        self.modus = Modus::TABLE;
        self.refresh();
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn get_uidata(&self) -> &UIData {
        &self.uidata
    }

    pub fn raw_keyevents(&self) -> bool {
        self.active_cmdinput
    }

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        self.uidata.status_message = self.status_message.clone();
        self.uidata.last_update = Instant::now();
    }

    // -------------------- Derived state ---------------------- //

    /// Re-run the pipeline, pull the page index back into range and rebuild the UI snapshot.
    fn refresh(&mut self) {
        let mut view = recompute(&self.dataset, &self.query);
        if self.query.page.page_index >= view.page.total_pages {
            self.query.page.clamp(view.page.total_pages);
            view.page = paginate(&view.ordered, &self.query.page);
        }
        self.view = view;
        self.curser_row = self
            .curser_row
            .min(self.view.page.rows.len().saturating_sub(1));
        let ncols = self.display_order().len();
        self.curser_column = self.curser_column.min(ncols.saturating_sub(1));
        self.offset_column = self.offset_column.min(self.curser_column);
        self.update_table_data();
    }

    /// Dataset column indices in the order the current route shows them.
    fn display_order(&self) -> Vec<usize> {
        match self.route {
            Route::Pivot => self.layout.visible_order(self.dataset.columns()),
            Route::Table => (0..self.dataset.columns().len()).collect(),
        }
    }

    fn column_width(&self, column: usize) -> usize {
        match self.route {
            Route::Pivot => self.layout.width(column) as usize,
            Route::Table => {
                let width = self.dataset.max_width(column) + COLUMN_WIDTH_MARGIN;
                std::cmp::min(width, self.config.max_column_width as usize)
            }
        }
    }

    /// `(dataset column, render width, start x)` of every column that fits on screen.
    fn visible_columns(&self) -> Vec<(usize, usize, usize)> {
        let mut visible = Vec::new();
        let mut x = 0;
        for &cidx in self.display_order().iter().skip(self.offset_column) {
            if x >= self.uilayout.table_width {
                break;
            }
            // The last column may only be partially visible
            let width = std::cmp::min(self.column_width(cidx), self.uilayout.table_width - x);
            visible.push((cidx, width, x));
            x += width + COLUMN_SPACER;
        }
        visible
    }

    fn ensure_column_visible(&mut self) {
        if self.curser_column < self.offset_column {
            self.offset_column = self.curser_column;
        }
        while self.offset_column < self.curser_column {
            let fully_visible = self
                .visible_columns()
                .iter()
                .filter(|(cidx, width, _)| *width == self.column_width(*cidx))
                .count()
                .max(1);
            if self.curser_column < self.offset_column + fully_visible {
                break;
            }
            self.offset_column += 1;
        }
    }

    fn current_column(&self) -> Option<usize> {
        self.display_order().get(self.curser_column).copied()
    }

    fn current_row(&self) -> Option<usize> {
        self.view.page.rows.get(self.curser_row).copied()
    }

    fn get_visible_name(name: &str, width: usize) -> String {
        if width < 3 {
            return String::new();
        }
        if name.chars().count() > width {
            let mut reduced: String = name.chars().take(width - 3).collect();
            reduced.push_str("...");
            reduced
        } else {
            name.to_string()
        }
    }

    fn header_name(&self, column: usize) -> String {
        let name = &self.dataset.columns()[column];
        let mut header = name.clone();
        if self.query.filters.get(name).is_some() {
            header.insert(0, '*');
        }
        if self.query.sort.is_active(name) {
            header.push_str(match self.query.sort.direction {
                SortDirection::Ascending => " ▲",
                SortDirection::Descending => " ▼",
            });
        }
        header
    }

    /// Active filters and search as `column~pattern /search`.
    fn query_summary(&self) -> String {
        if self.query.filters.is_empty() && self.query.search.is_empty() {
            return String::new();
        }
        let mut parts: Vec<String> = self
            .query
            .filters
            .iter()
            .map(|(column, pattern)| format!("{column}~{pattern}"))
            .collect();
        if !self.query.search.is_empty() {
            parts.push(format!("/{}", self.query.search));
        }
        parts.join(" ")
    }

    fn update_table_data(&mut self) {
        let table = self
            .visible_columns()
            .into_iter()
            .map(|(cidx, width, _)| ColumnView {
                name: Self::get_visible_name(&self.header_name(cidx), width),
                width,
                data: self
                    .view
                    .page
                    .rows
                    .iter()
                    .map(|&ridx| {
                        self.dataset
                            .cell(ridx, cidx)
                            .replace("\r\n", " ↵ ")
                            .replace('\n', " ↵ ")
                    })
                    .collect(),
            })
            .collect();

        let chart = match (&self.view.chart, &self.query.group_column) {
            (Some(groups), Some(column)) => Some(ChartView {
                column: column.clone(),
                groups: groups.clone(),
                offset: self.chart_offset,
            }),
            _ => None,
        };

        self.uidata = UIData {
            name: format!("{} {}", self.source, self.route.path()),
            route: self.route,
            status: self.status,
            table,
            nrows: self.view.filtered_count,
            query_summary: self.query_summary(),
            total_rows: self.dataset.len(),
            page_index: self.query.page.page_index,
            total_pages: self.view.page.total_pages,
            selected_row: self.curser_row,
            selected_column: self.curser_column.saturating_sub(self.offset_column),
            chart,
            show_popup: self.modus == Modus::POPUP,
            popup_message: self.uidata.popup_message.clone(),
            last_update: Instant::now(),
            cmdinput: self.last_input.clone(),
            cmd_mode: self.cmd_mode,
            active_cmdinput: self.active_cmdinput,
            status_message: self.status_message.clone(),
        };
    }

    fn ui_resize(&mut self, width: usize, height: usize) {
        trace!(
            "UI was resized! w:{}->{}, h:{}->{}",
            self.uilayout.width, width, self.uilayout.height, height
        );
        self.abort_resize();
        self.uilayout = UILayout::from_values(width, height);
        self.ensure_column_visible();
        self.update_table_data();
    }

    // -------------------- Message dispatch ---------------------- //

    pub fn update(&mut self, message: Option<Message>) -> Result<(), TVError> {
        let Some(msg) = message else {
            return Ok(());
        };

        match self.status {
            Status::LOADING => {
                match msg {
                    Message::Quit => self.quit(),
                    Message::Resize(width, height) => self.ui_resize(width, height),
                    m => trace!("Ignoring {m:?} while loading"),
                }
                return Ok(());
            }
            // Without a dataset only help and a route switch are left.
            Status::FAILED => {
                match (self.modus, msg) {
                    (_, Message::Quit) => self.quit(),
                    (_, Message::Resize(width, height)) => self.ui_resize(width, height),
                    (Modus::POPUP, Message::Exit | Message::Help) => self.exit(),
                    (Modus::TABLE, Message::Help) => self.show_help(),
                    (Modus::TABLE, Message::SwitchRoute) => self.switch_route(),
                    (_, m) => trace!("Ignoring {m:?} after a failed load"),
                }
                return Ok(());
            }
            Status::READY | Status::QUITTING => (),
        }

        match self.modus {
            Modus::TABLE => match msg {
                Message::Quit => self.quit(),
                Message::Exit => self.abort_resize(),
                Message::Help => self.show_help(),
                Message::MoveUp => self.move_selection_up(),
                Message::MoveDown => self.move_selection_down(),
                Message::MoveLeft => self.move_selection_left(),
                Message::MoveRight => self.move_selection_right(),
                Message::NextPage => self.next_page(),
                Message::PreviousPage => self.previous_page(),
                Message::FirstPage => {
                    self.query.page.first();
                    self.refresh();
                }
                Message::LastPage => {
                    self.query.page.last(self.view.page.total_pages);
                    self.refresh();
                }
                Message::Search => self.enter_cmd_mode(CMDMode::SearchTable),
                Message::Filter => self.enter_cmd_mode(CMDMode::FilterByColumn),
                Message::EditCell | Message::Enter => self.enter_cmd_mode(CMDMode::EditCell),
                Message::ClearFilters => self.clear_filters(),
                Message::Sort => {
                    if let Some(cidx) = self.current_column() {
                        self.sort_column(cidx);
                    }
                }
                Message::Histogram => self.build_histogram_view(),
                Message::CopyCell => self.copy_table_cell(),
                Message::CopyRow => self.copy_table_row(),
                Message::WidenColumn => self.step_column_width(true),
                Message::NarrowColumn => self.step_column_width(false),
                Message::MoveColumnLeft => self.move_current_column(-1),
                Message::MoveColumnRight => self.move_current_column(1),
                Message::HideColumn => self.hide_current_column(),
                Message::ShowAllColumns => self.show_all_columns(),
                Message::SwitchRoute => self.switch_route(),
                Message::Resize(width, height) => self.ui_resize(width, height),
                Message::MouseDown(x, y) => self.mouse_down(x, y),
                Message::MouseDrag(x, _) => self.mouse_drag(x),
                Message::MouseUp(x, _) => self.mouse_up(x),
                Message::RawKey(_) => (),
            },
            Modus::HISTOGRAM => match msg {
                Message::Quit => self.quit(),
                Message::MoveDown => self.scroll_histogram(1),
                Message::MoveUp => self.scroll_histogram(-1),
                Message::Resize(width, height) => self.ui_resize(width, height),
                Message::Help => self.show_help(),
                Message::Exit | Message::Histogram => self.exit(),
                _ => (),
            },
            Modus::POPUP => match msg {
                Message::Quit => self.quit(),
                Message::Resize(width, height) => self.ui_resize(width, height),
                Message::Exit | Message::Help => self.exit(),
                _ => (),
            },
            Modus::CMDINPUT => match msg {
                Message::RawKey(key) => self.raw_input(key),
                Message::Resize(width, height) => self.ui_resize(width, height),
                _ => (),
            },
        }
        Ok(())
    }

    // -------------------- Control handling functions ---------------------- //

    fn exit(&mut self) {
        match self.modus {
            Modus::TABLE => self.abort_resize(),
            Modus::POPUP => {
                trace!("Close popup ...");
                self.modus = self.previous_modus;
                self.previous_modus = Modus::POPUP;
                self.update_table_data();
            }
            Modus::HISTOGRAM => {
                self.previous_modus = Modus::HISTOGRAM;
                self.modus = Modus::TABLE;
                self.query.group_column = None;
                self.refresh();
            }
            Modus::CMDINPUT => {}
        }
    }

    fn show_help(&mut self) {
        self.abort_resize();
        self.previous_modus = self.modus;
        self.modus = Modus::POPUP;
        self.uidata.popup_message = HELP_TEXT.to_string();
        self.update_table_data();
    }

    fn switch_route(&mut self) {
        self.abort_resize();
        self.route = self.route.other();
        info!("Switching to {} ...", self.route.path());
        self.status = Status::LOADING;
        self.dataset = Dataset::default();
        self.query = QueryState::new(Self::page_size_for(&self.config, self.route));
        self.curser_row = 0;
        self.curser_column = 0;
        self.offset_column = 0;
        self.set_status_message("Loading ...");
        self.refresh();
    }

    fn next_page(&mut self) {
        self.query.page.next(self.view.page.total_pages);
        self.refresh();
    }

    fn previous_page(&mut self) {
        self.query.page.previous();
        self.refresh();
    }

    fn move_selection_up(&mut self) {
        if self.curser_row > 0 {
            self.curser_row -= 1;
            self.update_table_data();
        } else if self.query.page.can_go_prev() {
            self.query.page.previous();
            self.curser_row = self.query.page.page_size - 1;
            self.refresh();
        }
    }

    fn move_selection_down(&mut self) {
        if self.curser_row + 1 < self.view.page.rows.len() {
            self.curser_row += 1;
            self.update_table_data();
        } else if self.query.page.can_go_next(self.view.page.total_pages) {
            self.query.page.next(self.view.page.total_pages);
            self.curser_row = 0;
            self.refresh();
        }
    }

    fn move_selection_left(&mut self) {
        self.curser_column = self.curser_column.saturating_sub(1);
        self.ensure_column_visible();
        self.update_table_data();
    }

    fn move_selection_right(&mut self) {
        if self.curser_column + 1 < self.display_order().len() {
            self.curser_column += 1;
            self.ensure_column_visible();
            self.update_table_data();
        }
    }

    fn sort_column(&mut self, column: usize) {
        let name = self.dataset.columns()[column].clone();
        self.query.sort.toggle(&name);
        debug!("Sort by {:?}", self.query.sort);
        self.refresh();
    }

    fn clear_filters(&mut self) {
        self.query.filters.clear();
        self.query.search.clear();
        self.set_status_message("Cleared filters and search");
        self.refresh();
    }

    fn build_histogram_view(&mut self) {
        let Some(cidx) = self.current_column() else {
            return;
        };
        self.abort_resize();
        self.query.group_column = Some(self.dataset.columns()[cidx].clone());
        self.chart_offset = 0;
        self.previous_modus = self.modus;
        self.modus = Modus::HISTOGRAM;
        self.refresh();
    }

    fn scroll_histogram(&mut self, step: isize) {
        let ngroups = self.view.chart.as_ref().map(|g| g.len()).unwrap_or(0);
        self.chart_offset = self
            .chart_offset
            .saturating_add_signed(step)
            .min(ngroups.saturating_sub(1));
        self.update_table_data();
    }

    fn enter_cmd_mode(&mut self, mode: CMDMode) {
        trace!("Entering command mode {mode:?} ...");
        let prefill = match mode {
            CMDMode::SearchTable => self.query.search.clone(),
            CMDMode::FilterByColumn => match self.current_column() {
                Some(cidx) => self
                    .query
                    .filters
                    .get(&self.dataset.columns()[cidx])
                    .unwrap_or_default()
                    .to_string(),
                None => return,
            },
            CMDMode::EditCell => match (self.current_row(), self.current_column()) {
                (Some(ridx), Some(cidx)) => self.dataset.cell(ridx, cidx).to_string(),
                _ => return,
            },
        };
        self.abort_resize();
        self.previous_modus = self.modus;
        self.modus = Modus::CMDINPUT;
        self.cmd_mode = Some(mode);
        self.active_cmdinput = true;
        self.input.clear();
        self.input.set(&prefill);
        self.last_input = self.input.get();
        self.update_table_data();
    }

    fn raw_input(&mut self, key: KeyEvent) {
        if self.active_cmdinput {
            self.last_input = self.input.read(key);
            if self.last_input.finished {
                self.handle_cmd_input();
            } else {
                self.update_table_data();
            }
        }
    }

    fn handle_cmd_input(&mut self) {
        trace!("Handle cmd input {}", self.last_input.input);
        self.active_cmdinput = false;
        self.modus = self.previous_modus;
        self.previous_modus = Modus::CMDINPUT;

        let cmd_mode = self.cmd_mode.take();
        if self.last_input.canceled {
            self.last_input = InputResult::default();
            self.update_table_data();
            return;
        }
        let cmd_input = std::mem::take(&mut self.last_input).input;
        match cmd_mode {
            Some(CMDMode::SearchTable) => {
                self.query.search = cmd_input;
            }
            Some(CMDMode::FilterByColumn) => {
                if let Some(cidx) = self.current_column() {
                    let name = self.dataset.columns()[cidx].clone();
                    self.query.filters.set(&name, &cmd_input);
                }
            }
            Some(CMDMode::EditCell) => {
                if let (Some(ridx), Some(cidx)) = (self.current_row(), self.current_column()) {
                    self.dataset.set_cell(ridx, cidx, cmd_input);
                    debug!(
                        "Row {ridx} after edit: {:?}",
                        self.dataset.row(ridx).iter().collect::<Vec<_>>()
                    );
                }
            }
            None => {
                info!("Cmd mode is none!")
            }
        }
        self.refresh();
        self.set_status_message(format!("{} of {} rows", self.view.filtered_count, self.dataset.len()));
    }

    // -------------------- Column layout ---------------------- //

    fn layout_editable(&mut self) -> bool {
        if self.route != Route::Pivot {
            self.set_status_message("Column layout can only be changed in the pivot view");
            return false;
        }
        true
    }

    fn save_layout(&mut self) {
        self.view_state.save(&self.layout);
    }

    fn step_column_width(&mut self, widen: bool) {
        if !self.layout_editable() {
            return;
        }
        let Some(cidx) = self.current_column() else {
            return;
        };
        let Some(mut gesture) =
            ResizeGesture::begin(&self.capture, cidx, 1, self.layout.width(cidx))
        else {
            return;
        };
        gesture.update(if widen { 2 } else { 0 });
        let (column, width) = gesture.end();
        self.layout.set_width(column, width);
        self.save_layout();
        self.ensure_column_visible();
        self.update_table_data();
    }

    fn move_current_column(&mut self, delta: isize) {
        if !self.layout_editable() {
            return;
        }
        let Some(cidx) = self.current_column() else {
            return;
        };
        let key = self.dataset.columns()[cidx].clone();
        if self.layout.move_column(self.dataset.columns(), &key, delta) {
            self.curser_column = self
                .display_order()
                .iter()
                .position(|&c| c == cidx)
                .unwrap_or(0);
            self.save_layout();
            self.ensure_column_visible();
            self.update_table_data();
        }
    }

    fn hide_current_column(&mut self) {
        if !self.layout_editable() {
            return;
        }
        if self.display_order().len() <= 1 {
            self.set_status_message("Cannot hide the last visible column");
            return;
        }
        let Some(cidx) = self.current_column() else {
            return;
        };
        let key = self.dataset.columns()[cidx].clone();
        self.layout.toggle_hidden(self.dataset.columns(), &key);
        self.save_layout();
        self.refresh();
    }

    fn show_all_columns(&mut self) {
        if !self.layout_editable() {
            return;
        }
        self.layout.show_all();
        self.save_layout();
        self.refresh();
    }

    fn mouse_down(&mut self, x: u16, y: u16) {
        // An open drag at this point lost its release outside the terminal.
        self.commit_resize(None);
        if y as usize >= TABLE_HEADER_HEIGHT {
            return;
        }
        let px = x as usize;
        for (cidx, width, start) in self.visible_columns() {
            let separator = start + width;
            if px == separator && self.route == Route::Pivot {
                let previous = self.layout.widths.get(&cidx).copied();
                if let Some(gesture) =
                    ResizeGesture::begin(&self.capture, cidx, x, self.layout.width(cidx))
                {
                    self.resize = Some((gesture, previous));
                }
                return;
            }
            if px >= start && px < separator {
                self.sort_column(cidx);
                return;
            }
        }
    }

    fn mouse_drag(&mut self, x: u16) {
        if let Some((gesture, _)) = self.resize.as_mut() {
            let width = gesture.update(x);
            self.layout.set_width(gesture.column(), width);
            self.update_table_data();
        }
    }

    fn mouse_up(&mut self, x: u16) {
        self.commit_resize(Some(x));
    }

    /// End the drag at `x`, or at its last width when the release position is unknown.
    fn commit_resize(&mut self, x: Option<u16>) {
        if let Some((mut gesture, _)) = self.resize.take() {
            if let Some(x) = x {
                gesture.update(x);
            }
            let (column, width) = gesture.end();
            self.layout.set_width(column, width);
            self.save_layout();
            self.set_status_message(format!(
                "Column \"{}\" width {}",
                self.dataset.columns()[column],
                width
            ));
            self.update_table_data();
        }
    }

    /// Drop an unfinished drag and put the column back to where it started.
    fn abort_resize(&mut self) {
        if let Some((gesture, previous)) = self.resize.take() {
            let column = gesture.column();
            match previous {
                Some(width) => {
                    self.layout.widths.insert(column, width);
                }
                None => {
                    self.layout.widths.remove(&column);
                }
            }
            debug!("Aborted resize of column {column}");
            self.update_table_data();
        }
    }

    // -------------------- Clipboard ---------------------- //

    fn clipboard(&mut self) -> Option<&mut Clipboard> {
        if self.clipboard.is_none() {
            match Clipboard::new() {
                Ok(clipboard) => self.clipboard = Some(clipboard),
                Err(e) => warn!("Clipboard unavailable: {:?}", e),
            }
        }
        self.clipboard.as_mut()
    }

    fn copy_to_clipboard(&mut self, content: String) {
        match self.clipboard().map(|c| c.set_text(content)) {
            Some(Ok(_)) => trace!("Copied content to clipboard."),
            Some(Err(e)) => trace!("Error copying to clipboard: {:?}", e),
            None => (),
        }
    }

    fn wrap_cell_content(c: &str) -> String {
        let needs_escaping = c.contains('"');
        let needs_wrapping = c.chars().any(|c| matches!(c, ' ' | '\t' | ',' | '\n'));
        let mut out = String::from(c);

        if needs_escaping {
            out = out.replace('"', "\"\"");
        }
        if needs_escaping || needs_wrapping {
            out = format!("\"{out}\"");
        }
        out
    }

    fn copy_table_cell(&mut self) {
        if let (Some(ridx), Some(cidx)) = (self.current_row(), self.current_column()) {
            let cell = self.dataset.cell(ridx, cidx).to_string();
            trace!("Cell content: {}", cell);
            self.copy_to_clipboard(cell);
        }
    }

    fn copy_table_row(&mut self) {
        if let Some(ridx) = self.current_row() {
            let row_content = self
                .dataset
                .row(ridx)
                .values()
                .map(Model::wrap_cell_content)
                .collect::<Vec<String>>()
                .join(",");
            self.copy_to_clipboard(row_content);
        }
    }
}
