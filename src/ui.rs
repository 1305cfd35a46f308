use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Position, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span},
    widgets::{Bar, BarChart, BarGroup, Block, Cell, Clear, Paragraph, Row, Table, Wrap},
};

use crate::domain::{CMDMode, Route};
use crate::model::{ChartView, Model, Status, UIData};

pub const TABLE_HEADER_HEIGHT: usize = 1;
pub const STATUSLINE_HEIGHT: usize = 1;
pub const CMDLINE_HEIGH: usize = 1;
pub const COLUMN_WIDTH_MARGIN: usize = 2;
pub const COLUMN_SPACER: usize = 1;

#[derive(Debug, Default)]
pub struct TableUI {}

impl TableUI {
    pub fn new() -> Self {
        Self {}
    }

    pub fn draw(&self, model: &Model, frame: &mut Frame) {
        let uidata = model.get_uidata();
        let [table_area, status_area, cmd_area] = Layout::vertical([
            Constraint::Min(TABLE_HEADER_HEIGHT as u16),
            Constraint::Length(STATUSLINE_HEIGHT as u16),
            Constraint::Length(CMDLINE_HEIGH as u16),
        ])
        .areas(frame.area());

        match (uidata.status, &uidata.chart) {
            (Status::LOADING, _) => self.draw_notice(frame, table_area, "Loading ...", Color::Yellow),
            (Status::FAILED, _) => {
                self.draw_notice(frame, table_area, &uidata.status_message, Color::Red)
            }
            (_, Some(chart)) => self.draw_chart(frame, table_area, chart),
            _ => self.draw_table(frame, table_area, uidata),
        }
        self.draw_statusline(frame, status_area, uidata);
        self.draw_cmdline(frame, cmd_area, uidata);

        if uidata.show_popup {
            self.draw_popup(frame, &uidata.popup_message);
        }
    }

    fn draw_notice(&self, frame: &mut Frame, area: Rect, text: &str, color: Color) {
        let paragraph = Paragraph::new(Line::from(text.to_string()).fg(color))
            .centered()
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }

    fn draw_table(&self, frame: &mut Frame, area: Rect, uidata: &UIData) {
        let selected = Style::new().add_modifier(Modifier::REVERSED);
        let nrows = uidata.table.first().map(|c| c.data.len()).unwrap_or(0);

        let rows: Vec<Row> = (0..nrows)
            .map(|ridx| {
                let cells = uidata.table.iter().enumerate().map(|(cidx, column)| {
                    let cell = Cell::from(column.data[ridx].as_str());
                    if ridx == uidata.selected_row && cidx == uidata.selected_column {
                        cell.style(selected)
                    } else {
                        cell
                    }
                });
                let row = Row::new(cells);
                if ridx == uidata.selected_row {
                    row.style(Style::new().bg(Color::DarkGray))
                } else {
                    row
                }
            })
            .collect();

        let widths = uidata
            .table
            .iter()
            .map(|c| Constraint::Length(c.width as u16));
        let header = Row::new(uidata.table.iter().map(|c| c.name.as_str()))
            .bold()
            .underlined();

        let table = Table::new(rows, widths)
            .column_spacing(COLUMN_SPACER as u16)
            .header(header);
        frame.render_widget(table, area);
    }

    fn draw_chart(&self, frame: &mut Frame, area: Rect, chart: &ChartView) {
        let bars: Vec<Bar> = chart
            .groups
            .iter()
            .skip(chart.offset)
            .map(|group| {
                Bar::default()
                    .value(group.count as u64)
                    .label(Line::from(group.key.replace('\n', " ↵ ")))
                    .text_value(group.count.to_string())
            })
            .collect();
        let barchart = BarChart::default()
            .block(Block::bordered().title(format!(" Rows per \"{}\" ", chart.column)))
            .direction(Direction::Horizontal)
            .bar_width(1)
            .bar_gap(0)
            .bar_style(Style::new().fg(Color::Cyan))
            .value_style(Style::new().fg(Color::Black).bg(Color::Cyan))
            .data(BarGroup::default().bars(&bars));
        frame.render_widget(barchart, area);
    }

    fn draw_statusline(&self, frame: &mut Frame, area: Rect, uidata: &UIData) {
        let [left, right] =
            Layout::horizontal([Constraint::Fill(1), Constraint::Fill(1)]).areas(area);

        let route = match uidata.route {
            Route::Table => " table ",
            Route::Pivot => " pivot ",
        };
        let position = Line::from(vec![
            Span::from(route).black().on_cyan(),
            Span::from(format!(
                " page {}/{} ",
                uidata.page_index + 1,
                uidata.total_pages
            ))
            .bold(),
            Span::from(format!("{} of {} rows ", uidata.nrows, uidata.total_rows)),
            Span::from(format!("{} ", uidata.query_summary)).yellow(),
            Span::from(uidata.name.clone()).dim(),
        ]);
        frame.render_widget(Paragraph::new(position), left);
        frame.render_widget(
            Paragraph::new(Line::from(uidata.status_message.clone()).right_aligned()),
            right,
        );
    }

    fn draw_cmdline(&self, frame: &mut Frame, area: Rect, uidata: &UIData) {
        if !uidata.active_cmdinput {
            let hint = Line::from("? help  / search  f filter  s sort  a chart  t switch view  q quit")
                .dim();
            frame.render_widget(Paragraph::new(hint), area);
            return;
        }

        let prompt = match uidata.cmd_mode {
            Some(CMDMode::SearchTable) => "search: ",
            Some(CMDMode::FilterByColumn) => "filter: ",
            Some(CMDMode::EditCell) => "edit: ",
            None => "",
        };
        let line = Line::from(vec![
            Span::from(prompt).bold(),
            Span::from(uidata.cmdinput.input.clone()),
        ]);
        frame.render_widget(Paragraph::new(line), area);

        let cursor_x = area.x as usize + prompt.len() + uidata.cmdinput.curser_pos;
        let cursor_x = cursor_x.min((area.x + area.width.saturating_sub(1)) as usize);
        frame.set_cursor_position(Position::new(cursor_x as u16, area.y));
    }

    fn draw_popup(&self, frame: &mut Frame, message: &str) {
        let area = popup_area(frame.area(), 70, 80);
        let popup = Paragraph::new(message.to_string())
            .block(Block::bordered().title(" Help ").title_bottom(" Esc to close "))
            .wrap(Wrap { trim: false });
        frame.render_widget(Clear, area);
        frame.render_widget(popup, area);
    }
}

/// Rect of `percent_x` by `percent_y` centered in `area`.
fn popup_area(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let [_, vertical, _] = Layout::vertical([
        Constraint::Percentage((100 - percent_y) / 2),
        Constraint::Percentage(percent_y),
        Constraint::Percentage((100 - percent_y) / 2),
    ])
    .areas(area);
    let [_, horizontal, _] = Layout::horizontal([
        Constraint::Percentage((100 - percent_x) / 2),
        Constraint::Percentage(percent_x),
        Constraint::Percentage((100 - percent_x) / 2),
    ])
    .areas(vertical);
    horizontal
}
