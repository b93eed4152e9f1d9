//! Merge history: full-width table, newest first.

use ratatui::{
  Frame,
  layout::{Constraint, Rect},
  style::{Color, Modifier, Style},
  widgets::{Block, Borders, Cell, Row, Table, TableState},
};

use crate::app::App;

pub fn draw(f: &mut Frame, area: Rect, app: &App) {
  let block = Block::default()
    .title(format!(" Merge history ({}) ", app.history.len()))
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Gray));

  let header = Row::new(["when", "source → target", "moved", "by", "reason"])
    .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD));

  let rows: Vec<Row> = app
    .history
    .iter()
    .map(|h| {
      let op = &h.operation;
      Row::new(vec![
        Cell::from(op.performed_at.format("%Y-%m-%d %H:%M").to_string()),
        Cell::from(format!("{} → {}", h.source_name, h.target_name)),
        Cell::from(op.data_moved.total().to_string()),
        Cell::from(op.performed_by.clone()),
        Cell::from(op.merge_reason.clone()),
      ])
    })
    .collect();

  let table = Table::new(
    rows,
    [
      Constraint::Length(17),
      Constraint::Percentage(35),
      Constraint::Length(6),
      Constraint::Length(14),
      Constraint::Min(10),
    ],
  )
  .header(header)
  .block(block)
  .row_highlight_style(Style::default().bg(Color::Blue).fg(Color::White));

  let mut state = TableState::default();
  if !app.history.is_empty() {
    state.select(Some(app.history_scroll));
  }
  f.render_stateful_widget(table, area, &mut state);
}
