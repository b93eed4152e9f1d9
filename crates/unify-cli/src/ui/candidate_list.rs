//! Candidate queue: left panel.

use ratatui::{
  Frame,
  layout::Rect,
  style::{Color, Modifier, Style},
  text::{Line, Span},
  widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
};

use super::match_label;
use crate::app::{App, Screen};

/// Render the candidate queue into `area`.
pub fn draw(f: &mut Frame, area: Rect, app: &App) {
  let filtered = app.filtered_candidates();
  let total = app.candidates.len();

  let title = if app.filter_active || !app.filter.is_empty() {
    format!(" Candidates ({}/{}) ", filtered.len(), total)
  } else {
    format!(" Candidates ({total}) ")
  };

  let border = if app.screen == Screen::Queue { Color::Gray } else { Color::DarkGray };
  let block = Block::default()
    .title(title)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(border));

  let items: Vec<ListItem> = filtered
    .iter()
    .map(|c| {
      let score = c.confidence_score.value();
      let score_color = if score >= 0.95 {
        Color::Red
      } else if score >= 0.8 {
        Color::Yellow
      } else {
        Color::Gray
      };
      ListItem::new(Line::from(vec![
        Span::styled(format!("{score:.2} "), Style::default().fg(score_color)),
        Span::styled(
          format!("{:<9}", match_label(c.match_type)),
          Style::default().fg(Color::Cyan),
        ),
        Span::raw(format!(
          "{} / {}",
          app.name_of(c.pair.patient_a),
          app.name_of(c.pair.patient_b)
        )),
      ]))
    })
    .collect();

  let mut inner_area = block.inner(area);
  f.render_widget(block, area);

  // Filter bar at the bottom of the inner area.
  if (app.filter_active || !app.filter.is_empty()) && inner_area.height > 2 {
    let filter_area = Rect {
      x:      inner_area.x,
      y:      inner_area.y + inner_area.height - 1,
      width:  inner_area.width,
      height: 1,
    };
    inner_area.height = inner_area.height.saturating_sub(1);

    let filter_text = if app.filter_active {
      format!("/{}_", app.filter)
    } else {
      format!("/{}", app.filter)
    };
    f.render_widget(
      Paragraph::new(filter_text).style(Style::default().fg(Color::Yellow)),
      filter_area,
    );
  }

  if filtered.is_empty() {
    f.render_widget(
      Paragraph::new("No open candidates. Press r to rescan.")
        .style(Style::default().fg(Color::DarkGray)),
      inner_area,
    );
    return;
  }

  let mut state = ListState::default();
  state.select(Some(app.list_cursor));

  f.render_stateful_widget(
    List::new(items).highlight_style(
      Style::default()
        .bg(Color::Blue)
        .fg(Color::White)
        .add_modifier(Modifier::BOLD),
    ),
    inner_area,
    &mut state,
  );
}
