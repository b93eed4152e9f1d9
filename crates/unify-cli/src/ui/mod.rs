//! TUI rendering: orchestrates all panes.

pub mod candidate_list;
pub mod history;
pub mod pair_review;

use chrono::Local;
use ratatui::{
  Frame,
  layout::{Constraint, Direction, Layout, Rect},
  style::{Color, Modifier, Style},
  text::{Line, Span},
  widgets::{Block, Paragraph},
};

use crate::app::{App, Screen};

// ─── Root draw ────────────────────────────────────────────────────────────────

/// Main draw function called each frame.
pub fn draw(f: &mut Frame, app: &App) {
  let rows = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // header
      Constraint::Min(0),    // body
      Constraint::Length(1), // status bar
    ])
    .split(f.area());

  draw_header(f, rows[0], app);
  draw_body(f, rows[1], app);
  draw_status(f, rows[2], app);
}

// ─── Header ───────────────────────────────────────────────────────────────────

fn draw_header(f: &mut Frame, area: Rect, app: &App) {
  let date = Local::now().format("%Y-%m-%d").to_string();
  let config = app.client.config();
  let scope = config.tenant.as_deref().unwrap_or("all tenants");

  let left = Span::styled(
    format!(" unify  {scope}  [Tab] history  [q] quit"),
    Style::default()
      .fg(Color::White)
      .add_modifier(Modifier::BOLD),
  );
  let right = Span::styled(
    format!("{}  {date} ", config.operator),
    Style::default().fg(Color::Gray),
  );

  let pad = area
    .width
    .saturating_sub(left.width() as u16)
    .saturating_sub(right.width() as u16);

  let line = Line::from(vec![left, Span::raw(" ".repeat(pad as usize)), right]);

  let block = Block::default().style(Style::default().bg(Color::DarkGray));
  let inner = block.inner(area);
  f.render_widget(block, area);
  f.render_widget(Paragraph::new(line), inner);
}

// ─── Body ─────────────────────────────────────────────────────────────────────

fn draw_body(f: &mut Frame, area: Rect, app: &App) {
  if app.screen == Screen::History {
    history::draw(f, area, app);
    return;
  }

  let cols = Layout::default()
    .direction(Direction::Horizontal)
    .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
    .split(area);

  candidate_list::draw(f, cols[0], app);
  pair_review::draw(f, cols[1], app);
}

// ─── Status bar ───────────────────────────────────────────────────────────────

fn draw_status(f: &mut Frame, area: Rect, app: &App) {
  let (mode_label, hints) = match app.screen {
    _ if app.pending.is_some() => ("CONFIRM", "y merge  n cancel"),
    Screen::Queue if app.filter_active => ("SEARCH", "Type to filter  Esc cancel  Enter done"),
    Screen::Queue => (
      "QUEUE",
      "↑↓/jk navigate  Enter review  / search  r rescan  x dismiss  q quit",
    ),
    Screen::Review => (
      "REVIEW",
      "a keep A  b keep B  x not a duplicate  [ ] prev/next  Esc back",
    ),
    Screen::History => ("HISTORY", "↑↓/jk scroll  r reload  Tab back  q quit"),
  };

  let status = if app.status_msg.is_empty() {
    hints.to_string()
  } else {
    app.status_msg.clone()
  };

  let mode_span = Span::styled(
    format!(" {mode_label} "),
    Style::default()
      .fg(Color::Black)
      .bg(if app.pending.is_some() { Color::Yellow } else { Color::Cyan })
      .add_modifier(Modifier::BOLD),
  );
  let hint_span = Span::styled(format!("  {status}"), Style::default().fg(Color::Gray));

  f.render_widget(
    Paragraph::new(Line::from(vec![mode_span, hint_span])).style(Style::default().bg(Color::Black)),
    area,
  );
}

/// Compact label for a match tier.
pub(crate) fn match_label(t: unify_core::candidate::MatchType) -> &'static str {
  use unify_core::candidate::MatchType;
  match t {
    MatchType::CpfExact => "CPF",
    MatchType::EmailExact => "email",
    MatchType::NameDobSimilar => "name+dob",
  }
}
