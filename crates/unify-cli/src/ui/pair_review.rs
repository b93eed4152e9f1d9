//! Pair comparison: right panel.
//!
//! Shows both records of the selected candidate side by side, highlighting
//! fields that differ and fields the survivor would gain from the other
//! record.

use ratatui::{
  Frame,
  layout::{Constraint, Direction, Layout, Rect},
  style::{Color, Modifier, Style},
  text::{Line, Span},
  widgets::{Block, Borders, Paragraph, Wrap},
};
use unify_core::{
  artifact::{ArtifactCounts, ArtifactKind},
  patient::PatientRecord,
};

use super::match_label;
use crate::app::{App, Screen};

// ─── Public entry ─────────────────────────────────────────────────────────────

/// Render the comparison pane into `area`.
pub fn draw(f: &mut Frame, area: Rect, app: &App) {
  let border = if app.screen == Screen::Review { Color::Gray } else { Color::DarkGray };
  let Some(candidate) = app.cursor_candidate() else {
    let block = Block::default()
      .title(" Review ")
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);
    f.render_widget(block, area);
    f.render_widget(
      Paragraph::new("Select a candidate and press Enter.")
        .style(Style::default().fg(Color::DarkGray)),
      inner,
    );
    return;
  };

  let matched_by: Vec<&str> = candidate.matched_by.iter().map(|t| match_label(*t)).collect();
  let block = Block::default()
    .title(format!(
      " Review  {:.2}  {} ",
      candidate.confidence_score.value(),
      matched_by.join(" + ")
    ))
    .borders(Borders::ALL)
    .border_style(Style::default().fg(border));
  let inner = block.inner(area);
  f.render_widget(block, area);

  let cols = Layout::default()
    .direction(Direction::Horizontal)
    .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
    .split(inner);

  let a = app.patients.get(&candidate.pair.patient_a);
  let b = app.patients.get(&candidate.pair.patient_b);
  let a_counts = app.counts.get(&candidate.pair.patient_a);
  let b_counts = app.counts.get(&candidate.pair.patient_b);

  draw_side(f, cols[0], "A", a, b, a_counts);
  draw_side(f, cols[1], "B", b, a, b_counts);
}

// ─── One side ─────────────────────────────────────────────────────────────────

fn draw_side(
  f: &mut Frame,
  area: Rect,
  label: &str,
  record: Option<&PatientRecord>,
  other: Option<&PatientRecord>,
  counts: Option<&ArtifactCounts>,
) {
  let Some(record) = record else {
    f.render_widget(
      Paragraph::new(format!("[{label}] loading…")).style(Style::default().fg(Color::DarkGray)),
      area,
    );
    return;
  };

  let mut lines = vec![
    Line::from(Span::styled(
      format!("[{label}] {}", record.full_name),
      Style::default().add_modifier(Modifier::BOLD),
    )),
    Line::from(Span::styled(
      record.patient_id.to_string(),
      Style::default().fg(Color::DarkGray),
    )),
    Line::from(""),
  ];

  for (name, value, other_value) in fields(record, other) {
    let value_style = match (&value, &other_value) {
      (None, Some(_)) => Style::default().fg(Color::Green),
      (Some(v), Some(o)) if v != o => Style::default().fg(Color::Yellow),
      _ => Style::default(),
    };
    let shown = match (&value, &other_value) {
      (None, Some(o)) => format!("+ {o}"),
      (Some(v), _) => v.clone(),
      (None, None) => "—".to_string(),
    };
    lines.push(Line::from(vec![
      Span::styled(
        format!("{name:<12}"),
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
      ),
      Span::styled(shown, value_style),
    ]));
  }

  lines.push(Line::from(""));
  match counts {
    Some(counts) => {
      for kind in ArtifactKind::MERGE_ORDER {
        lines.push(Line::from(vec![
          Span::styled(format!("{:<16}", kind.as_str()), Style::default().fg(Color::Gray)),
          Span::raw(counts.get(kind).to_string()),
        ]));
      }
    }
    None => lines.push(Line::from(Span::styled(
      "press Enter to load records",
      Style::default().fg(Color::DarkGray),
    ))),
  }

  f.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), area);
}

/// `(label, this side's value, other side's value)` for each compared field.
fn fields(
  record: &PatientRecord,
  other: Option<&PatientRecord>,
) -> Vec<(&'static str, Option<String>, Option<String>)> {
  fn text(v: &Option<String>) -> Option<String> {
    v.as_deref()
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .map(str::to_owned)
  }

  let pick = |p: &PatientRecord| {
    [
      ("national id", text(&p.national_id)),
      ("email", text(&p.email)),
      ("phone", text(&p.phone)),
      ("birth date", p.birth_date.map(|d| d.format("%Y-%m-%d").to_string())),
      ("gender", text(&p.gender)),
      ("address", text(&p.address)),
      ("emergency", text(&p.emergency_contact)),
      ("condition", text(&p.medical_condition)),
      ("tenant", Some(p.tenant_id.clone())),
      ("created", Some(p.created_at.format("%Y-%m-%d %H:%M").to_string())),
    ]
  };

  let mine = pick(record);
  let theirs = other.map(pick);
  mine
    .into_iter()
    .enumerate()
    .map(|(i, (name, value))| {
      let other_value = theirs.as_ref().and_then(|t| t[i].1.clone());
      (name, value, other_value)
    })
    .collect()
}
