//! Application state machine and event dispatcher.

use std::{collections::HashMap, sync::Arc};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use fuzzy_matcher::{FuzzyMatcher, skim::SkimMatcherV2};
use unify_core::{
  artifact::ArtifactCounts, candidate::DuplicateCandidate, merge::MergeHistoryEntry,
  patient::PatientRecord,
};
use uuid::Uuid;

use crate::client::{ApiClient, MergeBody};

/// How many history rows the history screen fetches.
const HISTORY_LIMIT: usize = 200;

// ─── Screen ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
  /// Focus on the candidate queue; right pane previews the pair.
  Queue,
  /// Focus on the side-by-side comparison of one pair.
  Review,
  /// Completed merges, newest first.
  History,
}

/// Which record of the pair survives a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keep {
  A,
  B,
}

/// A merge the operator has chosen but not yet confirmed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingMerge {
  pub source:     Uuid,
  pub target:     Uuid,
  pub confidence: f64,
}

impl PendingMerge {
  pub fn for_candidate(candidate: &DuplicateCandidate, keep: Keep) -> Self {
    let (source, target) = match keep {
      Keep::A => (candidate.pair.patient_b, candidate.pair.patient_a),
      Keep::B => (candidate.pair.patient_a, candidate.pair.patient_b),
    };
    Self { source, target, confidence: candidate.confidence_score.value() }
  }
}

// ─── App ──────────────────────────────────────────────────────────────────────

/// Top-level application state.
pub struct App {
  pub screen: Screen,

  /// Stored candidates, ranked by confidence.
  pub candidates: Vec<DuplicateCandidate>,

  /// Patient records referenced by the queue. Populated lazily.
  pub patients: HashMap<Uuid, PatientRecord>,

  /// Artifact counts per patient. Populated lazily on review.
  pub counts: HashMap<Uuid, ArtifactCounts>,

  pub history: Vec<MergeHistoryEntry>,

  /// Current fuzzy-filter string (only active when `filter_active`).
  pub filter: String,

  /// Whether the user is typing a filter query.
  pub filter_active: bool,

  /// Cursor position within the *filtered* candidate list.
  pub list_cursor: usize,

  /// Scroll offset within the history list.
  pub history_scroll: usize,

  /// Awaiting `y`/`n` confirmation.
  pub pending: Option<PendingMerge>,

  /// One-line status message shown in the status bar.
  pub status_msg: String,

  pub client: Arc<ApiClient>,
}

impl App {
  pub fn new(client: ApiClient) -> Self {
    Self {
      screen: Screen::Queue,
      candidates: Vec::new(),
      patients: HashMap::new(),
      counts: HashMap::new(),
      history: Vec::new(),
      filter: String::new(),
      filter_active: false,
      list_cursor: 0,
      history_scroll: 0,
      pending: None,
      status_msg: String::new(),
      client: Arc::new(client),
    }
  }

  // ── Data loading ──────────────────────────────────────────────────────────

  /// Fetch the stored candidates and the records they reference.
  pub async fn load_candidates(&mut self) -> anyhow::Result<()> {
    self.status_msg = "Loading candidates…".into();
    match self.client.list_candidates().await {
      Ok(candidates) => {
        self.set_candidates(candidates).await;
        self.status_msg = String::new();
        Ok(())
      }
      Err(e) => {
        self.status_msg = format!("Error: {e}");
        Err(e)
      }
    }
  }

  async fn rescan(&mut self) {
    self.status_msg = "Scanning…".into();
    match self.client.scan().await {
      Ok(candidates) => {
        let n = candidates.len();
        self.set_candidates(candidates).await;
        self.status_msg = format!("Scan finished: {n} candidate(s)");
      }
      Err(e) => self.status_msg = format!("Error: {e}"),
    }
  }

  async fn set_candidates(&mut self, candidates: Vec<DuplicateCandidate>) {
    self.candidates = candidates;
    self.list_cursor = 0;
    self.pending = None;
    // Records change on merge, so refetch rather than trust the cache.
    self.patients.clear();
    self.counts.clear();
    let ids: Vec<Uuid> = self
      .candidates
      .iter()
      .flat_map(|c| [c.pair.patient_a, c.pair.patient_b])
      .collect();
    for id in ids {
      self.ensure_patient(id).await;
    }
  }

  /// Load the record for `id` if not already cached.
  pub async fn ensure_patient(&mut self, id: Uuid) {
    if self.patients.contains_key(&id) {
      return;
    }
    if let Ok(p) = self.client.get_patient(id).await {
      self.patients.insert(id, p);
    }
  }

  async fn ensure_counts(&mut self, id: Uuid) {
    if self.counts.contains_key(&id) {
      return;
    }
    if let Ok(c) = self.client.count_artifacts(id).await {
      self.counts.insert(id, c);
    }
  }

  async fn load_history(&mut self) {
    match self.client.history(HISTORY_LIMIT).await {
      Ok(history) => {
        self.history = history;
        self.history_scroll = 0;
      }
      Err(e) => self.status_msg = format!("Error: {e}"),
    }
  }

  /// Display name for `id`, or a placeholder while it is loading.
  pub fn name_of(&self, id: Uuid) -> &str {
    self
      .patients
      .get(&id)
      .map(|p| p.full_name.as_str())
      .unwrap_or("—")
  }

  // ── Filtered list ─────────────────────────────────────────────────────────

  /// Candidates whose patient names or ids match the current filter query.
  pub fn filtered_candidates(&self) -> Vec<&DuplicateCandidate> {
    if self.filter.is_empty() {
      return self.candidates.iter().collect();
    }
    let matcher = SkimMatcherV2::default();
    self
      .candidates
      .iter()
      .filter(|c| {
        [c.pair.patient_a, c.pair.patient_b].into_iter().any(|id| {
          matcher.fuzzy_match(self.name_of(id), &self.filter).is_some()
            || matcher.fuzzy_match(&id.to_string(), &self.filter).is_some()
        })
      })
      .collect()
  }

  /// The candidate under the list cursor in the filtered view, if any.
  pub fn cursor_candidate(&self) -> Option<&DuplicateCandidate> {
    self.filtered_candidates().get(self.list_cursor).copied()
  }

  // ── Key handling ──────────────────────────────────────────────────────────

  /// Process a key event. Returns `true` to continue, `false` to quit.
  pub async fn handle_key(&mut self, key: KeyEvent) -> anyhow::Result<bool> {
    // Global: Ctrl-C quits from anywhere.
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
      return Ok(false);
    }

    if self.pending.is_some() {
      self.handle_confirm_key(key).await;
      return Ok(true);
    }

    if self.filter_active {
      self.handle_filter_key(key);
      return Ok(true);
    }

    match self.screen {
      Screen::Queue => self.handle_queue_key(key).await,
      Screen::Review => self.handle_review_key(key).await,
      Screen::History => self.handle_history_key(key).await,
    }
  }

  fn handle_filter_key(&mut self, key: KeyEvent) {
    match key.code {
      KeyCode::Esc => {
        self.filter_active = false;
        self.filter.clear();
        self.list_cursor = 0;
      }
      KeyCode::Enter => {
        self.filter_active = false;
        self.list_cursor = 0;
      }
      KeyCode::Backspace => {
        self.filter.pop();
        self.list_cursor = 0;
      }
      KeyCode::Char(c) => {
        self.filter.push(c);
        self.list_cursor = 0;
      }
      _ => {}
    }
  }

  async fn handle_confirm_key(&mut self, key: KeyEvent) {
    match key.code {
      KeyCode::Char('y') => {
        if let Some(pending) = self.pending.take() {
          self.execute_merge(pending).await;
        }
      }
      KeyCode::Char('n') | KeyCode::Esc => {
        self.pending = None;
        self.status_msg = "Merge cancelled".into();
      }
      _ => {}
    }
  }

  async fn handle_queue_key(&mut self, key: KeyEvent) -> anyhow::Result<bool> {
    match key.code {
      KeyCode::Char('q') => return Ok(false),

      KeyCode::Down | KeyCode::Char('j') => {
        let len = self.filtered_candidates().len();
        if len > 0 && self.list_cursor + 1 < len {
          self.list_cursor += 1;
        }
      }
      KeyCode::Up | KeyCode::Char('k') => {
        self.list_cursor = self.list_cursor.saturating_sub(1);
      }

      KeyCode::Enter | KeyCode::Right | KeyCode::Char('l') => self.open_review().await,

      KeyCode::Char('/') => {
        self.filter_active = true;
        self.filter.clear();
        self.list_cursor = 0;
      }

      KeyCode::Char('r') => self.rescan().await,
      KeyCode::Char('x') => self.dismiss_cursor().await,
      KeyCode::Tab => self.open_history().await,

      _ => {}
    }
    Ok(true)
  }

  async fn handle_review_key(&mut self, key: KeyEvent) -> anyhow::Result<bool> {
    match key.code {
      KeyCode::Char('q') => return Ok(false),

      KeyCode::Esc | KeyCode::Left | KeyCode::Char('h') => self.screen = Screen::Queue,

      KeyCode::Char('a') => self.choose(Keep::A),
      KeyCode::Char('b') => self.choose(Keep::B),
      KeyCode::Char('x') => {
        self.dismiss_cursor().await;
        self.screen = Screen::Queue;
      }

      KeyCode::Char(']') | KeyCode::PageDown => {
        let len = self.filtered_candidates().len();
        if len > 0 && self.list_cursor + 1 < len {
          self.list_cursor += 1;
          self.open_review().await;
        }
      }
      KeyCode::Char('[') | KeyCode::PageUp => {
        if self.list_cursor > 0 {
          self.list_cursor -= 1;
          self.open_review().await;
        }
      }

      _ => {}
    }
    Ok(true)
  }

  async fn handle_history_key(&mut self, key: KeyEvent) -> anyhow::Result<bool> {
    match key.code {
      KeyCode::Char('q') => return Ok(false),
      KeyCode::Tab | KeyCode::Esc => self.screen = Screen::Queue,
      KeyCode::Down | KeyCode::Char('j') => {
        if self.history_scroll + 1 < self.history.len() {
          self.history_scroll += 1;
        }
      }
      KeyCode::Up | KeyCode::Char('k') => {
        self.history_scroll = self.history_scroll.saturating_sub(1);
      }
      KeyCode::Char('r') => self.load_history().await,
      _ => {}
    }
    Ok(true)
  }

  // ── Actions ───────────────────────────────────────────────────────────────

  async fn open_review(&mut self) {
    let Some(pair) = self.cursor_candidate().map(|c| c.pair) else {
      return;
    };
    for id in [pair.patient_a, pair.patient_b] {
      self.ensure_patient(id).await;
      self.ensure_counts(id).await;
    }
    self.screen = Screen::Review;
  }

  async fn open_history(&mut self) {
    self.load_history().await;
    self.screen = Screen::History;
  }

  fn choose(&mut self, keep: Keep) {
    let Some(candidate) = self.cursor_candidate() else {
      return;
    };
    let pending = PendingMerge::for_candidate(candidate, keep);
    self.status_msg = format!(
      "Merge {} into {}? [y/n]",
      self.name_of(pending.source),
      self.name_of(pending.target)
    );
    self.pending = Some(pending);
  }

  async fn execute_merge(&mut self, pending: PendingMerge) {
    let operator = self.client.config().operator.clone();
    let reason = format!("operator review by {operator}");
    let body = MergeBody {
      source_id:        pending.source,
      target_id:        pending.target,
      reason:           &reason,
      confidence_score: pending.confidence,
      performed_by:     &operator,
    };
    match self.client.merge(&body).await {
      Ok(op) => {
        let moved = op.data_moved.total();
        if let Err(e) = self.load_candidates().await {
          self.status_msg = format!("Merged, but reload failed: {e}");
          return;
        }
        self.screen = Screen::Queue;
        self.status_msg = format!("Merged; {moved} record(s) moved");
      }
      Err(e) => self.status_msg = format!("Error: {e}"),
    }
  }

  async fn dismiss_cursor(&mut self) {
    let Some(pair) = self.cursor_candidate().map(|c| c.pair) else {
      return;
    };
    match self
      .client
      .dismiss(pair.patient_a, pair.patient_b, "operator review")
      .await
    {
      Ok(()) => {
        self.candidates.retain(|c| c.pair != pair);
        let len = self.filtered_candidates().len();
        self.list_cursor = self.list_cursor.min(len.saturating_sub(1));
        self.status_msg = "Pair dismissed".into();
      }
      Err(e) => self.status_msg = format!("Error: {e}"),
    }
  }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use unify_core::candidate::{ConfidenceScore, MatchType, PatientPair};

  use super::*;
  use crate::client::ApiConfig;

  fn app() -> App {
    let client = ApiClient::new(ApiConfig {
      base_url: "http://localhost:0".into(),
      operator: "tester".into(),
      tenant:   None,
    })
    .unwrap();
    App::new(client)
  }

  fn candidate(a: Uuid, b: Uuid) -> DuplicateCandidate {
    DuplicateCandidate {
      pair:             PatientPair::new(a, b).unwrap(),
      match_type:       MatchType::EmailExact,
      matched_by:       vec![MatchType::EmailExact],
      confidence_score: ConfidenceScore::new(0.85).unwrap(),
      detected_at:      Utc::now(),
    }
  }

  #[test]
  fn keep_chooses_merge_direction() {
    let c = candidate(Uuid::new_v4(), Uuid::new_v4());

    let keep_a = PendingMerge::for_candidate(&c, Keep::A);
    assert_eq!(keep_a.target, c.pair.patient_a);
    assert_eq!(keep_a.source, c.pair.patient_b);
    assert_eq!(keep_a.confidence, 0.85);

    let keep_b = PendingMerge::for_candidate(&c, Keep::B);
    assert_eq!(keep_b.target, c.pair.patient_b);
    assert_eq!(keep_b.source, c.pair.patient_a);
  }

  #[test]
  fn filter_matches_on_either_name() {
    let mut app = app();
    let (a, b, c, d) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    for (id, name) in [(a, "Maria Silva"), (b, "Maria S."), (c, "João Souza"), (d, "Joao Souza")] {
      let record = PatientRecord {
        patient_id:        id,
        tenant_id:         "clinic-1".into(),
        full_name:         name.into(),
        national_id:       None,
        email:             None,
        phone:             None,
        birth_date:        None,
        gender:            None,
        address:           None,
        emergency_contact: None,
        medical_condition: None,
        status:            Default::default(),
        merged_into:       None,
        created_at:        Utc::now(),
        updated_at:        Utc::now(),
      };
      app.patients.insert(id, record);
    }
    app.candidates = vec![candidate(a, b), candidate(c, d)];

    app.filter = "souza".into();
    let hits = app.filtered_candidates();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].pair.contains(c));

    app.filter.clear();
    assert_eq!(app.filtered_candidates().len(), 2);
  }
}
