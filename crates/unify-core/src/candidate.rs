//! Duplicate candidates: pairs of patient records that may be the same
//! person.
//!
//! Candidates are transient: every detection pass regenerates them, and a
//! merge or an explicit dismissal clears them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Match type ──────────────────────────────────────────────────────────────

/// The rule tier that flagged a pair.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchType {
  /// Identical national ID (CPF).
  CpfExact,
  EmailExact,
  NameDobSimilar,
}

impl MatchType {
  /// The string stored in the `match_type` column and sent over the wire.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::CpfExact => "CPF_EXACT",
      Self::EmailExact => "EMAIL_EXACT",
      Self::NameDobSimilar => "NAME_DOB_SIMILAR",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "CPF_EXACT" => Ok(Self::CpfExact),
      "EMAIL_EXACT" => Ok(Self::EmailExact),
      "NAME_DOB_SIMILAR" => Ok(Self::NameDobSimilar),
      other => Err(Error::UnknownMatchType(other.to_owned())),
    }
  }
}

// ─── Confidence ──────────────────────────────────────────────────────────────

/// A certainty in `[0, 1]` that a pair is a true duplicate.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct ConfidenceScore(f64);

impl ConfidenceScore {
  pub const CERTAIN: Self = Self(1.0);

  pub fn new(value: f64) -> Result<Self> {
    if (0.0..=1.0).contains(&value) {
      Ok(Self(value))
    } else {
      Err(Error::InvalidRequest(format!(
        "confidence score {value} is outside [0, 1]"
      )))
    }
  }

  /// Clamp `value` into range; NaN becomes 0.
  pub fn clamped(value: f64) -> Self {
    if value.is_nan() { Self(0.0) } else { Self(value.clamp(0.0, 1.0)) }
  }

  pub fn value(self) -> f64 { self.0 }
}

impl TryFrom<f64> for ConfidenceScore {
  type Error = Error;

  fn try_from(value: f64) -> Result<Self> { Self::new(value) }
}

impl From<ConfidenceScore> for f64 {
  fn from(score: ConfidenceScore) -> Self { score.0 }
}

// ─── Pair ────────────────────────────────────────────────────────────────────

/// An unordered pair of distinct patient ids, stored lower id first.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PatientPair {
  pub patient_a: Uuid,
  pub patient_b: Uuid,
}

impl PatientPair {
  /// Returns `None` when `a == b`.
  pub fn new(a: Uuid, b: Uuid) -> Option<Self> {
    match a.cmp(&b) {
      std::cmp::Ordering::Less => Some(Self { patient_a: a, patient_b: b }),
      std::cmp::Ordering::Greater => Some(Self { patient_a: b, patient_b: a }),
      std::cmp::Ordering::Equal => None,
    }
  }

  pub fn contains(&self, id: Uuid) -> bool {
    self.patient_a == id || self.patient_b == id
  }
}

// ─── Candidates ──────────────────────────────────────────────────────────────

/// One rule's verdict on one pair, as emitted by a
/// [`Matcher`](crate::matching::Matcher). Persisted keyed by
/// `(pair, match_type)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateMatch {
  pub pair:       PatientPair,
  pub match_type: MatchType,
  pub confidence: ConfidenceScore,
}

/// A pair flagged by one or more tiers, with the strongest verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateCandidate {
  #[serde(flatten)]
  pub pair:             PatientPair,
  /// The tier that produced `confidence_score`.
  pub match_type:       MatchType,
  /// Every tier that fired for the pair, in tier order.
  pub matched_by:       Vec<MatchType>,
  pub confidence_score: ConfidenceScore,
  pub detected_at:      DateTime<Utc>,
}

/// Union per-tier matches into one candidate per pair, keeping the maximum
/// confidence. The result is sorted by descending confidence, then by pair.
pub fn union_matches(
  matches: impl IntoIterator<Item = (CandidateMatch, DateTime<Utc>)>,
) -> Vec<DuplicateCandidate> {
  let mut by_pair: BTreeMap<PatientPair, DuplicateCandidate> = BTreeMap::new();

  for (m, detected_at) in matches {
    by_pair
      .entry(m.pair)
      .and_modify(|c| {
        if !c.matched_by.contains(&m.match_type) {
          c.matched_by.push(m.match_type);
          c.matched_by.sort();
        }
        if m.confidence > c.confidence_score {
          c.confidence_score = m.confidence;
          c.match_type = m.match_type;
        }
        if detected_at < c.detected_at {
          c.detected_at = detected_at;
        }
      })
      .or_insert_with(|| DuplicateCandidate {
        pair:             m.pair,
        match_type:       m.match_type,
        matched_by:       vec![m.match_type],
        confidence_score: m.confidence,
        detected_at,
      });
  }

  let mut out: Vec<_> = by_pair.into_values().collect();
  sort_candidates(&mut out);
  out
}

/// Descending confidence; ties ordered by pair for a stable listing.
pub fn sort_candidates(candidates: &mut [DuplicateCandidate]) {
  candidates.sort_by(|x, y| {
    y.confidence_score
      .value()
      .total_cmp(&x.confidence_score.value())
      .then_with(|| x.pair.cmp(&y.pair))
  });
}

// ─── Scope ───────────────────────────────────────────────────────────────────

/// Restricts a detection pass. The default scope scans everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionScope {
  /// Only scan records of this tenant.
  pub tenant_id:   Option<String>,
  /// Only produce pairs touching at least one of these records (e.g. the
  /// patients registered since the last pass).
  #[serde(default)]
  pub patient_ids: Vec<Uuid>,
}

impl DetectionScope {
  pub fn tenant(tenant_id: impl Into<String>) -> Self {
    Self { tenant_id: Some(tenant_id.into()), patient_ids: Vec::new() }
  }

  pub fn includes_tenant(&self, tenant_id: &str) -> bool {
    self.tenant_id.as_deref().is_none_or(|t| t == tenant_id)
  }

  pub fn includes_pair(&self, pair: &PatientPair) -> bool {
    self.patient_ids.is_empty()
      || self.patient_ids.iter().any(|id| pair.contains(*id))
  }
}

// ─── Dismissal ───────────────────────────────────────────────────────────────

/// An operator's verdict that a pair is not a duplicate. Dismissed pairs are
/// left out of later detection results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateDismissal {
  #[serde(flatten)]
  pub pair:         PatientPair,
  pub dismissed_by: String,
  pub reason:       Option<String>,
  pub dismissed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ids() -> (Uuid, Uuid) {
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    if a < b { (a, b) } else { (b, a) }
  }

  #[test]
  fn pair_is_unordered() {
    let (a, b) = ids();
    assert_eq!(PatientPair::new(a, b), PatientPair::new(b, a));
    assert_eq!(PatientPair::new(b, a).unwrap().patient_a, a);
    assert!(PatientPair::new(a, a).is_none());
  }

  #[test]
  fn confidence_rejects_out_of_range() {
    assert!(ConfidenceScore::new(1.01).is_err());
    assert!(ConfidenceScore::new(-0.1).is_err());
    assert!(ConfidenceScore::new(f64::NAN).is_err());
    assert_eq!(ConfidenceScore::new(0.85).unwrap().value(), 0.85);
  }

  #[test]
  fn confidence_deserialisation_validates() {
    assert!(serde_json::from_str::<ConfidenceScore>("0.5").is_ok());
    assert!(serde_json::from_str::<ConfidenceScore>("1.5").is_err());
  }

  #[test]
  fn match_type_wire_names() {
    assert_eq!(
      serde_json::to_string(&MatchType::NameDobSimilar).unwrap(),
      "\"NAME_DOB_SIMILAR\""
    );
    for t in [MatchType::CpfExact, MatchType::EmailExact, MatchType::NameDobSimilar] {
      assert_eq!(MatchType::parse(t.as_str()).unwrap(), t);
    }
  }

  #[test]
  fn union_keeps_max_confidence_and_all_tiers() {
    let (a, b) = ids();
    let pair = PatientPair::new(a, b).unwrap();
    let now = Utc::now();

    let merged = union_matches([
      (
        CandidateMatch {
          pair,
          match_type: MatchType::EmailExact,
          confidence: ConfidenceScore::new(0.85).unwrap(),
        },
        now,
      ),
      (
        CandidateMatch {
          pair,
          match_type: MatchType::CpfExact,
          confidence: ConfidenceScore::CERTAIN,
        },
        now,
      ),
    ]);

    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].match_type, MatchType::CpfExact);
    assert_eq!(merged[0].confidence_score, ConfidenceScore::CERTAIN);
    assert_eq!(merged[0].matched_by, vec![MatchType::CpfExact, MatchType::EmailExact]);
  }

  #[test]
  fn union_sorts_by_descending_confidence() {
    let now = Utc::now();
    let (a, b) = ids();
    let (c, d) = ids();
    let merged = union_matches([
      (
        CandidateMatch {
          pair:       PatientPair::new(a, b).unwrap(),
          match_type: MatchType::NameDobSimilar,
          confidence: ConfidenceScore::new(0.7).unwrap(),
        },
        now,
      ),
      (
        CandidateMatch {
          pair:       PatientPair::new(c, d).unwrap(),
          match_type: MatchType::EmailExact,
          confidence: ConfidenceScore::new(0.85).unwrap(),
        },
        now,
      ),
    ]);

    assert_eq!(merged[0].match_type, MatchType::EmailExact);
    assert_eq!(merged[1].match_type, MatchType::NameDobSimilar);
  }

  #[test]
  fn scope_filters_pairs_by_patient() {
    let (a, b) = ids();
    let (c, d) = ids();
    let scope = DetectionScope { tenant_id: None, patient_ids: vec![a] };
    assert!(scope.includes_pair(&PatientPair::new(a, b).unwrap()));
    assert!(!scope.includes_pair(&PatientPair::new(c, d).unwrap()));
    assert!(DetectionScope::default().includes_pair(&PatientPair::new(c, d).unwrap()));
  }
}
