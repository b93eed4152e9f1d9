//! Duplicate detection: matcher strategies and the [`Detector`] that runs
//! them.
//!
//! Each [`Matcher`] is one independent rule tier. It looks at a partition of
//! active records (one tenant) and emits `(pair, match_type, confidence)`
//! verdicts. A tier whose required fields are absent on a record simply skips
//! that record. The detector unions the verdicts per pair.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  candidate::{
    CandidateMatch, ConfidenceScore, DetectionScope, DuplicateCandidate, MatchType,
    PatientPair, union_matches,
  },
  patient::PatientRecord,
};

// ─── Configuration ───────────────────────────────────────────────────────────

/// Tunable thresholds for the rule tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
  /// Confidence of an exact national-ID match.
  pub cpf_confidence:            f64,
  /// Confidence of an exact email match. Lower than CPF because families
  /// legitimately share addresses.
  pub email_confidence:          f64,
  /// Minimum normalised-name similarity for the name + birth-date tier.
  pub name_similarity_threshold: f64,
  /// Confidence assigned at exactly the threshold similarity.
  pub name_dob_min_confidence:   f64,
  /// Confidence assigned to identical normalised names.
  pub name_dob_max_confidence:   f64,
}

impl Default for MatchingConfig {
  fn default() -> Self {
    Self {
      cpf_confidence:            1.0,
      email_confidence:          0.85,
      name_similarity_threshold: 0.85,
      name_dob_min_confidence:   0.6,
      name_dob_max_confidence:   0.8,
    }
  }
}

// ─── Strategy trait ──────────────────────────────────────────────────────────

/// One rule tier.
pub trait Matcher: Send + Sync {
  fn match_type(&self) -> MatchType;

  /// Emit a verdict for every qualifying pair in `patients`. All records are
  /// active and belong to the same tenant.
  fn find(&self, patients: &[&PatientRecord]) -> Vec<CandidateMatch>;
}

/// Group records by a derived key and pair every two members of a group.
fn pair_by_key<F>(
  patients: &[&PatientRecord],
  match_type: MatchType,
  confidence: ConfidenceScore,
  key: F,
) -> Vec<CandidateMatch>
where
  F: Fn(&PatientRecord) -> Option<String>,
{
  let mut groups: HashMap<String, Vec<Uuid>> = HashMap::new();
  for p in patients {
    if let Some(k) = key(p) {
      groups.entry(k).or_default().push(p.patient_id);
    }
  }

  let mut out = Vec::new();
  for ids in groups.values().filter(|ids| ids.len() > 1) {
    for (i, a) in ids.iter().enumerate() {
      for b in &ids[i + 1..] {
        if let Some(pair) = PatientPair::new(*a, *b) {
          out.push(CandidateMatch { pair, match_type, confidence });
        }
      }
    }
  }
  out
}

// ─── CPF_EXACT ───────────────────────────────────────────────────────────────

/// Identical national ID. The ID is authoritative.
pub struct NationalIdMatcher {
  pub confidence: ConfidenceScore,
}

impl Matcher for NationalIdMatcher {
  fn match_type(&self) -> MatchType { MatchType::CpfExact }

  fn find(&self, patients: &[&PatientRecord]) -> Vec<CandidateMatch> {
    pair_by_key(patients, self.match_type(), self.confidence, |p| {
      p.national_id.as_deref().and_then(normalize_national_id)
    })
  }
}

/// Keep only the digits of a national ID. An ID without digits compares
/// trimmed and case-folded; `None` only for a blank ID.
pub fn normalize_national_id(raw: &str) -> Option<String> {
  let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
  if !digits.is_empty() {
    return Some(digits);
  }
  let folded = raw.trim().to_lowercase();
  (!folded.is_empty()).then_some(folded)
}

// ─── EMAIL_EXACT ─────────────────────────────────────────────────────────────

pub struct EmailMatcher {
  pub confidence: ConfidenceScore,
}

impl Matcher for EmailMatcher {
  fn match_type(&self) -> MatchType { MatchType::EmailExact }

  fn find(&self, patients: &[&PatientRecord]) -> Vec<CandidateMatch> {
    pair_by_key(patients, self.match_type(), self.confidence, |p| {
      p.email.as_deref().and_then(normalize_email)
    })
  }
}

pub fn normalize_email(raw: &str) -> Option<String> {
  let email = raw.trim().to_lowercase();
  (!email.is_empty()).then_some(email)
}

// ─── NAME_DOB_SIMILAR ────────────────────────────────────────────────────────

/// Similar name on the same birth date. Records are blocked by birth date, so
/// only same-day records are ever compared.
pub struct NameBirthDateMatcher {
  pub threshold:      f64,
  pub min_confidence: f64,
  pub max_confidence: f64,
}

impl NameBirthDateMatcher {
  /// Map a similarity in `[threshold, 1]` linearly onto
  /// `[min_confidence, max_confidence]`.
  pub fn scale(&self, similarity: f64) -> ConfidenceScore {
    let span = 1.0 - self.threshold;
    let t = if span <= f64::EPSILON {
      1.0
    } else {
      ((similarity - self.threshold) / span).clamp(0.0, 1.0)
    };
    ConfidenceScore::clamped(
      self.min_confidence + t * (self.max_confidence - self.min_confidence),
    )
  }
}

impl Matcher for NameBirthDateMatcher {
  fn match_type(&self) -> MatchType { MatchType::NameDobSimilar }

  fn find(&self, patients: &[&PatientRecord]) -> Vec<CandidateMatch> {
    let mut blocks: HashMap<NaiveDate, Vec<(Uuid, String)>> = HashMap::new();
    for p in patients {
      let Some(dob) = p.birth_date else { continue };
      let name = normalize_name(&p.full_name);
      if name.is_empty() {
        continue;
      }
      blocks.entry(dob).or_default().push((p.patient_id, name));
    }

    let mut out = Vec::new();
    for block in blocks.values().filter(|b| b.len() > 1) {
      for (i, (a, name_a)) in block.iter().enumerate() {
        for (b, name_b) in &block[i + 1..] {
          let similarity = name_similarity(name_a, name_b);
          if similarity < self.threshold {
            continue;
          }
          if let Some(pair) = PatientPair::new(*a, *b) {
            out.push(CandidateMatch {
              pair,
              match_type: self.match_type(),
              confidence: self.scale(similarity),
            });
          }
        }
      }
    }
    out
  }
}

/// Lowercase, turn every non-alphanumeric run into a single space, trim.
pub fn normalize_name(raw: &str) -> String {
  raw
    .to_lowercase()
    .split(|c: char| !c.is_alphanumeric())
    .filter(|t| !t.is_empty())
    .collect::<Vec<_>>()
    .join(" ")
}

/// Similarity in `[0, 1]` of two already-normalised names: the better of the
/// plain edit-distance ratio and the ratio over alphabetically sorted tokens,
/// so reordered names ("silva maria" / "maria silva") still match.
pub fn name_similarity(a: &str, b: &str) -> f64 {
  let direct = strsim::normalized_levenshtein(a, b);
  let token_sorted = strsim::normalized_levenshtein(&sort_tokens(a), &sort_tokens(b));
  direct.max(token_sorted)
}

fn sort_tokens(name: &str) -> String {
  let mut tokens: Vec<&str> = name.split_whitespace().collect();
  tokens.sort_unstable();
  tokens.join(" ")
}

// ─── Detector ────────────────────────────────────────────────────────────────

/// Runs an ordered list of matchers over the patient repository.
pub struct Detector {
  matchers: Vec<Box<dyn Matcher>>,
}

impl Detector {
  pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self { Self { matchers } }

  /// The three standard tiers, configured from `config`.
  pub fn from_config(config: &MatchingConfig) -> Self {
    Self::new(vec![
      Box::new(NationalIdMatcher {
        confidence: ConfidenceScore::clamped(config.cpf_confidence),
      }),
      Box::new(EmailMatcher {
        confidence: ConfidenceScore::clamped(config.email_confidence),
      }),
      Box::new(NameBirthDateMatcher {
        threshold:      config.name_similarity_threshold,
        min_confidence: config.name_dob_min_confidence,
        max_confidence: config.name_dob_max_confidence,
      }),
    ])
  }

  /// Run every matcher over the active records in `scope` and return the raw
  /// per-tier verdicts. Tenants are scanned in parallel.
  pub fn scan(
    &self,
    patients: &[PatientRecord],
    scope: &DetectionScope,
  ) -> Vec<CandidateMatch> {
    let mut partitions: HashMap<&str, Vec<&PatientRecord>> = HashMap::new();
    for p in patients
      .iter()
      .filter(|p| p.is_active() && scope.includes_tenant(&p.tenant_id))
    {
      partitions.entry(p.tenant_id.as_str()).or_default().push(p);
    }

    let mut matches: Vec<CandidateMatch> = partitions
      .into_par_iter()
      .flat_map_iter(|(_, partition)| {
        self
          .matchers
          .iter()
          .flat_map(|m| m.find(&partition))
          .collect::<Vec<_>>()
      })
      .filter(|m| scope.includes_pair(&m.pair))
      .collect();

    matches.sort_by(|x, y| {
      x.pair.cmp(&y.pair).then_with(|| x.match_type.cmp(&y.match_type))
    });
    matches.dedup_by(|x, y| x.pair == y.pair && x.match_type == y.match_type);
    matches
  }

  /// Scan and union the verdicts into ranked candidates stamped
  /// `detected_at`.
  pub fn detect(
    &self,
    patients: &[PatientRecord],
    scope: &DetectionScope,
    detected_at: DateTime<Utc>,
  ) -> Vec<DuplicateCandidate> {
    union_matches(
      self
        .scan(patients, scope)
        .into_iter()
        .map(|m| (m, detected_at)),
    )
  }
}

impl Default for Detector {
  fn default() -> Self { Self::from_config(&MatchingConfig::default()) }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::patient::{PatientStatus, fixtures::patient};

  fn dob(y: i32, m: u32, d: u32) -> Option<NaiveDate> { NaiveDate::from_ymd_opt(y, m, d) }

  // ── Normalisation ──────────────────────────────────────────────────────────

  #[test]
  fn national_id_keeps_digits_only() {
    assert_eq!(normalize_national_id("111.444.777-35").as_deref(), Some("11144477735"));
    assert_eq!(normalize_national_id("   "), None);
    assert_eq!(normalize_national_id(" RG-ab ").as_deref(), Some("rg-ab"));
  }

  #[test]
  fn cpf_tier_matches_equal_ids_without_digits() {
    let mut a = patient("c", "Ana");
    a.national_id = Some("RG-AB".into());
    let mut b = patient("c", "Bruno");
    b.national_id = Some("rg-ab".into());
    let mut c = patient("c", "Carla");
    c.national_id = Some("RG-XY".into());

    let found = NationalIdMatcher { confidence: ConfidenceScore::CERTAIN }.find(&[&a, &b, &c]);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].pair, PatientPair::new(a.patient_id, b.patient_id).unwrap());
    assert_eq!(found[0].confidence.value(), 1.0);
  }

  #[test]
  fn name_normalisation_collapses_punctuation() {
    assert_eq!(normalize_name("  SILVA,  Maria-José "), "silva maria josé");
  }

  #[test]
  fn similarity_tolerates_token_order() {
    let sim = name_similarity("maria silva", "silva maria");
    assert!((sim - 1.0).abs() < f64::EPSILON);
  }

  #[test]
  fn similarity_is_symmetric_and_bounded() {
    for (a, b) in [("joao", "joana"), ("ana paula", "paula ana souza"), ("", "x")] {
      let ab = name_similarity(a, b);
      assert!((0.0..=1.0).contains(&ab));
      assert!((ab - name_similarity(b, a)).abs() < 1e-12);
    }
  }

  // ── Tiers ──────────────────────────────────────────────────────────────────

  #[test]
  fn cpf_tier_matches_formatted_and_bare_ids() {
    let mut a = patient("c", "Ana");
    a.national_id = Some("111.444.777-35".into());
    let mut b = patient("c", "Bruno");
    b.national_id = Some("11144477735".into());
    let c = patient("c", "Carla");

    let found = NationalIdMatcher { confidence: ConfidenceScore::CERTAIN }.find(&[&a, &b, &c]);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].pair, PatientPair::new(a.patient_id, b.patient_id).unwrap());
    assert_eq!(found[0].confidence.value(), 1.0);
  }

  #[test]
  fn cpf_tier_skips_empty_ids() {
    let mut a = patient("c", "Ana");
    a.national_id = Some("".into());
    let mut b = patient("c", "Bruno");
    b.national_id = Some("".into());

    let found = NationalIdMatcher { confidence: ConfidenceScore::CERTAIN }.find(&[&a, &b]);
    assert!(found.is_empty());
  }

  #[test]
  fn cpf_tier_pairs_every_member_of_a_group() {
    let records: Vec<_> = (0..3)
      .map(|i| {
        let mut p = patient("c", &format!("P{i}"));
        p.national_id = Some("999".into());
        p
      })
      .collect();
    let refs: Vec<_> = records.iter().collect();
    let found = NationalIdMatcher { confidence: ConfidenceScore::CERTAIN }.find(&refs);
    assert_eq!(found.len(), 3);
  }

  #[test]
  fn email_tier_is_case_insensitive() {
    let mut a = patient("c", "Ana");
    a.email = Some("Family@Example.com ".into());
    let mut b = patient("c", "Beto");
    b.email = Some("family@example.com".into());

    let found = EmailMatcher { confidence: ConfidenceScore::new(0.85).unwrap() }.find(&[&a, &b]);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].match_type, MatchType::EmailExact);
    assert_eq!(found[0].confidence.value(), 0.85);
  }

  #[test]
  fn name_dob_tier_requires_same_birth_date() {
    let mut a = patient("c", "Maria Aparecida Silva");
    a.birth_date = dob(1980, 5, 17);
    let mut b = patient("c", "Maria Aparecida Silva");
    b.birth_date = dob(1980, 5, 18);
    let mut c = patient("c", "Maria Aparecida Silva");
    c.birth_date = None;

    let m = NameBirthDateMatcher { threshold: 0.85, min_confidence: 0.6, max_confidence: 0.8 };
    assert!(m.find(&[&a, &b, &c]).is_empty());
  }

  #[test]
  fn name_dob_tier_scales_confidence_by_similarity() {
    let mut a = patient("c", "Maria Aparecida Silva");
    a.birth_date = dob(1980, 5, 17);
    let mut b = patient("c", "maria aparecida silva");
    b.birth_date = dob(1980, 5, 17);
    let mut c = patient("c", "Maria Aparecida Sylva");
    c.birth_date = dob(1980, 5, 17);

    let m = NameBirthDateMatcher { threshold: 0.85, min_confidence: 0.6, max_confidence: 0.8 };
    let found = m.find(&[&a, &b, &c]);
    assert_eq!(found.len(), 3);

    let exact = PatientPair::new(a.patient_id, b.patient_id).unwrap();
    for f in &found {
      let v = f.confidence.value();
      assert!((0.6..=0.8).contains(&v), "confidence {v} out of band");
      if f.pair == exact {
        assert!((v - 0.8).abs() < 1e-9);
      } else {
        assert!(v < 0.8);
      }
    }
  }

  #[test]
  fn name_dob_tier_rejects_dissimilar_names() {
    let mut a = patient("c", "Maria Silva");
    a.birth_date = dob(1980, 5, 17);
    let mut b = patient("c", "Roberto Carlos");
    b.birth_date = dob(1980, 5, 17);

    let m = NameBirthDateMatcher { threshold: 0.85, min_confidence: 0.6, max_confidence: 0.8 };
    assert!(m.find(&[&a, &b]).is_empty());
  }

  #[test]
  fn scale_hits_band_edges() {
    let m = NameBirthDateMatcher { threshold: 0.85, min_confidence: 0.6, max_confidence: 0.8 };
    assert!((m.scale(0.85).value() - 0.6).abs() < 1e-9);
    assert!((m.scale(1.0).value() - 0.8).abs() < 1e-9);
  }

  // ── Detector ───────────────────────────────────────────────────────────────

  #[test]
  fn detector_unions_tiers_and_ranks() {
    let mut a = patient("c", "Ana Souza");
    a.national_id = Some("111".into());
    a.email = Some("ana@example.com".into());
    let mut b = patient("c", "Ana Souza");
    b.national_id = Some("111".into());
    b.email = Some("ana@example.com".into());
    let mut c = patient("c", "Caio");
    c.email = Some("shared@example.com".into());
    let mut d = patient("c", "Duda");
    d.email = Some("shared@example.com".into());

    let out = Detector::default().detect(&[a, b, c, d], &DetectionScope::default(), Utc::now());
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].match_type, MatchType::CpfExact);
    assert_eq!(out[0].matched_by, vec![MatchType::CpfExact, MatchType::EmailExact]);
    assert_eq!(out[1].match_type, MatchType::EmailExact);
  }

  #[test]
  fn detector_excludes_merged_records() {
    let mut a = patient("c", "A");
    a.national_id = Some("1".into());
    let mut b = patient("c", "B");
    b.national_id = Some("1".into());
    b.status = PatientStatus::Merged;
    b.merged_into = Some(a.patient_id);

    let out = Detector::default().detect(&[a, b], &DetectionScope::default(), Utc::now());
    assert!(out.is_empty());
  }

  #[test]
  fn detector_never_pairs_across_tenants() {
    let mut a = patient("north", "A");
    a.national_id = Some("1".into());
    let mut b = patient("south", "B");
    b.national_id = Some("1".into());

    let out = Detector::default().detect(&[a, b], &DetectionScope::default(), Utc::now());
    assert!(out.is_empty());
  }

  #[test]
  fn detector_respects_scope() {
    let mut records = Vec::new();
    for tenant in ["north", "south"] {
      for name in ["A", "B"] {
        let mut p = patient(tenant, name);
        p.national_id = Some("1".into());
        records.push(p);
      }
    }

    let north = Detector::default().detect(&records, &DetectionScope::tenant("north"), Utc::now());
    assert_eq!(north.len(), 1);
    assert!(north[0].pair.contains(records[0].patient_id));

    let only = DetectionScope { tenant_id: None, patient_ids: vec![records[3].patient_id] };
    let touching = Detector::default().detect(&records, &only, Utc::now());
    assert_eq!(touching.len(), 1);
    assert!(touching[0].pair.contains(records[3].patient_id));
  }

  #[test]
  fn detector_is_idempotent() {
    let mut records = Vec::new();
    for i in 0..6 {
      let mut p = patient("c", "Joana Prado");
      p.birth_date = dob(1975, 1, 2);
      p.national_id = Some(format!("{}", i % 2));
      records.push(p);
    }
    let at = Utc::now();
    let d = Detector::default();
    assert_eq!(
      d.detect(&records, &DetectionScope::default(), at),
      d.detect(&records, &DetectionScope::default(), at)
    );
  }
}
