//! Input validation and ingestion normalization.
//!
//! The upload surface accepts either an explicit list of codes or a raw
//! text block (one code per line), or both. Everything funnels through
//! [`merge_candidates`] and [`screen_candidates`] before any row is staged
//! for insert.

use validator::Validate;

use crate::error::StockError;

/// Validate a request body, returning a StockError::Validation on failure.
pub fn validate_request<T: Validate>(body: &T) -> Result<(), StockError> {
    body.validate().map_err(|e| StockError::Validation {
        message: format_validation_errors(e),
    })
}

/// Format validation errors into a human-readable string.
fn format_validation_errors(errors: validator::ValidationErrors) -> String {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid value for '{field}'"))
            })
        })
        .collect::<Vec<_>>()
        .join("; ")
}

// ============================================================
// Ingestion normalization
// ============================================================

/// A candidate that survived screening, ready for encrypt-and-insert.
#[derive(Debug, Clone)]
pub struct StagedCode {
    pub code: String,
    pub hash: String,
}

/// Screening outcome for one upload batch. Cross-system duplicates are
/// resolved later against the store; these counters cover the batch itself.
#[derive(Debug, Default)]
pub struct ScreenedBatch {
    pub staged: Vec<StagedCode>,
    pub duplicates: usize,
    pub invalid: usize,
}

/// Merge an explicit code list with a normalized raw-text block.
///
/// Raw text is unified on line endings, each line trimmed, and blank lines
/// dropped. The explicit list is passed through untouched — empty entries
/// there are the uploader's mistake and are counted as invalid during
/// screening rather than silently stripped.
pub fn merge_candidates(codes: &[String], raw_text: Option<&str>) -> Vec<String> {
    let mut out: Vec<String> = codes.to_vec();
    if let Some(raw) = raw_text {
        let unified = raw.replace("\r\n", "\n").replace('\r', "\n");
        out.extend(
            unified
                .split('\n')
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_owned),
        );
    }
    out
}

/// Screen candidates: trim, length-check, hash, and drop in-batch repeats.
///
/// `hash` is the deterministic digest function (injected so screening stays
/// a pure function). Candidates that hash identically to an earlier one in
/// the same batch count as duplicates; empty or over-length candidates
/// count as invalid. Survivors are staged in input order, which later
/// becomes FIFO allocation order.
pub fn screen_candidates(
    candidates: Vec<String>,
    max_code_length: usize,
    hash: impl Fn(&str) -> String,
) -> ScreenedBatch {
    let mut batch = ScreenedBatch::default();
    let mut seen = std::collections::HashSet::new();

    for candidate in candidates {
        let code = candidate.trim();
        if code.is_empty() || code.chars().count() > max_code_length {
            batch.invalid += 1;
            continue;
        }
        let digest = hash(code);
        if !seen.insert(digest.clone()) {
            batch.duplicates += 1;
            continue;
        }
        batch.staged.push(StagedCode {
            code: code.to_owned(),
            hash: digest,
        });
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(s: &str) -> String {
        s.to_owned()
    }

    #[test]
    fn merge_unifies_line_endings_and_strips_blanks() {
        let merged = merge_candidates(&[], Some("A1\r\nB2\rC3\n\n  \nD4  "));
        assert_eq!(merged, vec!["A1", "B2", "C3", "D4"]);
    }

    #[test]
    fn merge_appends_raw_text_after_explicit_list() {
        let merged = merge_candidates(&["X1".into()], Some("Y2\nZ3"));
        assert_eq!(merged, vec!["X1", "Y2", "Z3"]);
    }

    #[test]
    fn merge_with_no_input_is_empty() {
        assert!(merge_candidates(&[], None).is_empty());
        assert!(merge_candidates(&[], Some("\n \n")).is_empty());
    }

    #[test]
    fn screening_counts_in_batch_duplicates() {
        let batch = screen_candidates(
            vec!["A1".into(), "A1".into(), "B2".into()],
            512,
            ident,
        );
        assert_eq!(batch.staged.len(), 2);
        assert_eq!(batch.duplicates, 1);
        assert_eq!(batch.invalid, 0);
    }

    #[test]
    fn screening_counts_empty_as_invalid() {
        let batch = screen_candidates(vec!["".into()], 512, ident);
        assert_eq!(batch.staged.len(), 0);
        assert_eq!(batch.duplicates, 0);
        assert_eq!(batch.invalid, 1);
    }

    #[test]
    fn screening_trims_before_hashing() {
        let batch = screen_candidates(vec!["  K-1  ".into(), "K-1".into()], 512, ident);
        assert_eq!(batch.staged.len(), 1);
        assert_eq!(batch.staged[0].code, "K-1");
        assert_eq!(batch.duplicates, 1);
    }

    #[test]
    fn screening_rejects_over_length_codes() {
        let long = "X".repeat(513);
        let batch = screen_candidates(vec![long, "OK".into()], 512, ident);
        assert_eq!(batch.staged.len(), 1);
        assert_eq!(batch.invalid, 1);
    }

    #[test]
    fn staged_order_preserves_input_order() {
        let batch = screen_candidates(
            vec!["C".into(), "A".into(), "B".into()],
            512,
            ident,
        );
        let codes: Vec<&str> = batch.staged.iter().map(|s| s.code.as_str()).collect();
        assert_eq!(codes, vec!["C", "A", "B"]);
    }
}
