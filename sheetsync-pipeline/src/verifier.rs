//! Batch verification of table rows against the oracle.
//!
//! Rows are checked in fixed-size batches. Calls inside a batch run
//! concurrently; batches run one after another, so at most `batch_size`
//! oracle calls are ever in flight.

use futures_util::future::join_all;
use sheetsync_core::{cell, Row, VerificationOracle, VerificationOutcome};
use std::sync::Arc;

/// Verifies the address column of a table's data rows.
#[derive(Clone)]
pub struct BatchVerifier {
    oracle: Arc<dyn VerificationOracle>,
    batch_size: usize,
}

impl BatchVerifier {
    pub fn new(oracle: Arc<dyn VerificationOracle>, batch_size: usize) -> Self {
        Self {
            oracle,
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Verify every row whose address cell is non-blank.
    ///
    /// `rows` are data rows (header removed). Each outcome carries the row's
    /// index in `rows`. Rows with a blank or missing address produce no
    /// outcome at all.
    pub async fn verify(&self, rows: &[Row], email_index: usize) -> Vec<VerificationOutcome> {
        let candidates: Vec<(usize, &Row, &str)> = rows
            .iter()
            .enumerate()
            .filter_map(|(index, row)| {
                let address = cell(row, email_index).trim();
                (!address.is_empty()).then_some((index, row, address))
            })
            .collect();

        let skipped = rows.len() - candidates.len();
        if skipped > 0 {
            tracing::debug!(skipped, "Skipping rows without an address");
        }

        let mut outcomes = Vec::with_capacity(candidates.len());
        for (batch, chunk) in candidates.chunks(self.batch_size).enumerate() {
            let verdicts = join_all(
                chunk
                    .iter()
                    .map(|(_, _, address)| self.oracle.verify(address)),
            )
            .await;

            tracing::debug!(batch, rows = chunk.len(), "Batch verified");

            outcomes.extend(chunk.iter().zip(verdicts).map(|((index, row, _), verdict)| {
                VerificationOutcome {
                    index: *index,
                    row: (*row).clone(),
                    verdict,
                }
            }));
        }

        outcomes
    }
}

impl std::fmt::Debug for BatchVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchVerifier")
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetsync_core::Verdict;
    use sheetsync_test_utils::{grid, ScriptedOracle};
    use std::time::Duration;

    #[tokio::test]
    async fn test_outcomes_keep_original_index() {
        let oracle = Arc::new(
            ScriptedOracle::new()
                .with_verdict("a@x.com", Verdict::Exists)
                .with_verdict("b@x.com", Verdict::NotExists),
        );
        let verifier = BatchVerifier::new(oracle.clone(), 100);
        let rows = grid(&[&["A", "a@x.com"], &["B", ""], &["C", "b@x.com"]]);

        let outcomes = verifier.verify(&rows, 1).await;

        let summary: Vec<(usize, Verdict)> =
            outcomes.iter().map(|o| (o.index, o.verdict)).collect();
        assert_eq!(summary, vec![(0, Verdict::Exists), (2, Verdict::NotExists)]);
        assert_eq!(outcomes[1].row, rows[2]);
        assert_eq!(oracle.call_count(), 2);
    }

    #[tokio::test]
    async fn test_blank_and_short_rows_skipped() {
        let oracle = Arc::new(ScriptedOracle::new().with_default(Verdict::Exists));
        let verifier = BatchVerifier::new(oracle.clone(), 10);
        let rows = grid(&[&["A"], &["B", "   "], &["C", " c@x.com "]]);

        let outcomes = verifier.verify(&rows, 1).await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].index, 2);
        assert_eq!(oracle.calls(), vec!["c@x.com".to_string()]);
    }

    #[tokio::test]
    async fn test_batch_isolation() {
        let oracle = Arc::new(
            ScriptedOracle::new()
                .with_default(Verdict::NotExists)
                .with_verdict("flaky@x.com", Verdict::Indeterminate),
        );
        let verifier = BatchVerifier::new(oracle, 4);
        let rows = grid(&[
            &["1", "a@x.com"],
            &["2", "flaky@x.com"],
            &["3", "c@x.com"],
            &["4", "d@x.com"],
        ]);

        let outcomes = verifier.verify(&rows, 1).await;

        let indeterminate = outcomes
            .iter()
            .filter(|o| o.verdict == Verdict::Indeterminate)
            .count();
        assert_eq!(outcomes.len(), 4);
        assert_eq!(indeterminate, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_bounded_by_batch_size() {
        let mut oracle = ScriptedOracle::new().with_default(Verdict::Exists);
        let mut rows = Vec::new();
        for i in 0..7 {
            let address = format!("u{}@x.com", i);
            oracle = oracle.with_delay(address.clone(), Duration::from_millis(50));
            rows.push(vec![i.to_string(), address]);
        }
        let oracle = Arc::new(oracle);
        let verifier = BatchVerifier::new(oracle.clone(), 3);

        let outcomes = verifier.verify(&rows, 1).await;

        assert_eq!(outcomes.len(), 7);
        assert_eq!(oracle.max_in_flight(), 3);
    }

    #[test]
    fn test_zero_batch_size_clamped() {
        let verifier = BatchVerifier::new(Arc::new(ScriptedOracle::new()), 0);
        assert_eq!(verifier.batch_size(), 1);
    }
}
