//! Result aggregation

use serde::{Deserialize, Serialize};

use crate::job::DispatchResult;

/// Failure reasons kept per campaign unless configured otherwise.
pub const DEFAULT_SAMPLE_ERRORS: usize = 10;

/// One retained failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleError {
    pub email: String,
    pub error: String,
}

/// Summary of one campaign send. `sent + failed == total` always holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignOutcome {
    pub sent: usize,
    pub failed: usize,
    pub total: usize,
    /// The first failures in the order they appear in the input, at most
    /// `sample_limit` of them
    pub errors: Vec<SampleError>,
}

/// Count successes and failures and keep the first `sample_limit` failure
/// reasons verbatim.
///
/// Only call this once every result has resolved. Input order is not
/// assumed to match submission or completion order.
pub fn aggregate(results: &[DispatchResult], sample_limit: usize) -> CampaignOutcome {
    let mut outcome = CampaignOutcome {
        total: results.len(),
        ..CampaignOutcome::default()
    };

    for result in results {
        match &result.error {
            None => outcome.sent += 1,
            Some(failure) => {
                outcome.failed += 1;
                if outcome.errors.len() < sample_limit {
                    outcome.errors.push(SampleError {
                        email: result.recipient.to_string(),
                        error: failure.message.clone(),
                    });
                }
            }
        }
    }

    outcome
}
