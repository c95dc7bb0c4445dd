//! Campaign email dispatch.
//!
//! This crate turns one campaign (a template plus an audience) into one
//! personalised email per recipient and pushes them through a
//! [`DispatchQueue`] that enforces:
//! - a ceiling on simultaneously in-flight sends (`max_concurrency`)
//! - a minimum spacing between consecutive send *starts* (`1 / throughput_per_second`)
//! - a bounded timeout on every individual send
//!
//! Per-recipient failures are data, not control flow: they are captured into
//! [`DispatchResult`]s and summarised by [`aggregate`] into a
//! [`CampaignOutcome`].
//!
//! Each campaign send builds its own queue. There is no process-wide rate
//! budget, so concurrent campaigns are not capped collectively.

mod address;
mod campaign;
mod config;
mod error;
mod job;
mod outcome;
pub mod personalize;
mod queue;
pub mod transport;

pub use address::EmailAddress;
pub use campaign::{Campaign, Recipient};
pub use config::{DispatchConfig, RetryPolicy};
pub use error::{AddressError, CampaignError, DispatchError, TemplateError};
pub use job::{DispatchResult, Job, Payload, SendFailure};
pub use outcome::{CampaignOutcome, DEFAULT_SAMPLE_ERRORS, SampleError, aggregate};
pub use personalize::CampaignTemplate;
pub use queue::{DispatchQueue, JobHandle};
pub use transport::{Transport, TransportError};
