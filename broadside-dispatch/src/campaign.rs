//! One campaign send: validate, personalise, dispatch, summarise.

use std::sync::Arc;

use broadside_common::{
    internal,
    tracing::{debug, info},
};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};

use crate::{
    address::EmailAddress,
    config::DispatchConfig,
    error::{CampaignError, DispatchError},
    job::{DispatchResult, Job},
    outcome::{CampaignOutcome, aggregate},
    personalize::{CampaignTemplate, Fields},
    queue::DispatchQueue,
    transport::Transport,
};

/// A CRM contact as handed over by the audience source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Recipient {
    pub id: i64,
    pub name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub business_name: Option<String>,
    pub phone: Option<String>,
    pub industry: Option<String>,
    pub business_type: Option<String>,
    pub source: Option<String>,
    pub interest: Option<String>,
    pub status: Option<String>,
}

impl Recipient {
    /// The recipient's address, if it is present and valid.
    pub fn address(&self) -> Option<EmailAddress> {
        self.email
            .as_deref()
            .and_then(|email| EmailAddress::parse(email).ok())
    }

    /// Placeholder values for this recipient. `company` falls back to the
    /// business name.
    pub fn fields(&self) -> Fields {
        let company = self.company.as_ref().or(self.business_name.as_ref());

        [
            ("name", self.name.as_ref()),
            ("email", self.email.as_ref()),
            ("company", company),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.cloned().unwrap_or_default()))
        .collect()
    }
}

/// Sends campaigns through a fresh [`DispatchQueue`] per call.
pub struct Campaign {
    config: DispatchConfig,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for Campaign {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Campaign")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Campaign {
    /// # Errors
    ///
    /// Returns [`DispatchError::Configuration`] if `config` cannot drive a
    /// queue.
    pub fn new(config: DispatchConfig, transport: Arc<dyn Transport>) -> Result<Self, DispatchError> {
        config.validate()?;
        Ok(Self { config, transport })
    }

    pub const fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Personalise `template` for every recipient with a valid address and
    /// send it.
    ///
    /// Recipients without a usable address are skipped before dispatch.
    /// Send failures are reported in the outcome, never as an error.
    ///
    /// # Errors
    ///
    /// Validation errors when the template is incomplete or malformed or no
    /// recipient has a valid address; [`CampaignError::Dispatch`] when the
    /// queue itself breaks.
    pub async fn send(
        &self,
        template: &CampaignTemplate,
        recipients: &[Recipient],
    ) -> Result<CampaignOutcome, CampaignError> {
        template.validate()?;

        let jobs: Vec<Job> = recipients
            .iter()
            .filter_map(|recipient| {
                recipient
                    .address()
                    .map(|address| Job::new(address, template.personalize(&recipient.fields())))
            })
            .collect();

        if jobs.is_empty() {
            return Err(CampaignError::NoRecipients);
        }

        info!(
            recipients = jobs.len(),
            skipped = recipients.len() - jobs.len(),
            max_concurrency = self.config.max_concurrency,
            throughput_per_second = self.config.throughput_per_second,
            "Sending campaign"
        );

        let mut results = self.dispatch(&jobs).await?;
        let mut attempts = 1;

        while self.config.retry.should_retry(attempts) {
            let retry: Vec<usize> = results
                .iter()
                .enumerate()
                .filter(|(_, result)| result.is_temporary_failure())
                .map(|(index, _)| index)
                .collect();

            if retry.is_empty() {
                break;
            }

            attempts += 1;
            internal!(
                level = INFO,
                count = retry.len(),
                attempt = attempts,
                delay_secs = self.config.retry.pass_delay_secs,
                "Retrying temporary failures"
            );
            tokio::time::sleep(self.config.retry.pass_delay()).await;

            let batch: Vec<Job> = retry.iter().map(|&index| jobs[index].clone()).collect();
            let retried = self.dispatch(&batch).await?;

            for (index, result) in retry.into_iter().zip(retried) {
                results[index] = result;
            }
        }

        Ok(aggregate(&results, self.config.sample_errors))
    }

    /// One pass through a new queue. Results come back in submission order.
    async fn dispatch(&self, jobs: &[Job]) -> Result<Vec<DispatchResult>, DispatchError> {
        let queue = DispatchQueue::new(&self.config, Arc::clone(&self.transport))?;

        let handles: Vec<_> = jobs.iter().cloned().map(|job| queue.submit(job)).collect();
        let pass = queue.drain().await?;

        debug!(
            sent = pass.sent,
            failed = pass.failed,
            total = pass.total,
            "Dispatch pass complete"
        );

        Ok(join_all(handles).await)
    }
}
