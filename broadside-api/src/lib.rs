//! HTTP endpoints for previewing audiences and sending campaigns
//!
//! # Endpoints
//!
//! - **`GET /api/campaigns`**, **`GET /api/campaigns/list`** - Stored campaigns (always empty)
//! - **`GET /api/campaigns/audience`** - Recipients matching the query filters
//! - **`POST /api/campaigns/send`** - Personalise and send a campaign, then report the outcome
//!
//! Every response is JSON with a `success` flag. Failures carry an `error`
//! message instead of data.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use broadside_api::{ApiConfig, ApiServer, AppState, MemoryAudience};
//! use broadside_dispatch::{Campaign, DispatchConfig, transport::{SmtpConfig, SmtpTransport}};
//!
//! # async fn example(smtp: &SmtpConfig) -> Result<(), Box<dyn std::error::Error>> {
//! let transport = SmtpTransport::new(smtp)?;
//! let campaign = Campaign::new(DispatchConfig::default(), Arc::new(transport))?;
//! let audience = MemoryAudience::from_file("audience.ron")?;
//!
//! let state = AppState::new(campaign, Arc::new(audience));
//! let server = ApiServer::new(&ApiConfig::default(), state).await?;
//!
//! // server.serve(shutdown_receiver).await?;
//! # Ok(())
//! # }
//! ```

mod audience;
mod config;
mod error;
mod server;

pub use audience::{AudienceFilter, AudienceKind, AudienceSource, MemoryAudience, Selection};
pub use config::ApiConfig;
pub use error::{ApiError, AudienceError, HandlerError};
pub use server::{ApiServer, AppState, router};
