//! Access-gated content registry
//!
//! Content is looked up by code and handed out only to users who belong to
//! every gating group, or who have a join request waiting for approval.
//! Membership is answered by an external [`oracle::MembershipOracle`]; groups,
//! pending requests and content live in SQLite.

pub mod approvals;
pub mod config;
pub mod directory;
pub mod eligibility;
pub mod error;
pub mod intake;
pub mod logging;
pub mod metrics;
pub mod oracle;
pub mod registry;
pub mod service;
pub mod storage;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;

pub use approvals::{EventEffect, MembershipEvent, PendingApprovalTracker};
pub use config::{Config, ConfigError};
pub use directory::{DirectoryError, GroupDirectory};
pub use eligibility::{EligibilityEngine, EligibilityReport, GroupOutcome};
pub use error::{ErrorKind, GateError, GateResult};
pub use intake::{IntakeError, IntakeSession, IntakeStep};
pub use logging::{init_logging, init_logging_with_config, LogConfig, LogLevel};
pub use oracle::{BotApiConfig, BotApiOracle, MembershipOracle, OracleError};
pub use registry::{ContentRegistry, RegistryError};
pub use service::{
    AccessPolicy, DeliveryOutcome, FetchOutcome, GateService, MirrorCleanup, RegisterOutcome,
    RemovalReport,
};
pub use storage::{SqlStore, StoreError};
pub use types::*;
