//! Metric names emitted by the gate
//!
//! Recorded through the `metrics` facade; installing an exporter is up to
//! the binary.

use metrics::describe_counter;

pub const ELIGIBILITY_GRANTED: &str = "gate.eligibility.granted";
pub const ELIGIBILITY_DENIED: &str = "gate.eligibility.denied";
pub const ELIGIBILITY_GRACE: &str = "gate.eligibility.grace";
pub const ORACLE_FAILURES: &str = "gate.oracle.failures";
pub const CONTENT_REGISTERED: &str = "registry.content.registered";
pub const CONTENT_REMOVED: &str = "registry.content.removed";
pub const MIRROR_CLEANUP_FAILED: &str = "registry.mirror.cleanup_failed";

/// Initialize metrics with descriptions
pub fn init_metrics() {
    describe_counter!(ELIGIBILITY_GRANTED, "Eligibility checks that granted access");
    describe_counter!(ELIGIBILITY_DENIED, "Eligibility checks that denied access");
    describe_counter!(ELIGIBILITY_GRACE, "Groups satisfied through a pending join request");
    describe_counter!(ORACLE_FAILURES, "Membership oracle calls that failed or timed out");
    describe_counter!(CONTENT_REGISTERED, "Content records registered");
    describe_counter!(CONTENT_REMOVED, "Content records removed");
    describe_counter!(MIRROR_CLEANUP_FAILED, "Mirror deletions that failed after removal");
}
