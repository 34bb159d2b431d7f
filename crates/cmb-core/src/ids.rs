//! Id generation helpers.

use uuid::Uuid;

/// Mint a fresh opaque request id, unique within this process (spec §3:
/// "opaque string, globally unique within a process").
#[must_use]
pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}
