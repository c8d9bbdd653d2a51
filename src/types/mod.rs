pub mod entitlement;

pub use entitlement::{EntitlementDecision, Principal, VerifyResponse};
