//! Test infrastructure for the namespace controller.
//!
//! Provides:
//! - [`FakeNorthbound`]: an in-memory northbound store implementing
//!   [`AddressSetFactory`](ovn_nb_common::AddressSetFactory) and
//!   [`PolicyStore`](ovn_nb_common::PolicyStore)
//! - A journal of every backend call, for idempotence assertions
//! - Failure and latency injection
//! - [`NbVerifier`]: assertion helpers over the fake's state

mod fake;
mod verification;

pub use fake::{FakeNorthbound, NbCall, NbOp};
pub use verification::{NbVerifier, VerificationError, VerifyResult};
