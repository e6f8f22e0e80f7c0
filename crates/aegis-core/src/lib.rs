// Aegis core types shared by the audit, provenance and quorum engines.
pub mod error;
pub mod value;

pub use error::{TrustError, TrustErrorKind, TrustResult};
pub use value::{Payload, Scalar};
