//! DNS MX resolution.
//!
//! [`resolve_primary`] normalises the domain via IDNA, queries the injected
//! [`LookupMx`] under an explicit deadline and returns the exchange with the
//! lowest preference value.

mod error;
mod resolver;
mod types;

pub use error::MxError as Error;
pub use resolver::{DnsResolver, LookupMx, resolve_primary};
pub use types::MxRecord;
