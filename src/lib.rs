#![forbid(unsafe_code)]
//! mailprobe_lib — vérification d'adresses e-mail par sonde SMTP (MX + RCPT TO, sans envoi)

pub mod address;
pub mod batch;
pub mod config;
pub mod gate;
pub mod mx;
pub mod probe;
pub mod verdict;
pub mod verify;

pub use address::{AddressError, ParsedAddress, parse_address, split_address_list};
pub use batch::{BatchError, BatchRequest, BatchVerifier};
pub use config::{ConfigError, ConfigFile, VerifierConfig};
pub use gate::{AdmissionGate, FixedWindowLimiter, Quota, Rejection, Unlimited};
pub use mx::{DnsResolver, Error as MxError, LookupMx, MxRecord, resolve_primary};
pub use probe::{ProbeError, ProbeOptions, ProbeOutcome, SmtpProbe, SmtpProber, TlsPolicy};
pub use verdict::{VerdictKind, VerificationResult, classify_probe};
pub use verify::{BuildError, Verifier};
