#![deny(missing_docs)]
#![doc = "Core data types for the keg formula engine: the formula model, catalogs, digests and the shared error taxonomy."]

pub mod catalog;
pub mod digest;
pub mod errors;
pub mod formula;

pub use catalog::Catalog;
pub use digest::{Digest, DigestAlgorithm};
pub use errors::{storage_error, ErrorInfo, KegError};
pub use formula::{escapes_root, BuildStep, Formula, InstallDirective, MatchKind, TestStep};
