//! Local document storage: validation, file naming, and request pacing.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use paperbot_core::download::{DocumentValidator, SaveOutcome};
//!
//! # async fn example(bytes: Vec<u8>) -> Result<(), Box<dyn std::error::Error>> {
//! let validator = DocumentValidator::new(1024);
//! match validator.save(Path::new("./papers/Smith2020Dee.pdf"), &bytes).await? {
//!     SaveOutcome::Accepted { path, bytes } => println!("saved {} ({bytes} bytes)", path.display()),
//!     SaveOutcome::Rejected(reason) => println!("rejected: {reason}"),
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod filename;
pub mod rate_limiter;
mod validator;

pub use error::DownloadError;
pub use filename::{document_file_name, sanitize_filename_component, unique_destination};
pub use rate_limiter::{RateLimiter, extract_domain, parse_retry_after};
pub use validator::{DocumentValidator, RejectReason, SaveOutcome, looks_like_html};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
