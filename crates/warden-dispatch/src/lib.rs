//! Dispatch-boundary hooks: pre-execution checks, the audit trigger, the
//! dispatch error classifier, and the connect-time channel bootstrap.

pub mod channel_bootstrap;
pub mod command_guard;
pub mod diagnostics;
pub mod dispatch_error;
pub mod error_classifier;

pub use channel_bootstrap::*;
pub use command_guard::*;
pub use diagnostics::*;
pub use dispatch_error::*;
pub use error_classifier::*;
