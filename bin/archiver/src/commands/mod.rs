//! Contains subcommands for the archiver.

mod run;
pub use run::RunCommand;

mod verify;
pub use verify::{VerifyCommand, VerifyError, verify_range};
