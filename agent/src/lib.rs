pub mod error;
pub mod http;
pub mod netatmo;
pub mod run;
pub mod unifi;

pub use error::{Error, Result};
pub use run::{run, RunOutcome};
