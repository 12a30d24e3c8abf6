pub mod clock;
mod error;
pub mod shutdown;
mod sync;
pub mod tracing_setup;

pub use crate::error::{prettify_failure, Error, ErrorKind, ResultExt};
pub use crate::sync::{Condvar, Mutex};
