//! Thin re-exports of `parking_lot`'s non-poisoning `Mutex`/`Condvar`.
//!
//! [`shutdown`] needs a `Condvar::wait_timeout_while` that hands back a held
//! guard rather than a `LockResult`, so plain `std::sync` primitives (which
//! force every caller to handle poisoning) don't fit; `parking_lot`'s do.

pub use parking_lot::{Condvar, Mutex};
