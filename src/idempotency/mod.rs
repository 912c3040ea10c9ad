//! Idempotency module
//!
//! Prevents duplicate application of the same logical operation using
//! caller-supplied idempotency keys (bank trace ids, payment authorities).

mod key;

pub use key::{request_fingerprint, IdempotencyKey, MAX_KEY_LEN};
