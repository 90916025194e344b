//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports from the [`secrecy`] crate. Use `SecretString` for any value
//! that must never reach logs: the Redis URL (may embed credentials), the
//! classifier API key, the voice-synthesis API key.
//!
//! `SecretString` implements `Debug` with redaction, so a struct that
//! derives `Debug` while holding one cannot leak it through `{:?}` or
//! tracing fields. Accessing the inner value requires an explicit
//! `expose_secret()` call, and the memory is zeroized on drop.

pub use secrecy::{ExposeSecret, SecretBox, SecretString};
