//! Shared error taxonomy, payload values, codecs and canonical encoding helpers.

pub mod canonical;
pub mod codec;
pub mod errors;
pub mod rng;
pub mod value;

pub use canonical::{
    from_json_slice, from_message_bytes, stable_hash_string, to_canonical_json_bytes,
    to_message_bytes,
};
pub use codec::{Codec, CodecRegistry, SerdeCodec};
pub use errors::{ErrorInfo, TrajError};
pub use rng::{derive_run_seed, RunRng};
pub use value::{Table, Value, ValueKind};
