//! Registered codecs for opaque [`Value::Blob`] payloads.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};

use crate::errors::{ErrorInfo, TrajError};
use crate::value::Value;

/// Validation hook for a blob type tag.
pub trait Codec: Send + Sync {
    /// Tag stored next to the encoded bytes.
    fn tag(&self) -> &str;

    /// Confirms that `bytes` decode under this codec.
    fn check(&self, bytes: &[u8]) -> Result<(), TrajError>;
}

/// Bincode codec for any serde type.
pub struct SerdeCodec<T> {
    tag: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SerdeCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            _marker: PhantomData,
        }
    }

    /// Wraps `value` into a tagged blob.
    pub fn encode(&self, value: &T) -> Result<Value, TrajError> {
        let bytes = bincode::serialize(value).map_err(|err| {
            TrajError::Serde(
                ErrorInfo::new("codec-encode", err.to_string()).with_context("tag", &self.tag),
            )
        })?;
        Ok(Value::Blob {
            tag: self.tag.clone(),
            bytes,
        })
    }

    /// Restores a value previously produced by [`SerdeCodec::encode`].
    pub fn decode(&self, value: &Value) -> Result<T, TrajError> {
        match value {
            Value::Blob { tag, bytes } if tag == &self.tag => {
                bincode::deserialize(bytes).map_err(|err| {
                    TrajError::Serde(
                        ErrorInfo::new("codec-decode", err.to_string())
                            .with_context("tag", tag.clone()),
                    )
                })
            }
            other => Err(TrajError::Serde(
                ErrorInfo::new("codec-tag-mismatch", "value is not a blob of this codec")
                    .with_context("expected", &self.tag)
                    .with_context("actual", other.kind().to_string()),
            )),
        }
    }
}

impl<T> Codec for SerdeCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    fn tag(&self) -> &str {
        &self.tag
    }

    fn check(&self, bytes: &[u8]) -> Result<(), TrajError> {
        bincode::deserialize::<T>(bytes).map(|_| ()).map_err(|err| {
            TrajError::Serde(
                ErrorInfo::new("codec-check", err.to_string()).with_context("tag", &self.tag),
            )
        })
    }
}

/// Tag to codec lookup consulted before any blob is committed.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    codecs: BTreeMap<String, Arc<dyn Codec>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a codec; a second codec under the same tag is rejected.
    pub fn register(&mut self, codec: Arc<dyn Codec>) -> Result<(), TrajError> {
        let tag = codec.tag().to_string();
        if self.codecs.contains_key(&tag) {
            return Err(TrajError::NameCollision(
                ErrorInfo::new("codec-duplicate", "codec tag already registered")
                    .with_context("tag", tag),
            ));
        }
        self.codecs.insert(tag, codec);
        Ok(())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.codecs.contains_key(tag)
    }

    /// Walks `value` and checks every nested blob against its codec.
    pub fn validate(&self, value: &Value) -> Result<(), TrajError> {
        match value {
            Value::Blob { tag, bytes } => {
                let codec = self.codecs.get(tag).ok_or_else(|| {
                    TrajError::Serde(
                        ErrorInfo::new("codec-unknown", "no codec registered for blob tag")
                            .with_context("tag", tag.clone())
                            .with_hint("register the codec on the storage service"),
                    )
                })?;
                codec.check(bytes)
            }
            Value::List(values) => values.iter().try_for_each(|item| self.validate(item)),
            Value::Table(table) => table
                .rows()
                .iter()
                .flatten()
                .try_for_each(|item| self.validate(item)),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("tags", &self.codecs.keys().collect::<Vec<_>>())
            .finish()
    }
}
