//! Serialization pipeline.
//!
//! Typed keys and values are turned into byte spans by pluggable
//! [`Serializer`] capabilities. The pipeline owns a per-thread pair of
//! reusable scratch buffers so that the hot produce path performs no heap
//! allocation: a serializer writes into the scratch buffer (or returns a
//! borrow of the value itself) and the resulting span is consumed by the
//! transport before the buffer is touched again.
//!
//! An absent payload (`Ok(None)`) is distinct from an empty one
//! (`Ok(Some(&[]))`); the transport encodes the two differently.

use async_trait::async_trait;
use bytes::Bytes;
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;
use weir_core::Headers;

/// Initial capacity of a thread's scratch buffers, allocated on first use.
const DEFAULT_SCRATCH_CAPACITY: usize = 64 * 1024;

// ============================================================================
// Context
// ============================================================================

/// Whether a serializer is producing the record key or the record value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Key,
    Value,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentKind::Key => f.write_str("key"),
            ComponentKind::Value => f.write_str("value"),
        }
    }
}

/// Context handed to every serialize call.
///
/// Headers are included because wire formats may encode schema information
/// into them (schema-registry style framing).
#[derive(Debug, Clone, Copy)]
pub struct SerializationContext<'a> {
    pub kind: ComponentKind,
    pub topic: &'a str,
    pub headers: Option<&'a Headers>,
}

impl<'a> SerializationContext<'a> {
    pub fn new(kind: ComponentKind, topic: &'a str, headers: Option<&'a Headers>) -> Self {
        Self {
            kind,
            topic,
            headers,
        }
    }
}

// ============================================================================
// Capability traits
// ============================================================================

/// Converts a typed value into a byte span.
///
/// `scratch` is cleared by the pipeline before the call. An implementation
/// may either write into it and return a slice of it, or return a borrow of
/// the value itself (zero copy). Returning `Ok(None)` encodes an absent
/// payload, which is distinct from an empty one.
pub trait Serializer<T>: Send + Sync {
    fn serialize<'a>(
        &self,
        value: &'a T,
        ctx: SerializationContext<'_>,
        scratch: &'a mut Vec<u8>,
    ) -> anyhow::Result<Option<&'a [u8]>>;
}

impl<T, S: Serializer<T> + ?Sized> Serializer<T> for Arc<S> {
    fn serialize<'a>(
        &self,
        value: &'a T,
        ctx: SerializationContext<'_>,
        scratch: &'a mut Vec<u8>,
    ) -> anyhow::Result<Option<&'a [u8]>> {
        (**self).serialize(value, ctx, scratch)
    }
}

/// The asynchronous serializer capability, for implementations that need to
/// consult an external service (schema registries and the like). Returns an
/// owned buffer since the scratch-buffer contract cannot span an await.
#[async_trait]
pub trait AsyncSerializer<T>: Send + Sync {
    async fn serialize(
        &self,
        value: &T,
        ctx: SerializationContext<'_>,
    ) -> anyhow::Result<Option<Vec<u8>>>;
}

// ============================================================================
// Built-in serializers
// ============================================================================

/// Big-endian (network byte order) `i32`, 4 bytes.
pub struct Int32Serializer;

impl Serializer<i32> for Int32Serializer {
    fn serialize<'a>(
        &self,
        value: &'a i32,
        _ctx: SerializationContext<'_>,
        scratch: &'a mut Vec<u8>,
    ) -> anyhow::Result<Option<&'a [u8]>> {
        let start = scratch.len();
        scratch.extend_from_slice(&value.to_be_bytes());
        Ok(Some(&scratch[start..]))
    }
}

/// Big-endian (network byte order) `i64`, 8 bytes.
pub struct Int64Serializer;

impl Serializer<i64> for Int64Serializer {
    fn serialize<'a>(
        &self,
        value: &'a i64,
        _ctx: SerializationContext<'_>,
        scratch: &'a mut Vec<u8>,
    ) -> anyhow::Result<Option<&'a [u8]>> {
        let start = scratch.len();
        scratch.extend_from_slice(&value.to_be_bytes());
        Ok(Some(&scratch[start..]))
    }
}

/// Big-endian IEEE-754 `f32`, 4 bytes.
pub struct Float32Serializer;

impl Serializer<f32> for Float32Serializer {
    fn serialize<'a>(
        &self,
        value: &'a f32,
        _ctx: SerializationContext<'_>,
        scratch: &'a mut Vec<u8>,
    ) -> anyhow::Result<Option<&'a [u8]>> {
        let start = scratch.len();
        scratch.extend_from_slice(&value.to_be_bytes());
        Ok(Some(&scratch[start..]))
    }
}

/// Big-endian IEEE-754 `f64`, 8 bytes.
pub struct Float64Serializer;

impl Serializer<f64> for Float64Serializer {
    fn serialize<'a>(
        &self,
        value: &'a f64,
        _ctx: SerializationContext<'_>,
        scratch: &'a mut Vec<u8>,
    ) -> anyhow::Result<Option<&'a [u8]>> {
        let start = scratch.len();
        scratch.extend_from_slice(&value.to_be_bytes());
        Ok(Some(&scratch[start..]))
    }
}

/// UTF-8 string bytes, zero copy.
pub struct Utf8Serializer;

impl Serializer<String> for Utf8Serializer {
    fn serialize<'a>(
        &self,
        value: &'a String,
        _ctx: SerializationContext<'_>,
        _scratch: &'a mut Vec<u8>,
    ) -> anyhow::Result<Option<&'a [u8]>> {
        Ok(Some(value.as_bytes()))
    }
}

/// Raw byte pass-through, zero copy.
pub struct BytesSerializer;

impl Serializer<Vec<u8>> for BytesSerializer {
    fn serialize<'a>(
        &self,
        value: &'a Vec<u8>,
        _ctx: SerializationContext<'_>,
        _scratch: &'a mut Vec<u8>,
    ) -> anyhow::Result<Option<&'a [u8]>> {
        Ok(Some(value.as_slice()))
    }
}

impl Serializer<Bytes> for BytesSerializer {
    fn serialize<'a>(
        &self,
        value: &'a Bytes,
        _ctx: SerializationContext<'_>,
        _scratch: &'a mut Vec<u8>,
    ) -> anyhow::Result<Option<&'a [u8]>> {
        Ok(Some(value.as_ref()))
    }
}

/// Serializer for the unit type: always absent.
pub struct NullSerializer;

impl Serializer<()> for NullSerializer {
    fn serialize<'a>(
        &self,
        _value: &'a (),
        _ctx: SerializationContext<'_>,
        _scratch: &'a mut Vec<u8>,
    ) -> anyhow::Result<Option<&'a [u8]>> {
        Ok(None)
    }
}

/// Adapts a `Serializer<T>` to `Serializer<Option<T>>`: `None` becomes an
/// absent payload.
pub struct Nullable<S>(pub S);

impl<T, S: Serializer<T>> Serializer<Option<T>> for Nullable<S> {
    fn serialize<'a>(
        &self,
        value: &'a Option<T>,
        ctx: SerializationContext<'_>,
        scratch: &'a mut Vec<u8>,
    ) -> anyhow::Result<Option<&'a [u8]>> {
        match value {
            None => Ok(None),
            Some(inner) => self.0.serialize(inner, ctx, scratch),
        }
    }
}

// ============================================================================
// Default serializer resolution
// ============================================================================

/// Types with a built-in serializer the producer builder falls back to when
/// no serializer was configured for a role.
pub trait SerializeDefault: Sized {
    fn default_serializer() -> Arc<dyn Serializer<Self>>;
}

impl SerializeDefault for () {
    fn default_serializer() -> Arc<dyn Serializer<Self>> {
        Arc::new(NullSerializer)
    }
}

impl SerializeDefault for i32 {
    fn default_serializer() -> Arc<dyn Serializer<Self>> {
        Arc::new(Int32Serializer)
    }
}

impl SerializeDefault for i64 {
    fn default_serializer() -> Arc<dyn Serializer<Self>> {
        Arc::new(Int64Serializer)
    }
}

impl SerializeDefault for f32 {
    fn default_serializer() -> Arc<dyn Serializer<Self>> {
        Arc::new(Float32Serializer)
    }
}

impl SerializeDefault for f64 {
    fn default_serializer() -> Arc<dyn Serializer<Self>> {
        Arc::new(Float64Serializer)
    }
}

impl SerializeDefault for String {
    fn default_serializer() -> Arc<dyn Serializer<Self>> {
        Arc::new(Utf8Serializer)
    }
}

impl SerializeDefault for Vec<u8> {
    fn default_serializer() -> Arc<dyn Serializer<Self>> {
        Arc::new(BytesSerializer)
    }
}

impl SerializeDefault for Bytes {
    fn default_serializer() -> Arc<dyn Serializer<Self>> {
        Arc::new(BytesSerializer)
    }
}

impl<T: SerializeDefault + Send + Sync + 'static> SerializeDefault for Option<T> {
    fn default_serializer() -> Arc<dyn Serializer<Self>> {
        Arc::new(Nullable(T::default_serializer()))
    }
}

// ============================================================================
// Thread-affine scratch buffers
// ============================================================================

struct ScratchBuffers {
    key: Vec<u8>,
    value: Vec<u8>,
}

thread_local! {
    static SCRATCH: RefCell<ScratchBuffers> = const {
        RefCell::new(ScratchBuffers {
            key: Vec::new(),
            value: Vec::new(),
        })
    };
}

/// Runs `f` with this thread's (key, value) scratch buffers, cleared and
/// ready for writing. The buffers are lazily allocated on a thread's first
/// produce and reused for the thread's lifetime; everything written into
/// them must be consumed before `f` returns.
///
/// Not reentrant: a serializer must not produce on the same thread.
pub(crate) fn with_scratch<R>(f: impl FnOnce(&mut Vec<u8>, &mut Vec<u8>) -> R) -> R {
    SCRATCH.with(|cell| {
        let mut buffers = cell.borrow_mut();
        let ScratchBuffers { key, value } = &mut *buffers;
        if key.capacity() == 0 {
            key.reserve(DEFAULT_SCRATCH_CAPACITY);
        }
        if value.capacity() == 0 {
            value.reserve(DEFAULT_SCRATCH_CAPACITY);
        }
        key.clear();
        value.clear();
        f(key, value)
    })
}
