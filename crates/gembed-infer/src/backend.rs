//! Embedding backend seam.
//!
//! The `EmbeddingBackend` trait is the one call the bridge makes into the
//! embedding engine: borrowed text views in, an owned batch out. Implementations:
//! - `LinkedBackend`: the C ABI of `libgembed` (requires the `ffi` feature)
//! - `UnavailableBackend`: fails every call, used when no engine is linked

use std::fmt;
use std::marker::PhantomData;

use ndarray::ArrayView2;
use thiserror::Error;

use crate::registry::{MethodId, ModelId};

/// Borrowed view over caller-owned text bytes, laid out as `{ptr, len}`.
///
/// The lifetime ties the view to its source buffer, so a slice can never
/// outlive the string it points into.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct TextSlice<'a> {
    ptr: *const u8,
    len: usize,
    _source: PhantomData<&'a [u8]>,
}

impl<'a> TextSlice<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            ptr: bytes.as_ptr(),
            len: bytes.len(),
            _source: PhantomData,
        }
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        // SAFETY: ptr/len were taken from a `&'a [u8]` in `new` and the
        // PhantomData keeps that borrow alive for 'a.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for TextSlice<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TextSlice")
            .field(&String::from_utf8_lossy(self.as_bytes()))
            .finish()
    }
}

/// Storage behind an [`EmbeddingBatch`]. Dropping it releases the values.
pub trait BatchBuffer: Send {
    fn values(&self) -> &[f32];
}

impl BatchBuffer for Vec<f32> {
    fn values(&self) -> &[f32] {
        self
    }
}

/// Row-major matrix of `vector_count × dimension` floats produced by a backend.
///
/// The batch uniquely owns its buffer; the buffer is released exactly once,
/// when the batch is dropped.
pub struct EmbeddingBatch {
    buffer: Box<dyn BatchBuffer>,
    vector_count: usize,
    dimension: usize,
}

impl EmbeddingBatch {
    pub fn new(buffer: impl BatchBuffer + 'static, vector_count: usize, dimension: usize) -> Self {
        Self {
            buffer: Box::new(buffer),
            vector_count,
            dimension,
        }
    }

    pub fn from_vec(values: Vec<f32>, vector_count: usize, dimension: usize) -> Self {
        Self::new(values, vector_count, dimension)
    }

    pub fn vector_count(&self) -> usize {
        self.vector_count
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn values(&self) -> &[f32] {
        self.buffer.values()
    }

    /// Matrix view, or `None` when the value count is not `vector_count × dimension`.
    pub fn view(&self) -> Option<ArrayView2<'_, f32>> {
        if !self.is_well_formed() {
            return None;
        }
        ArrayView2::from_shape((self.vector_count, self.dimension), self.values()).ok()
    }

    pub fn is_well_formed(&self) -> bool {
        self.vector_count.checked_mul(self.dimension) == Some(self.values().len())
    }
}

impl fmt::Debug for EmbeddingBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingBatch")
            .field("vector_count", &self.vector_count)
            .field("dimension", &self.dimension)
            .field("values", &self.values().len())
            .finish()
    }
}

/// Failure reported by a backend call.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("backend returned status {0}")]
    Status(i32),

    #[error("{0}")]
    Failed(String),

    #[error("no embedding backend linked")]
    Unavailable,
}

/// Trait for embedding backends.
///
/// One call per request: every input is embedded together and the batch
/// holds one vector per input, in input order. Calls may arrive concurrently
/// from independent SQL connections.
pub trait EmbeddingBackend: Send + Sync {
    fn generate(
        &self,
        method: MethodId,
        model: ModelId,
        inputs: &[TextSlice<'_>],
    ) -> Result<EmbeddingBatch, BackendError>;
}

/// Backend used when no engine is linked; every call fails.
pub struct UnavailableBackend;

impl EmbeddingBackend for UnavailableBackend {
    fn generate(
        &self,
        _method: MethodId,
        _model: ModelId,
        _inputs: &[TextSlice<'_>],
    ) -> Result<EmbeddingBatch, BackendError> {
        Err(BackendError::Unavailable)
    }
}
