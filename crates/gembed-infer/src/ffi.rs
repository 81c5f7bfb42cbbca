//! C ABI of the linked `libgembed` embedding engine. Requires the `ffi` feature.

#[cfg(feature = "ffi")]
mod inner {
    use std::ffi::CString;
    use std::os::raw::{c_char, c_int};

    use tracing::debug;

    use crate::backend::{BackendError, BatchBuffer, EmbeddingBackend, EmbeddingBatch, TextSlice};
    use crate::registry::{IdResolver, MethodId, Modality, ModelId};

    /// Out-parameter filled by `generate_embeddings_from_texts`.
    #[repr(C)]
    struct RawBatch {
        data: *mut f32,
        n_vectors: usize,
        dim: usize,
    }

    #[link(name = "gembed")]
    extern "C" {
        fn validate_embedding_method(method: *const c_char) -> c_int;

        fn validate_embedding_model(method_id: c_int, model: *const c_char, input_type: c_int)
            -> c_int;

        fn generate_embeddings_from_texts(
            method_id: c_int,
            model_id: c_int,
            inputs: *const TextSlice<'static>,
            n_inputs: usize,
            out_batch: *mut RawBatch,
        ) -> c_int;

        fn free_embedding_batch(batch: *mut RawBatch);
    }

    /// The engine's own name-to-id validators; negative ids mean "not found".
    pub struct EngineIds;

    impl IdResolver for EngineIds {
        fn method_id(&self, name: &str) -> Option<i32> {
            let name = CString::new(name).ok()?;
            // SAFETY: `name` is a NUL-terminated string alive for the call.
            let id = unsafe { validate_embedding_method(name.as_ptr()) };
            (id >= 0).then_some(id)
        }

        fn model_id(&self, method_id: i32, name: &str, modality: Modality) -> Option<i32> {
            let name = CString::new(name).ok()?;
            // SAFETY: as above; `Modality` discriminants match the engine's input types.
            let id =
                unsafe { validate_embedding_model(method_id, name.as_ptr(), modality as c_int) };
            (id >= 0).then_some(id)
        }
    }

    /// Batch memory owned by the engine, released through `free_embedding_batch` on drop.
    struct ForeignBatch {
        raw: RawBatch,
    }

    // SAFETY: the engine's allocation is exclusively owned by this guard and
    // `free_embedding_batch` may be called from any thread.
    unsafe impl Send for ForeignBatch {}

    impl BatchBuffer for ForeignBatch {
        fn values(&self) -> &[f32] {
            let len = self.raw.n_vectors.checked_mul(self.raw.dim);
            match len {
                Some(len) if !self.raw.data.is_null() => {
                    // SAFETY: on success the engine hands over `n_vectors * dim`
                    // contiguous floats that stay valid until freed in `drop`.
                    unsafe { std::slice::from_raw_parts(self.raw.data, len) }
                }
                _ => &[],
            }
        }
    }

    impl Drop for ForeignBatch {
        fn drop(&mut self) {
            // SAFETY: `raw` was zero-initialised before the call and only ever
            // filled by the engine; this is the single release of it.
            unsafe { free_embedding_batch(&mut self.raw) };
        }
    }

    /// Backend backed by the statically linked embedding engine.
    pub struct LinkedBackend;

    impl EmbeddingBackend for LinkedBackend {
        fn generate(
            &self,
            method: MethodId,
            model: ModelId,
            inputs: &[TextSlice<'_>],
        ) -> Result<EmbeddingBatch, BackendError> {
            let mut raw = RawBatch {
                data: std::ptr::null_mut(),
                n_vectors: 0,
                dim: 0,
            };

            // SAFETY: `inputs` outlives the call and `TextSlice` matches the
            // engine's `StringSlice` layout.
            let status = unsafe {
                generate_embeddings_from_texts(
                    method.raw(),
                    model.raw(),
                    inputs.as_ptr().cast(),
                    inputs.len(),
                    &mut raw,
                )
            };

            // Wrapped before inspecting the status so a failed call is still released.
            let foreign = ForeignBatch { raw };
            if status != 0 {
                debug!(status, "engine call failed");
                return Err(BackendError::Status(status));
            }

            let (n_vectors, dim) = (foreign.raw.n_vectors, foreign.raw.dim);
            Ok(EmbeddingBatch::new(foreign, n_vectors, dim))
        }
    }
}

#[cfg(feature = "ffi")]
pub use inner::{EngineIds, LinkedBackend};
