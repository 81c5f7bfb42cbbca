//! gembed infer: method/model registry and the embedding backend seam.
//!
//! Provides the `EmbeddingBackend` trait the SQL functions call into.
//! When the `ffi` feature is enabled, `LinkedBackend` calls the statically
//! linked `libgembed` engine. Without it, `UnavailableBackend` is used and
//! every embedding call fails with a backend error.

pub mod backend;
pub mod ffi;
pub mod invoke;
pub mod registry;

pub use backend::{
    BackendError, BatchBuffer, EmbeddingBackend, EmbeddingBatch, TextSlice, UnavailableBackend,
};
pub use invoke::invoke;
pub use registry::{IdResolver, MethodId, MethodInfo, Modality, ModelId, ModelInfo, Registry};

#[cfg(feature = "ffi")]
pub use ffi::{EngineIds, LinkedBackend};

use std::sync::Arc;

/// Create the best available backend.
///
/// Uses the linked engine when the `ffi` feature is enabled and the engine
/// agrees with the builtin registry on every id; otherwise falls back to
/// `UnavailableBackend`.
pub fn create_backend() -> Arc<dyn EmbeddingBackend> {
    #[cfg(feature = "ffi")]
    {
        match Registry::builtin().verify_against(&EngineIds) {
            Ok(()) => {
                tracing::info!("Using linked gembed engine");
                return Arc::new(LinkedBackend);
            }
            Err(e) => {
                tracing::error!("Linked gembed engine rejected: {}", e);
            }
        }
    }

    #[cfg(not(feature = "ffi"))]
    {
        tracing::warn!("ffi feature disabled. Embedding calls will fail.");
    }

    Arc::new(UnavailableBackend)
}

#[cfg(all(test, not(feature = "ffi")))]
mod tests {
    use super::*;

    #[test]
    fn test_create_backend_without_engine_fails_calls() {
        let backend = create_backend();
        let registry = Registry::builtin();
        let method = registry.resolve_method("remote").unwrap();
        let model = registry.resolve_model(method, "default", Modality::Text).unwrap();

        let err = invoke(backend.as_ref(), method, model, &["text"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Embedding generation failed: no embedding backend linked"
        );
    }
}
