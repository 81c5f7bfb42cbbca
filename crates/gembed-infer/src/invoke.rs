//! Backend invocation: borrowed views over decoded inputs, one backend call,
//! and normalisation of the outcome.

use tracing::debug;

use gembed_core::{Error, Result};

use crate::backend::{EmbeddingBackend, EmbeddingBatch, TextSlice};
use crate::registry::{MethodId, ModelId};

/// Embed `inputs` with a single backend call.
///
/// The returned batch holds exactly one vector per input, in input order.
/// A backend failure, a vector count different from `inputs.len()`, a value
/// count that is not `vector_count × dimension`, or a non-finite value are
/// all reported as [`Error::Backend`]; the offending batch is released first.
pub fn invoke<T: AsRef<[u8]>>(
    backend: &dyn EmbeddingBackend,
    method: MethodId,
    model: ModelId,
    inputs: &[T],
) -> Result<EmbeddingBatch> {
    let slices: Vec<TextSlice<'_>> = inputs.iter().map(|s| TextSlice::new(s.as_ref())).collect();

    let batch = backend
        .generate(method, model, &slices)
        .map_err(|e| Error::Backend(e.to_string()))?;

    if let Err(reason) = check_batch(&batch, slices.len()) {
        drop(batch);
        return Err(Error::Backend(reason));
    }

    debug!(
        method = method.raw(),
        model = model.raw(),
        vectors = batch.vector_count(),
        dimension = batch.dimension(),
        "backend call succeeded"
    );
    Ok(batch)
}

fn check_batch(batch: &EmbeddingBatch, requested: usize) -> std::result::Result<(), String> {
    if batch.vector_count() != requested {
        return Err(format!(
            "backend returned {} vectors for {} inputs",
            batch.vector_count(),
            requested
        ));
    }
    if !batch.is_well_formed() {
        return Err(format!(
            "backend returned {} values for {} vectors of dimension {}",
            batch.values().len(),
            batch.vector_count(),
            batch.dimension()
        ));
    }
    if let Some(pos) = batch.values().iter().position(|v| !v.is_finite()) {
        return Err(format!("backend returned a non-finite value at index {pos}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use parking_lot::Mutex;

    use crate::backend::{BackendError, BatchBuffer};
    use crate::registry::{Modality, Registry};

    /// Buffer that tracks how many batches are still alive.
    struct Counted {
        values: Vec<f32>,
        live: Arc<AtomicUsize>,
    }

    impl BatchBuffer for Counted {
        fn values(&self) -> &[f32] {
            &self.values
        }
    }

    impl Drop for Counted {
        fn drop(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    enum Reply {
        PerInput { dimension: usize },
        Fixed { vectors: usize, dimension: usize, values: Vec<f32> },
        Fail,
    }

    struct ScriptedBackend {
        reply: Reply,
        live: Arc<AtomicUsize>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedBackend {
        fn new(reply: Reply) -> Self {
            Self {
                reply,
                live: Arc::new(AtomicUsize::new(0)),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn batch(&self, values: Vec<f32>, vectors: usize, dimension: usize) -> EmbeddingBatch {
            self.live.fetch_add(1, Ordering::SeqCst);
            let buffer = Counted {
                values,
                live: Arc::clone(&self.live),
            };
            EmbeddingBatch::new(buffer, vectors, dimension)
        }
    }

    impl EmbeddingBackend for ScriptedBackend {
        fn generate(
            &self,
            _method: MethodId,
            _model: ModelId,
            inputs: &[TextSlice<'_>],
        ) -> std::result::Result<EmbeddingBatch, BackendError> {
            self.calls.lock().push(
                inputs
                    .iter()
                    .map(|s| String::from_utf8_lossy(s.as_bytes()).into_owned())
                    .collect(),
            );
            match &self.reply {
                Reply::PerInput { dimension } => {
                    let values = (0..inputs.len() * dimension).map(|i| i as f32).collect();
                    Ok(self.batch(values, inputs.len(), *dimension))
                }
                Reply::Fixed {
                    vectors,
                    dimension,
                    values,
                } => Ok(self.batch(values.clone(), *vectors, *dimension)),
                Reply::Fail => Err(BackendError::Status(3)),
            }
        }
    }

    fn ids() -> (MethodId, ModelId) {
        let registry = Registry::builtin();
        let method = registry.resolve_method("fastembed").unwrap();
        let model = registry
            .resolve_model(method, "sentence-transformers/all-MiniLM-L6-v2", Modality::Text)
            .unwrap();
        (method, model)
    }

    #[test]
    fn test_single_call_preserves_order() {
        let backend = ScriptedBackend::new(Reply::PerInput { dimension: 3 });
        let (method, model) = ids();
        let inputs = vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()];

        let batch = invoke(&backend, method, model, &inputs).unwrap();
        assert_eq!(batch.vector_count(), 3);
        assert_eq!(batch.dimension(), 3);
        assert_eq!(*backend.calls.lock(), vec![vec!["a", "b", "c"]]);
        assert_eq!(backend.live.load(Ordering::SeqCst), 1);

        drop(batch);
        assert_eq!(backend.live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_count_mismatch_is_failure_and_released() {
        let backend = ScriptedBackend::new(Reply::Fixed {
            vectors: 1,
            dimension: 2,
            values: vec![0.5, 0.5],
        });
        let (method, model) = ids();

        let err = invoke(&backend, method, model, &["a", "b"]).unwrap_err();
        assert!(matches!(err, Error::Backend(ref m) if m.contains("1 vectors for 2 inputs")));
        assert_eq!(backend.live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_zero_vectors_is_mismatch() {
        let backend = ScriptedBackend::new(Reply::Fixed {
            vectors: 0,
            dimension: 0,
            values: Vec::new(),
        });
        let (method, model) = ids();

        assert!(matches!(
            invoke(&backend, method, model, &["only"]),
            Err(Error::Backend(_))
        ));
        assert_eq!(backend.live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_malformed_and_non_finite_rejected() {
        let (method, model) = ids();

        let short = ScriptedBackend::new(Reply::Fixed {
            vectors: 1,
            dimension: 4,
            values: vec![1.0, 2.0],
        });
        assert!(matches!(
            invoke(&short, method, model, &["x"]),
            Err(Error::Backend(_))
        ));
        assert_eq!(short.live.load(Ordering::SeqCst), 0);

        let nan = ScriptedBackend::new(Reply::Fixed {
            vectors: 1,
            dimension: 2,
            values: vec![1.0, f32::NAN],
        });
        let err = invoke(&nan, method, model, &["x"]).unwrap_err();
        assert!(err.to_string().contains("non-finite"));
        assert_eq!(nan.live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_backend_failure_surfaces_once() {
        let backend = ScriptedBackend::new(Reply::Fail);
        let (method, model) = ids();

        let err = invoke(&backend, method, model, &["a"]).unwrap_err();
        assert!(matches!(err, Error::Backend(ref m) if m == "backend returned status 3"));
        assert_eq!(backend.calls.lock().len(), 1);
    }
}
