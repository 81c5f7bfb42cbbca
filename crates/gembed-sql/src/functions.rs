//! SQL surface: `embed_text` and `embed_texts` as SQLite scalar functions.
//!
//! Each registration owns one function slot (backend handle, configuration and
//! a [`CallContext`]) for as long as the function stays registered. Removing
//! the function or closing the connection drops the slot and releases its
//! result buffer.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::{Value, ValueRef};
use rusqlite::Connection;
use tracing::{debug, error, info};

use gembed_core::{BridgeConfig, Error, Result};
use gembed_infer::{invoke, EmbeddingBackend, MethodId, Modality, ModelId, Registry};

use crate::array::decode_with_capacity;
use crate::context::CallContext;
use crate::encode::{encode_batch_json, encode_vector};

/// `embed_text(method, model, text) -> BLOB`
pub const EMBED_TEXT: &str = "embed_text";
/// `embed_texts(method, model, texts_json) -> TEXT`
pub const EMBED_TEXTS: &str = "embed_texts";

const ARG_COUNT: i32 = 3;

/// The three arguments of either function; `None` is SQL NULL.
pub type TextArgs<'a> = [Option<&'a [u8]>; 3];

/// Slot behind `embed_text`: one text in, one packed vector out.
pub struct EmbedText {
    backend: Arc<dyn EmbeddingBackend>,
    registry: &'static Registry,
    config: BridgeConfig,
    context: CallContext,
}

impl EmbedText {
    pub fn new(backend: Arc<dyn EmbeddingBackend>, config: BridgeConfig) -> Self {
        Self {
            backend,
            registry: Registry::builtin(),
            config,
            context: CallContext::new(EMBED_TEXT),
        }
    }

    /// Embed one text. Returns `Ok(None)` when any argument is NULL.
    pub fn evaluate(&mut self, args: TextArgs<'_>) -> Result<Option<&[u8]>> {
        let [Some(method), Some(model), Some(text)] = args else {
            return Ok(None);
        };
        let (method, model) = resolve(self.registry, method, model)?;

        let batch = invoke(self.backend.as_ref(), method, model, &[text])?;
        let encoded = encode_vector(&batch, self.config.single_max_length)?;
        drop(batch);

        Ok(Some(self.context.replace(encoded)))
    }

    pub fn context(&self) -> &CallContext {
        &self.context
    }
}

/// Slot behind `embed_texts`: a JSON array of texts in, a JSON array of vectors out.
pub struct EmbedTexts {
    backend: Arc<dyn EmbeddingBackend>,
    registry: &'static Registry,
    config: BridgeConfig,
    context: CallContext,
}

impl EmbedTexts {
    pub fn new(backend: Arc<dyn EmbeddingBackend>, config: BridgeConfig) -> Self {
        Self {
            backend,
            registry: Registry::builtin(),
            config,
            context: CallContext::new(EMBED_TEXTS),
        }
    }

    /// Embed every text of the array in one backend call. Returns `Ok(None)`
    /// when any argument is NULL or the array is empty.
    pub fn evaluate(&mut self, args: TextArgs<'_>) -> Result<Option<&[u8]>> {
        let [Some(method), Some(model), Some(texts_json)] = args else {
            return Ok(None);
        };
        let (method, model) = resolve(self.registry, method, model)?;

        let texts = decode_with_capacity(texts_json, self.config.decoder_initial_capacity)
            .map_err(|e| Error::Parse(e.to_string()))?;
        if texts.is_empty() {
            debug!(function = EMBED_TEXTS, "empty input array");
            return Ok(None);
        }

        let batch = invoke(self.backend.as_ref(), method, model, texts.as_slice())?;
        drop(texts);
        let encoded = encode_batch_json(&batch, self.config.batch_output_ceiling)?;
        drop(batch);

        Ok(Some(self.context.replace(encoded.into_bytes())))
    }

    pub fn context(&self) -> &CallContext {
        &self.context
    }
}

/// Validate the method, then the model under it, for text input.
fn resolve(registry: &Registry, method: &[u8], model: &[u8]) -> Result<(MethodId, ModelId)> {
    let method_id = std::str::from_utf8(method)
        .ok()
        .and_then(|name| registry.resolve_method(name))
        .ok_or_else(|| Error::InvalidMethod(String::from_utf8_lossy(method).into_owned()))?;

    let model_id = std::str::from_utf8(model)
        .ok()
        .and_then(|name| registry.resolve_model(method_id, name, Modality::Text))
        .ok_or_else(|| Error::InvalidModel {
            method: String::from_utf8_lossy(method).into_owned(),
            model: String::from_utf8_lossy(model).into_owned(),
        })?;

    Ok((method_id, model_id))
}

/// Register `embed_text` and `embed_texts` on `conn`.
///
/// If the second registration fails the first is removed again, so either
/// both functions are available or neither is.
pub fn register_functions(
    conn: &Connection,
    backend: Arc<dyn EmbeddingBackend>,
    config: BridgeConfig,
) -> Result<()> {
    config.validate()?;
    info!("registering embedding functions");

    // a slot is dropped with its registration and never reused after a panic
    let mut single = AssertUnwindSafe(EmbedText::new(Arc::clone(&backend), config));
    conn.create_scalar_function(EMBED_TEXT, ARG_COUNT, FunctionFlags::SQLITE_UTF8, move |ctx| {
        let args = text_args(ctx, EMBED_TEXT)?;
        let out = single.evaluate(args).map_err(|e| sql_error(EMBED_TEXT, e))?;
        Ok(out.map(|bytes| Value::Blob(bytes.to_vec())))
    })
    .map_err(|e| {
        error!(function = EMBED_TEXT, "failed to register: {}", e);
        Error::Database(e.to_string())
    })?;

    let mut batch = AssertUnwindSafe(EmbedTexts::new(backend, config));
    let registered = conn.create_scalar_function(
        EMBED_TEXTS,
        ARG_COUNT,
        FunctionFlags::SQLITE_UTF8,
        move |ctx| {
            let args = text_args(ctx, EMBED_TEXTS)?;
            let out = batch.evaluate(args).map_err(|e| sql_error(EMBED_TEXTS, e))?;
            Ok(out.map(|bytes| Value::Text(String::from_utf8_lossy(bytes).into_owned())))
        },
    );
    if let Err(e) = registered {
        error!(function = EMBED_TEXTS, "failed to register: {}", e);
        if let Err(rollback) = conn.remove_function(EMBED_TEXT, ARG_COUNT) {
            error!(function = EMBED_TEXT, "failed to roll back registration: {}", rollback);
        }
        return Err(Error::Database(e.to_string()));
    }

    info!(
        batch_output_ceiling = config.batch_output_ceiling,
        single_max_length = config.single_max_length,
        "embedding functions registered"
    );
    Ok(())
}

/// Remove both functions, releasing their slots.
pub fn unregister_functions(conn: &Connection) -> Result<()> {
    info!("unregistering embedding functions");
    for name in [EMBED_TEXT, EMBED_TEXTS] {
        conn.remove_function(name, ARG_COUNT)
            .map_err(|e| Error::Database(e.to_string()))?;
    }
    info!("embedding functions unregistered");
    Ok(())
}

/// Every argument must be TEXT or NULL.
fn text_args<'a>(ctx: &'a Context<'_>, function: &'static str) -> rusqlite::Result<TextArgs<'a>> {
    let mut args: TextArgs<'a> = [None; 3];
    for (idx, arg) in args.iter_mut().enumerate() {
        *arg = match ctx.get_raw(idx) {
            ValueRef::Null => None,
            ValueRef::Text(bytes) => Some(bytes),
            _ => {
                return Err(sql_error(
                    function,
                    Error::InvalidArgument("All arguments must be strings".into()),
                ))
            }
        };
    }
    Ok(args)
}

fn sql_error(function: &'static str, err: Error) -> rusqlite::Error {
    error!(function, kind = err.kind(), "{}", err);
    rusqlite::Error::UserFunctionError(Box::new(err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gembed_infer::{BackendError, EmbeddingBatch, TextSlice};

    /// Embeds each text as `[len, first byte]`.
    struct ShapeBackend;

    impl EmbeddingBackend for ShapeBackend {
        fn generate(
            &self,
            _method: MethodId,
            _model: ModelId,
            inputs: &[TextSlice<'_>],
        ) -> std::result::Result<EmbeddingBatch, BackendError> {
            let values = inputs
                .iter()
                .flat_map(|s| {
                    let bytes = s.as_bytes();
                    [bytes.len() as f32, bytes.first().copied().unwrap_or(0) as f32]
                })
                .collect();
            Ok(EmbeddingBatch::from_vec(values, inputs.len(), 2))
        }
    }

    const METHOD: &[u8] = b"fastembed";
    const MODEL: &[u8] = b"BAAI/bge-small-en-v1.5";

    fn args<'a>(method: &'a [u8], model: &'a [u8], text: &'a [u8]) -> TextArgs<'a> {
        [Some(method), Some(model), Some(text)]
    }

    #[test]
    fn test_embed_text_slot_reuses_context() {
        let mut slot = EmbedText::new(Arc::new(ShapeBackend), BridgeConfig::default());
        assert_eq!(slot.context().live_buffers(), 0);

        let out = slot
            .evaluate(args(METHOD, MODEL, b"hi"))
            .unwrap()
            .unwrap()
            .to_vec();
        assert_eq!(out.len(), 4 + 2 * 4);
        assert_eq!(&out[0..4], &2u32.to_le_bytes());
        assert_eq!(&out[4..8], &2.0f32.to_le_bytes());
        assert_eq!(slot.context().live_buffers(), 1);

        slot.evaluate(args(METHOD, MODEL, b"again")).unwrap();
        assert_eq!(slot.context().live_buffers(), 1);
        assert_eq!(&slot.context().current().unwrap()[4..8], &5.0f32.to_le_bytes());
    }

    #[test]
    fn test_null_argument_is_null_result() {
        let mut slot = EmbedText::new(Arc::new(ShapeBackend), BridgeConfig::default());
        assert!(slot.evaluate([None, Some(MODEL), Some(&b"x"[..])]).unwrap().is_none());
        assert!(slot.evaluate([Some(&b"bogus"[..]), Some(MODEL), None]).unwrap().is_none());
        assert_eq!(slot.context().live_buffers(), 0);
    }

    #[test]
    fn test_method_checked_before_model() {
        let mut slot = EmbedTexts::new(Arc::new(ShapeBackend), BridgeConfig::default());
        let err = slot
            .evaluate(args(b"nope", b"also nope", br#"["a"]"#))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidMethod(ref m) if m == "nope"));

        let err = slot
            .evaluate(args(METHOD, b"also nope", br#"["a"]"#))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidModel { .. }));
    }

    #[test]
    fn test_validation_precedes_parsing() {
        let mut slot = EmbedTexts::new(Arc::new(ShapeBackend), BridgeConfig::default());
        let err = slot
            .evaluate(args(b"nope", MODEL, b"not an array"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidMethod(_)));
    }

    #[test]
    fn test_embed_texts_slot() {
        let mut slot = EmbedTexts::new(Arc::new(ShapeBackend), BridgeConfig::default());
        let out = slot
            .evaluate(args(METHOD, MODEL, br#"["ab", "c"]"#))
            .unwrap()
            .unwrap();
        assert_eq!(out, b"[[2.000000,97.000000],[1.000000,99.000000]]");
        assert_eq!(slot.context().live_buffers(), 1);

        assert!(slot.evaluate(args(METHOD, MODEL, b"[]")).unwrap().is_none());
        // the previous result stays until the next successful call
        assert_eq!(slot.context().live_buffers(), 1);
    }

    #[test]
    fn test_embed_texts_parse_error() {
        let mut slot = EmbedTexts::new(Arc::new(ShapeBackend), BridgeConfig::default());
        let malformed: [&[u8]; 3] = [b"[a]", br#"["a""#, b"not an array"];
        for bad in malformed {
            let err = slot.evaluate(args(METHOD, MODEL, bad)).unwrap_err();
            assert!(matches!(err, Error::Parse(_)), "{:?}", err);
        }
        assert_eq!(slot.context().live_buffers(), 0);
    }

    #[test]
    fn test_overflow_keeps_previous_result() {
        let config = BridgeConfig {
            batch_output_ceiling: 30,
            ..BridgeConfig::default()
        };
        let mut slot = EmbedTexts::new(Arc::new(ShapeBackend), config);

        slot.evaluate(args(METHOD, MODEL, br#"["a"]"#)).unwrap();
        let before = slot.context().current().unwrap().to_vec();
        assert_eq!(before, b"[[1.000000,97.000000]]");

        let err = slot
            .evaluate(args(METHOD, MODEL, br#"["a", "b"]"#))
            .unwrap_err();
        assert!(matches!(err, Error::OutputOverflow { ceiling: 30 }));
        assert_eq!(slot.context().live_buffers(), 1);
        assert_eq!(slot.context().current(), Some(before.as_slice()));
    }
}
