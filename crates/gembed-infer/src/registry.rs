//! Fixed registry of embedding methods and the models each one serves.
//!
//! Lookups are exact and case-sensitive. A model is only resolved under a
//! method that was already resolved, and only for a modality it supports.

use gembed_core::{Error, Result};

/// Kind of input a model accepts. Discriminants are shared with the backend ABI.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modality {
    Text = 0,
    Image = 1,
}

/// Identifier of a resolved embedding method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(i32);

/// Identifier of a resolved model, scoped to its method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId(i32);

impl MethodId {
    /// Integer id as passed across the backend ABI.
    pub fn raw(self) -> i32 {
        self.0
    }
}

impl ModelId {
    /// Integer id as passed across the backend ABI.
    pub fn raw(self) -> i32 {
        self.0
    }
}

/// A model entry: its id under the owning method and the modalities it embeds.
#[derive(Debug)]
pub struct ModelInfo {
    pub id: i32,
    pub name: &'static str,
    modalities: &'static [Modality],
}

impl ModelInfo {
    pub const fn new(id: i32, name: &'static str, modalities: &'static [Modality]) -> Self {
        Self {
            id,
            name,
            modalities,
        }
    }

    pub fn supports(&self, modality: Modality) -> bool {
        self.modalities.contains(&modality)
    }
}

/// A method entry with its model table.
#[derive(Debug)]
pub struct MethodInfo {
    pub id: i32,
    pub name: &'static str,
    pub models: &'static [ModelInfo],
}

const TEXT: &[Modality] = &[Modality::Text];
const IMAGE: &[Modality] = &[Modality::Image];
const TEXT_AND_IMAGE: &[Modality] = &[Modality::Text, Modality::Image];

const FASTEMBED_MODELS: &[ModelInfo] = &[
    ModelInfo::new(0, "sentence-transformers/all-MiniLM-L6-v2", TEXT),
    ModelInfo::new(1, "BAAI/bge-small-en-v1.5", TEXT),
    ModelInfo::new(2, "nomic-ai/nomic-embed-text-v1.5", TEXT),
    ModelInfo::new(3, "Qdrant/clip-ViT-B-32-vision", IMAGE),
    ModelInfo::new(4, "Qdrant/clip-ViT-B-32-text", TEXT),
];

const REMOTE_MODELS: &[ModelInfo] = &[ModelInfo::new(0, "default", TEXT_AND_IMAGE)];

const BUILTIN_METHODS: &[MethodInfo] = &[
    MethodInfo {
        id: 0,
        name: "fastembed",
        models: FASTEMBED_MODELS,
    },
    MethodInfo {
        id: 1,
        name: "remote",
        models: REMOTE_MODELS,
    },
];

/// Authority on method and model ids, such as the linked engine.
pub trait IdResolver {
    fn method_id(&self, name: &str) -> Option<i32>;
    fn model_id(&self, method_id: i32, name: &str, modality: Modality) -> Option<i32>;
}

static BUILTIN: Registry = Registry::new(BUILTIN_METHODS);

/// Immutable lookup table keyed by (method, model, modality).
#[derive(Debug)]
pub struct Registry {
    methods: &'static [MethodInfo],
}

impl Registry {
    pub const fn new(methods: &'static [MethodInfo]) -> Self {
        Self { methods }
    }

    /// The table of methods the linked backend serves.
    pub fn builtin() -> &'static Registry {
        &BUILTIN
    }

    pub fn methods(&self) -> &'static [MethodInfo] {
        self.methods
    }

    /// Resolve a method name to its id.
    pub fn resolve_method(&self, name: &str) -> Option<MethodId> {
        self.methods
            .iter()
            .find(|m| m.name == name)
            .map(|m| MethodId(m.id))
    }

    /// Resolve a model name under an already-resolved method.
    ///
    /// Returns `None` when the model is unknown to the method or does not
    /// accept `modality`.
    pub fn resolve_model(
        &self,
        method: MethodId,
        name: &str,
        modality: Modality,
    ) -> Option<ModelId> {
        let method = self.methods.iter().find(|m| m.id == method.0)?;
        let model = method.models.iter().find(|m| m.name == name)?;

        if model.supports(modality) {
            Some(ModelId(model.id))
        } else {
            None
        }
    }

    /// Check that `resolver` assigns every method, and every model under each
    /// of its modalities, the same id as this table.
    pub fn verify_against(&self, resolver: &dyn IdResolver) -> Result<()> {
        for method in self.methods {
            let engine_method = resolver.method_id(method.name);
            if engine_method != Some(method.id) {
                return Err(Error::Config(format!(
                    "method '{}' has id {} here but {:?} in the engine",
                    method.name, method.id, engine_method
                )));
            }

            for model in method.models {
                for &modality in model.modalities {
                    let engine_model = resolver.model_id(method.id, model.name, modality);
                    if engine_model != Some(model.id) {
                        return Err(Error::Config(format!(
                            "model '{}' ({:?}) under '{}' has id {} here but {:?} in the engine",
                            model.name, modality, method.name, model.id, engine_model
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
