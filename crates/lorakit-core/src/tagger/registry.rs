//! Process-wide model cache as an explicit, injectable object.
//!
//! Each model identifier gets one slot. The first caller loads the model on a
//! blocking thread; concurrent callers for the same identifier wait on the
//! same load; later callers get the cached `Arc` immediately. A failed load
//! is not cached, so a retry after downloading the model succeeds. Failed
//! slots are dropped once a different identifier is requested, so the map
//! holds loaded models plus at most the latest failures.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::OnceCell;

use crate::error::{TaggerError, TaggerResult};

use super::model::TaggerModel;

/// Load state of a model identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "lowercase")]
pub enum LoadState {
    Unloaded,
    Loading,
    Ready,
    Failed(String),
}

/// Knows how to build a model from its identifier.
pub trait ModelLoader: Send + Sync {
    fn load(&self, model: &str) -> TaggerResult<TaggerModel>;
}

/// Loads ONNX taggers from `<model_dir>/<vendor_name>/`.
pub struct OnnxModelLoader {
    model_dir: PathBuf,
    image_size: u32,
}

impl OnnxModelLoader {
    pub fn new(model_dir: PathBuf, image_size: u32) -> Self {
        Self {
            model_dir,
            image_size,
        }
    }
}

impl ModelLoader for OnnxModelLoader {
    fn load(&self, model: &str) -> TaggerResult<TaggerModel> {
        TaggerModel::load(&self.model_dir, model, self.image_size)
    }
}

struct ModelSlot {
    cell: OnceCell<Arc<TaggerModel>>,
    state: Mutex<LoadState>,
}

impl ModelSlot {
    fn new() -> Self {
        Self {
            cell: OnceCell::new(),
            state: Mutex::new(LoadState::Unloaded),
        }
    }

    fn set_state(&self, state: LoadState) {
        match self.state.lock() {
            Ok(mut guard) => *guard = state,
            Err(poisoned) => *poisoned.into_inner() = state,
        }
    }

    fn state(&self) -> LoadState {
        match self.state.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Lazily loaded, shared tagger models keyed by identifier.
pub struct ModelRegistry {
    loader: Arc<dyn ModelLoader>,
    slots: Mutex<HashMap<String, Arc<ModelSlot>>>,
}

impl ModelRegistry {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Registry backed by ONNX models on disk.
    pub fn onnx(model_dir: PathBuf, image_size: u32) -> Self {
        Self::new(Arc::new(OnnxModelLoader::new(model_dir, image_size)))
    }

    fn slot(&self, model: &str) -> Arc<ModelSlot> {
        let mut slots = match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(slot) = slots.get(model) {
            return slot.clone();
        }
        slots.retain(|_, slot| !matches!(slot.state(), LoadState::Failed(_)));
        let slot = Arc::new(ModelSlot::new());
        slots.insert(model.to_string(), slot.clone());
        slot
    }

    /// Get a loaded model, loading it on first use.
    pub async fn get_or_load(&self, model: &str) -> TaggerResult<Arc<TaggerModel>> {
        let slot = self.slot(model);
        let loaded = slot
            .cell
            .get_or_try_init(|| async {
                slot.set_state(LoadState::Loading);
                let loader = self.loader.clone();
                let id = model.to_string();
                let result = tokio::task::spawn_blocking(move || loader.load(&id))
                    .await
                    .map_err(|e| TaggerError::ModelLoad {
                        model: model.to_string(),
                        message: format!("Load task failed: {e}"),
                    })
                    .and_then(|r| r);
                match result {
                    Ok(m) => {
                        slot.set_state(LoadState::Ready);
                        Ok(Arc::new(m))
                    }
                    Err(e) => {
                        tracing::error!("Failed to load tagger {}: {}", model, e);
                        slot.set_state(LoadState::Failed(e.to_string()));
                        Err(e)
                    }
                }
            })
            .await?;
        Ok(loaded.clone())
    }

    /// Current state of `model`.
    pub fn state(&self, model: &str) -> LoadState {
        let slots = match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        slots
            .get(model)
            .map(|slot| slot.state())
            .unwrap_or(LoadState::Unloaded)
    }

    /// Identifiers of every model that finished loading.
    pub fn loaded(&self) -> Vec<String> {
        let slots = match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut ids: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| slot.cell.initialized())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}
