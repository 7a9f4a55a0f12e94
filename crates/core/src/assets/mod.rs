use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{scene::Layer, Result, VizError};

/// Host-owned bitmap, referenced by id. Pixels stay with the host surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageHandle {
    pub id: String,
    pub width: u32,
    pub height: u32,
}

impl ImageHandle {
    pub fn new(id: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            id: id.into(),
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Registry for every bitmap layers or the album-art overlay refer to.
#[derive(Debug, Default)]
pub struct AssetStore {
    images: HashMap<String, ImageHandle>,
}

impl AssetStore {
    pub fn new() -> Self {
        Self {
            images: HashMap::new(),
        }
    }

    /// Registers `image`, returning any handle it replaced.
    pub fn register(&mut self, image: ImageHandle) -> Option<ImageHandle> {
        tracing::debug!(id = %image.id, image.width, image.height, "registered image");
        self.images.insert(image.id.clone(), image)
    }

    pub fn remove(&mut self, id: &str) -> Option<ImageHandle> {
        self.images.remove(id)
    }

    pub fn image(&self, id: &str) -> Option<&ImageHandle> {
        self.images.get(id)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// The bitmap a layer draws, if it names one.
    pub fn resolve_layer(&self, layer: &Layer) -> Result<Option<&ImageHandle>> {
        match layer.image.as_deref() {
            None => Ok(None),
            Some(id) => self.images.get(id).map(Some).ok_or_else(|| {
                VizError::msg(format!("unknown image `{id}` referenced by layer"))
            }),
        }
    }
}
