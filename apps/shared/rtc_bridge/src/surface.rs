//! Rendering surfaces referenced by caller-assigned view ids
//!
//! The host's view factory creates a surface for every native view and
//! registers it here. Video setup commands only carry the view id; the
//! dispatcher resolves it through the [`SurfaceRegistry`].
//!
//! The registry does not own surfaces. It keeps a `Weak` reference so that a
//! view torn down by the UI layer without a matching `removeNativeView`
//! resolves as missing instead of keeping a dead surface alive.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::error::{BridgeError, Result};

/// An opaque platform drawing target
pub trait RenderSurface: Send + Sync + fmt::Debug {
    /// Human readable identity used in logs and by the loopback engine
    fn label(&self) -> &str;
}

/// Shared handle to a rendering surface
pub type SurfaceHandle = Arc<dyn RenderSurface>;

/// Surface with no backing window, used by headless hosts and tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessSurface {
    label: String,
}

impl HeadlessSurface {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    /// Convenience constructor returning a ready-to-register handle
    pub fn handle(label: impl Into<String>) -> SurfaceHandle {
        Arc::new(Self::new(label))
    }
}

impl RenderSurface for HeadlessSurface {
    fn label(&self) -> &str {
        &self.label
    }
}

/// Thread-safe map from view id to surface
#[derive(Default)]
pub struct SurfaceRegistry {
    surfaces: Mutex<HashMap<i64, Weak<dyn RenderSurface>>>,
}

impl SurfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` under `view_id`, replacing any previous entry
    pub fn add(&self, view_id: i64, handle: &SurfaceHandle) {
        let previous = self.surfaces.lock().insert(view_id, Arc::downgrade(handle));
        if previous.is_some() {
            tracing::debug!("Replaced surface registered for view {}", view_id);
        }
    }

    /// Forget `view_id`; removing an unknown id is a no-op
    pub fn remove(&self, view_id: i64) {
        self.surfaces.lock().remove(&view_id);
    }

    /// Resolve `view_id` to a live surface
    pub fn get(&self, view_id: i64) -> Result<SurfaceHandle> {
        let mut surfaces = self.surfaces.lock();
        let Some(weak) = surfaces.get(&view_id) else {
            return Err(BridgeError::NotFound(view_id));
        };

        match weak.upgrade() {
            Some(handle) => Ok(handle),
            None => {
                surfaces.remove(&view_id);
                tracing::debug!("Pruned dropped surface for view {}", view_id);
                Err(BridgeError::NotFound(view_id))
            }
        }
    }

    /// Number of entries, including ones whose surface is already gone
    pub fn len(&self) -> usize {
        self.surfaces.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.lock().is_empty()
    }
}

impl fmt::Debug for SurfaceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceRegistry")
            .field("len", &self.len())
            .finish()
    }
}
