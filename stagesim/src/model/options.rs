use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

lazy_static::lazy_static! {
    static ref OPTION_REGISTRY: RwLock<FxHashMap<&'static str, &'static ModelOption>> =
        RwLock::new(FxHashMap::default());
}

/// A process-wide boolean toggle shared by every model that registers it,
/// e.g. whether bumper data is handed to the renderer.
#[derive(Debug)]
pub struct ModelOption {
    name: &'static str,
    token: &'static str,
    enabled: AtomicBool,
}

impl ModelOption {
    pub const fn new(name: &'static str, token: &'static str, enabled: bool) -> Self {
        Self {
            name,
            token,
            enabled: AtomicBool::new(enabled),
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn token(&self) -> &'static str {
        self.token
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set(&self, enabled: bool) {
        log::debug!("Option `{}` set to {enabled}", self.token);
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn toggle(&self) -> bool {
        !self.enabled.fetch_xor(true, Ordering::Relaxed)
    }
}

/// Make `option` discoverable through [`find_option`]. Registering twice is a no-op.
pub fn register_option(option: &'static ModelOption) {
    OPTION_REGISTRY.write().entry(option.token).or_insert(option);
}

pub fn find_option(token: &str) -> Option<&'static ModelOption> {
    OPTION_REGISTRY.read().get(token).copied()
}
