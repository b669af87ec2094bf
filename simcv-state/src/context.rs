//! Backend and settings handle carried by every state

use simcv_backend::{NativeBackend, NumericBackend};
use simcv_core::{Result, Settings};
use std::fmt;
use std::sync::Arc;

/// Numeric backend plus validated settings
///
/// Cloning is cheap: both halves are reference counted, so every state
/// derived from another shares its context.
#[derive(Clone)]
pub struct Context {
    backend: Arc<dyn NumericBackend>,
    settings: Arc<Settings>,
}

impl Context {
    /// Bundle a backend with settings, rejecting invalid settings
    pub fn new(backend: Arc<dyn NumericBackend>, settings: Settings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            backend,
            settings: Arc::new(settings),
        })
    }

    /// Native backend with the given settings
    pub fn with_settings(settings: Settings) -> Result<Self> {
        Self::new(Arc::new(NativeBackend::default()), settings)
    }

    #[inline]
    pub fn backend(&self) -> &dyn NumericBackend {
        self.backend.as_ref()
    }

    #[inline]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[inline]
    pub fn hbar(&self) -> f64 {
        self.settings.hbar
    }

    #[inline]
    pub fn tolerance(&self) -> f64 {
        self.settings.tolerance
    }
}

impl Default for Context {
    fn default() -> Self {
        Self {
            backend: Arc::new(NativeBackend::default()),
            settings: Arc::new(Settings::default()),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("backend", &self.backend.name())
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_context() {
        let ctx = Context::default();
        assert_eq!(ctx.hbar(), 2.0);
        assert_eq!(ctx.tolerance(), 1e-6);
        assert_eq!(ctx.backend().name(), "native");
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let settings = Settings::new().with_hbar(-1.0);
        assert!(Context::with_settings(settings).is_err());
    }

    #[test]
    fn test_clone_shares_settings() {
        let ctx = Context::with_settings(Settings::new().with_hbar(1.0)).unwrap();
        let copy = ctx.clone();
        assert!(Arc::ptr_eq(&ctx.settings, &copy.settings));
        assert_eq!(copy.hbar(), 1.0);
    }
}
