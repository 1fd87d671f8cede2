use crate::session::TabSession;
use crate::settings::StoredSettings;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The capture session (concurrent multi-tab capture is not supported,
    /// so there is exactly one)
    pub session: Arc<TabSession>,

    /// Persisted key-value state (last-used endpoint)
    pub settings: Arc<Mutex<StoredSettings>>,

    /// Where settings are written
    pub settings_path: PathBuf,
}

impl AppState {
    pub fn new(session: Arc<TabSession>, settings_path: PathBuf) -> Self {
        let settings = StoredSettings::load_or_default(&settings_path);
        Self {
            session,
            settings: Arc::new(Mutex::new(settings)),
            settings_path,
        }
    }
}
