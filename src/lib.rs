pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod link;
pub mod session;
pub mod settings;

pub use audio::{
    AudioFrame, CaptureGraph, CaptureStatus, DeviceTabs, EncodingMode, FrameEncoder, MediaStream,
    NullMonitor, PlaybackSink, SyntheticTabs, TabId, TabInfo, TabRegistry,
};
pub use config::Config;
pub use error::{CaptureError, LinkError, OrchestrationError};
pub use http::{create_router, AppState};
pub use link::{ContextBody, InboundMessage, LinkState, OutboundMessage, TransportLink};
pub use session::{SessionConfig, SessionState, SessionStats, TabSession, UpdateEvent, UpdateKind};
pub use settings::StoredSettings;
