pub mod device;
pub mod encoder;
pub mod graph;
pub mod monitor;
pub mod synthetic;
pub mod tab;

pub use device::DeviceTabs;
pub use encoder::{quantize_i16, resample_linear, EncodingMode, FrameEncoder};
pub use graph::{CaptureGraph, CaptureStatus, PlaybackHandle, TapHandle};
pub use monitor::{CpalMonitor, NullMonitor, PlaybackSink};
pub use synthetic::SyntheticTabs;
pub use tab::{AudioFrame, MediaStream, StreamGuard, TabId, TabInfo, TabRegistry};
