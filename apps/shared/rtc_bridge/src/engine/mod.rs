//! Engine collaborator surface
//!
//! The bridge never implements media itself. It drives an [`RtcEngine`] built by
//! an [`EngineFactory`] and receives callbacks through an [`EngineEventHandler`].
//!
//! ```text
//! +------------------+     +-------------------+     +------------------+
//! |  Caller thread   | --> | CommandDispatcher | --> |    RtcEngine     |
//! +------------------+     +-------------------+     +--------+---------+
//!                                                             |
//! +------------------+     +-------------------+              |
//! | Delivery thread  | <-- |  EventForwarder   | <------------+
//! +------------------+     +-------------------+   engine threads
//! ```

mod callback;
pub mod loopback;

use std::sync::Arc;
use thiserror::Error;

use crate::surface::SurfaceHandle;

pub use callback::{
    AudioVolumeInfo, CallbackKind, EngineCallback, LocalVideoStats, Rect, RemoteAudioStats,
    RemoteVideoStats, RtcStats,
};

pub type EngineResult<T = ()> = std::result::Result<T, EngineError>;

/// A request the engine refused, with the engine's own status code
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("engine error {code}: {message}")]
pub struct EngineError {
    pub code: i32,
    pub message: String,
}

impl EngineError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Encoder orientation handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrientationMode {
    #[default]
    Adaptive,
    FixedLandscape,
    FixedPortrait,
}

impl OrientationMode {
    /// Convert from the wire value
    ///
    /// 0 = Adaptive, 1 = FixedLandscape, 2 = FixedPortrait, anything else falls back to Adaptive
    pub fn from_wire(value: i64) -> Self {
        match value {
            0 => Self::Adaptive,
            1 => Self::FixedLandscape,
            2 => Self::FixedPortrait,
            _ => Self::Adaptive,
        }
    }

    /// Convert to the wire value
    pub fn to_wire(self) -> i64 {
        match self {
            Self::Adaptive => 0,
            Self::FixedLandscape => 1,
            Self::FixedPortrait => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoDimensions {
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoEncoderConfiguration {
    pub dimensions: VideoDimensions,
    pub frame_rate: i32,
    pub bitrate: i32,
    pub min_bitrate: i32,
    pub orientation_mode: OrientationMode,
}

/// Beauty filter settings; the level fields are in 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeautyOptions {
    /// 0 = low, 1 = normal, 2 = high
    pub lightening_contrast_level: i32,
    pub lightening_level: f32,
    pub smoothness_level: f32,
    pub redness_level: f32,
}

/// Where and how a video stream is drawn
#[derive(Debug, Clone)]
pub struct VideoCanvas {
    pub surface: SurfaceHandle,
    pub render_mode: i32,
    /// 0 for the local user
    pub uid: u32,
}

/// Operations of a live engine instance
///
/// Implementations are internally synchronized; the dispatcher may call them
/// from any caller thread. Setters report refusal through [`EngineError`].
pub trait RtcEngine: Send + Sync {
    // Channel
    fn set_channel_profile(&self, profile: i32) -> EngineResult;
    fn set_client_role(&self, role: i32) -> EngineResult;
    fn join_channel(
        &self,
        token: Option<&str>,
        channel_id: &str,
        info: Option<&str>,
        uid: u32,
    ) -> EngineResult;
    fn leave_channel(&self) -> EngineResult;
    fn renew_token(&self, token: &str) -> EngineResult;
    fn enable_web_sdk_interoperability(&self, enabled: bool) -> EngineResult;
    fn connection_state(&self) -> i32;

    // Audio
    fn enable_audio(&self) -> EngineResult;
    fn disable_audio(&self) -> EngineResult;
    fn set_audio_profile(&self, profile: i32, scenario: i32) -> EngineResult;
    fn adjust_recording_signal_volume(&self, volume: i32) -> EngineResult;
    fn adjust_playback_signal_volume(&self, volume: i32) -> EngineResult;
    fn enable_audio_volume_indication(&self, interval: i32, smooth: i32) -> EngineResult;
    fn enable_local_audio(&self, enabled: bool) -> EngineResult;
    fn mute_local_audio_stream(&self, muted: bool) -> EngineResult;
    fn mute_remote_audio_stream(&self, uid: u32, muted: bool) -> EngineResult;
    fn mute_all_remote_audio_streams(&self, muted: bool) -> EngineResult;
    fn set_default_mute_all_remote_audio_streams(&self, muted: bool) -> EngineResult;

    // Video pre/post processing
    fn set_beauty_effect_options(&self, enabled: bool, options: &BeautyOptions) -> EngineResult;

    // Video
    fn enable_video(&self) -> EngineResult;
    fn disable_video(&self) -> EngineResult;
    fn set_video_encoder_configuration(&self, config: &VideoEncoderConfiguration)
    -> EngineResult;
    fn setup_local_video(&self, canvas: &VideoCanvas) -> EngineResult;
    fn setup_remote_video(&self, canvas: &VideoCanvas) -> EngineResult;
    fn set_local_render_mode(&self, mode: i32) -> EngineResult;
    fn set_remote_render_mode(&self, uid: u32, mode: i32) -> EngineResult;
    fn start_preview(&self) -> EngineResult;
    fn stop_preview(&self) -> EngineResult;
    fn enable_local_video(&self, enabled: bool) -> EngineResult;
    fn mute_local_video_stream(&self, muted: bool) -> EngineResult;
    fn mute_remote_video_stream(&self, uid: u32, muted: bool) -> EngineResult;
    fn mute_all_remote_video_streams(&self, muted: bool) -> EngineResult;
    fn set_default_mute_all_remote_video_streams(&self, muted: bool) -> EngineResult;

    // Audio routing
    fn set_default_audio_route_to_speakerphone(&self, default_to_speaker: bool) -> EngineResult;
    fn set_enable_speakerphone(&self, enabled: bool) -> EngineResult;
    fn is_speakerphone_enabled(&self) -> bool;

    // Stream fallback
    fn set_remote_user_priority(&self, uid: u32, user_priority: i32) -> EngineResult;
    fn set_local_publish_fallback_option(&self, option: i32) -> EngineResult;
    fn set_remote_subscribe_fallback_option(&self, option: i32) -> EngineResult;

    // Dual stream
    fn enable_dual_stream_mode(&self, enabled: bool) -> EngineResult;
    fn set_remote_video_stream_type(&self, uid: u32, stream_type: i32) -> EngineResult;
    fn set_remote_default_video_stream_type(&self, stream_type: i32) -> EngineResult;

    // Encryption
    fn set_encryption_secret(&self, secret: &str) -> EngineResult;
    fn set_encryption_mode(&self, mode: &str) -> EngineResult;

    // Camera
    fn switch_camera(&self) -> EngineResult;

    // Misc
    fn sdk_version(&self) -> String;
}

/// Receiver of engine callbacks
///
/// Called on engine-internal threads, possibly concurrently.
pub trait EngineEventHandler: Send + Sync {
    fn on_callback(&self, callback: EngineCallback);
}

/// Builds engine instances for the `create` command
pub trait EngineFactory: Send + Sync {
    /// Construct an engine bound to `handler` for its whole lifetime
    fn create(
        &self,
        app_id: &str,
        handler: Arc<dyn EngineEventHandler>,
    ) -> EngineResult<Box<dyn RtcEngine>>;
}
