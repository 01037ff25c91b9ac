//! Callbacks raised by the engine
//!
//! Every callback the engine can deliver is one variant of [`EngineCallback`].
//! [`CallbackKind`] is the fieldless twin used to look up per-variant metadata
//! such as the outbound event name.

/// Call statistics reported on leave and periodically while in a channel
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RtcStats {
    pub duration: u32,
    pub tx_bytes: u32,
    pub rx_bytes: u32,
    pub tx_audio_kbitrate: u32,
    pub rx_audio_kbitrate: u32,
    pub tx_video_kbitrate: u32,
    pub rx_video_kbitrate: u32,
    pub tx_packet_loss_rate: u32,
    pub rx_packet_loss_rate: u32,
    pub lastmile_delay: u32,
    pub user_count: u32,
    pub cpu_app_usage: f64,
    pub cpu_total_usage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LocalVideoStats {
    pub sent_bitrate: i32,
    pub sent_frame_rate: i32,
    pub encoder_output_frame_rate: i32,
    pub renderer_output_frame_rate: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RemoteVideoStats {
    pub uid: u32,
    pub width: i32,
    pub height: i32,
    pub received_bitrate: i32,
    pub decoder_output_frame_rate: i32,
    pub renderer_output_frame_rate: i32,
    pub rx_stream_type: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RemoteAudioStats {
    pub uid: u32,
    pub quality: i32,
    pub network_transport_delay: i32,
    pub jitter_buffer_delay: i32,
    pub audio_loss_rate: i32,
}

/// Camera area in view coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// One speaker entry of a volume indication
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioVolumeInfo {
    pub uid: u32,
    pub volume: u32,
}

/// A single engine notification with its native arguments
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCallback {
    Warning { warn: i32 },
    Error { err: i32 },
    JoinChannelSuccess { channel: String, uid: u32, elapsed: i32 },
    RejoinChannelSuccess { channel: String, uid: u32, elapsed: i32 },
    LeaveChannel { stats: RtcStats },
    ClientRoleChanged { old_role: i32, new_role: i32 },
    UserJoined { uid: u32, elapsed: i32 },
    UserOffline { uid: u32, reason: i32 },
    ConnectionStateChanged { state: i32, reason: i32 },
    ConnectionLost,
    NetworkTypeChanged { network_type: i32 },
    ApiCallExecuted { error: i32, api: String, result: String },
    TokenPrivilegeWillExpire { token: String },
    RequestToken,
    MicrophoneEnabled { enabled: bool },
    AudioVolumeIndication { speakers: Vec<AudioVolumeInfo>, total_volume: i32 },
    ActiveSpeaker { uid: u32 },
    FirstLocalAudioFrame { elapsed: i32 },
    FirstRemoteAudioFrame { uid: u32, elapsed: i32 },
    FirstRemoteAudioDecoded { uid: u32, elapsed: i32 },
    FirstLocalVideoFrame { width: i32, height: i32, elapsed: i32 },
    FirstRemoteVideoDecoded { uid: u32, width: i32, height: i32, elapsed: i32 },
    FirstRemoteVideoFrame { uid: u32, width: i32, height: i32, elapsed: i32 },
    UserMuteAudio { uid: u32, muted: bool },
    UserMuteVideo { uid: u32, muted: bool },
    UserEnableVideo { uid: u32, enabled: bool },
    UserEnableLocalVideo { uid: u32, enabled: bool },
    VideoSizeChanged { uid: u32, width: i32, height: i32, rotation: i32 },
    RemoteVideoStateChanged { uid: u32, state: i32 },
    LocalPublishFallbackToAudioOnly { is_fallback_or_recover: bool },
    RemoteSubscribeFallbackToAudioOnly { uid: u32, is_fallback_or_recover: bool },
    AudioRouteChanged { routing: i32 },
    CameraFocusAreaChanged { rect: Rect },
    CameraExposureAreaChanged { rect: Rect },
    RtcStats { stats: RtcStats },
    LastmileQuality { quality: i32 },
    NetworkQuality { uid: u32, tx_quality: i32, rx_quality: i32 },
    LocalVideoStats { stats: LocalVideoStats },
    RemoteVideoStats { stats: RemoteVideoStats },
    RemoteAudioStats { stats: RemoteAudioStats },
    RemoteAudioTransportStats { uid: u32, delay: i32, lost: i32, rx_kbit_rate: i32 },
    RemoteVideoTransportStats { uid: u32, delay: i32, lost: i32, rx_kbit_rate: i32 },
    LocalVideoStateChanged { local_video_state: i32, error: i32 },
    AudioEffectFinished { sound_id: i32 },
    StreamPublished { url: String, error: i32 },
    StreamUnpublished { url: String },
    TranscodingUpdated,
    StreamInjectedStatus { url: String, uid: u32, status: i32 },
    /// Raw data-stream bytes; must be UTF-8 to be forwarded
    StreamMessage { uid: u32, stream_id: i32, data: Vec<u8> },
    StreamMessageError { uid: u32, stream_id: i32, error: i32, missed: i32, cached: i32 },
    MediaEngineLoadSuccess,
    MediaEngineStartCallSuccess,
}

macro_rules! callback_kinds {
    ($($variant:ident),* $(,)?) => {
        /// Fieldless discriminant of [`EngineCallback`], usable as a table index
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(usize)]
        pub enum CallbackKind {
            $($variant),*
        }

        impl CallbackKind {
            /// Every kind, in declaration order (`ALL[k as usize] == k`)
            pub const ALL: &'static [CallbackKind] = &[$(CallbackKind::$variant),*];

            pub const COUNT: usize = Self::ALL.len();

            pub fn index(self) -> usize {
                self as usize
            }
        }

        impl EngineCallback {
            pub fn kind(&self) -> CallbackKind {
                match self {
                    $(EngineCallback::$variant { .. } => CallbackKind::$variant),*
                }
            }
        }
    };
}

callback_kinds! {
    Warning,
    Error,
    JoinChannelSuccess,
    RejoinChannelSuccess,
    LeaveChannel,
    ClientRoleChanged,
    UserJoined,
    UserOffline,
    ConnectionStateChanged,
    ConnectionLost,
    NetworkTypeChanged,
    ApiCallExecuted,
    TokenPrivilegeWillExpire,
    RequestToken,
    MicrophoneEnabled,
    AudioVolumeIndication,
    ActiveSpeaker,
    FirstLocalAudioFrame,
    FirstRemoteAudioFrame,
    FirstRemoteAudioDecoded,
    FirstLocalVideoFrame,
    FirstRemoteVideoDecoded,
    FirstRemoteVideoFrame,
    UserMuteAudio,
    UserMuteVideo,
    UserEnableVideo,
    UserEnableLocalVideo,
    VideoSizeChanged,
    RemoteVideoStateChanged,
    LocalPublishFallbackToAudioOnly,
    RemoteSubscribeFallbackToAudioOnly,
    AudioRouteChanged,
    CameraFocusAreaChanged,
    CameraExposureAreaChanged,
    RtcStats,
    LastmileQuality,
    NetworkQuality,
    LocalVideoStats,
    RemoteVideoStats,
    RemoteAudioStats,
    RemoteAudioTransportStats,
    RemoteVideoTransportStats,
    LocalVideoStateChanged,
    AudioEffectFinished,
    StreamPublished,
    StreamUnpublished,
    TranscodingUpdated,
    StreamInjectedStatus,
    StreamMessage,
    StreamMessageError,
    MediaEngineLoadSuccess,
    MediaEngineStartCallSuccess,
}
