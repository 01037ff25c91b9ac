//! In-process engine without media
//!
//! `LoopbackEngine` records every operation it receives and answers with
//! plausible callbacks from its own worker thread, the way a real engine
//! reports from internal threads. It backs the host binary when no native
//! engine is linked and gives tests a way to observe exactly which engine
//! calls a command produced.

use parking_lot::Mutex;
use rtc_protocol::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Instant;

use super::{
    BeautyOptions, EngineCallback, EngineError, EngineEventHandler, EngineFactory, EngineResult,
    RtcEngine, RtcStats, VideoCanvas, VideoEncoderConfiguration,
};

/// Status code for a malformed request, as native engines report it
pub const ERR_INVALID_ARGUMENT: i32 = -2;
/// Status code for a call made in the wrong channel state
pub const ERR_NOT_READY: i32 = -3;
/// Construction failure for an empty or unknown app id
pub const ERR_INVALID_APP_ID: i32 = 101;

pub const DEFAULT_SDK_VERSION: &str = "loopback-2.4.0";

const SUPPORTED_ENCRYPTION_MODES: &[&str] = &["aes-128-xts", "aes-256-xts", "aes-128-ecb"];

// Connection states as reported by getConnectionState
const CONNECTION_DISCONNECTED: i32 = 1;
const CONNECTION_CONNECTED: i32 = 3;

/// One recorded engine call
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOp {
    /// Wire name of the operation (e.g. "joinChannel")
    pub name: &'static str,
    pub args: Vec<Value>,
}

#[derive(Debug)]
struct ChannelState {
    channel: String,
    uid: u32,
    joined_at: Instant,
}

#[derive(Debug)]
struct LoopbackState {
    channel: Option<ChannelState>,
    client_role: i32,
    speakerphone: bool,
    encoder: Option<VideoEncoderConfiguration>,
    next_uid: u32,
}

impl Default for LoopbackState {
    fn default() -> Self {
        Self {
            channel: None,
            client_role: 1,
            speakerphone: false,
            encoder: None,
            next_uid: 1000,
        }
    }
}

struct Inner {
    app_id: String,
    sdk_version: String,
    created_at: Instant,
    ops: Mutex<Vec<EngineOp>>,
    state: Mutex<LoopbackState>,
    rejections: Mutex<HashMap<&'static str, i32>>,
    callbacks: mpsc::Sender<EngineCallback>,
}

/// Cloneable handle to one loopback engine instance
#[derive(Clone)]
pub struct LoopbackEngine {
    inner: Arc<Inner>,
}

impl LoopbackEngine {
    /// Start an engine whose callbacks go to `handler`
    ///
    /// Callbacks are delivered from a dedicated thread that lives until the
    /// last handle is dropped.
    pub fn start(
        app_id: &str,
        sdk_version: &str,
        handler: Arc<dyn EngineEventHandler>,
    ) -> EngineResult<Self> {
        if app_id.trim().is_empty() {
            return Err(EngineError::new(ERR_INVALID_APP_ID, "app id must not be empty"));
        }

        let (tx, rx) = mpsc::channel::<EngineCallback>();
        thread::Builder::new()
            .name("loopback-engine".to_string())
            .spawn(move || {
                while let Ok(callback) = rx.recv() {
                    handler.on_callback(callback);
                }
                tracing::trace!("Loopback callback thread finished");
            })
            .map_err(|e| EngineError::new(ERR_NOT_READY, format!("worker spawn failed: {}", e)))?;

        tracing::debug!("Loopback engine started for app '{}'", app_id);

        Ok(Self {
            inner: Arc::new(Inner {
                app_id: app_id.to_string(),
                sdk_version: sdk_version.to_string(),
                created_at: Instant::now(),
                ops: Mutex::new(Vec::new()),
                state: Mutex::new(LoopbackState::default()),
                rejections: Mutex::new(HashMap::new()),
                callbacks: tx,
            }),
        })
    }

    pub fn app_id(&self) -> &str {
        &self.inner.app_id
    }

    /// Snapshot of all recorded operations, oldest first
    pub fn ops(&self) -> Vec<EngineOp> {
        self.inner.ops.lock().clone()
    }

    /// Recorded operations with the given wire name
    pub fn ops_named(&self, name: &str) -> Vec<EngineOp> {
        self.inner
            .ops
            .lock()
            .iter()
            .filter(|op| op.name == name)
            .cloned()
            .collect()
    }

    pub fn clear_ops(&self) {
        self.inner.ops.lock().clear();
    }

    /// Make every later call of `name` fail with `code`
    pub fn reject(&self, name: &'static str, code: i32) {
        self.inner.rejections.lock().insert(name, code);
    }

    /// Raise an arbitrary callback as if the engine produced it
    pub fn emit(&self, callback: EngineCallback) {
        if self.inner.callbacks.send(callback).is_err() {
            tracing::warn!("Loopback callback thread is gone, callback dropped");
        }
    }

    fn call(&self, name: &'static str, args: Vec<Value>) -> EngineResult {
        tracing::trace!("loopback {}({:?})", name, args);
        self.inner.ops.lock().push(EngineOp { name, args });

        match self.inner.rejections.lock().get(name) {
            Some(code) => Err(EngineError::new(*code, format!("{} rejected", name))),
            None => Ok(()),
        }
    }

    fn elapsed_ms(since: Instant) -> i32 {
        i32::try_from(since.elapsed().as_millis()).unwrap_or(i32::MAX)
    }

    fn canvas_args(canvas: &VideoCanvas) -> Vec<Value> {
        vec![
            canvas.surface.label().into(),
            canvas.render_mode.into(),
            canvas.uid.into(),
        ]
    }
}

impl std::fmt::Debug for LoopbackEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackEngine")
            .field("app_id", &self.inner.app_id)
            .field("ops", &self.inner.ops.lock().len())
            .finish()
    }
}

impl RtcEngine for LoopbackEngine {
    fn set_channel_profile(&self, profile: i32) -> EngineResult {
        self.call("setChannelProfile", vec![profile.into()])
    }

    fn set_client_role(&self, role: i32) -> EngineResult {
        self.call("setClientRole", vec![role.into()])?;

        let mut state = self.inner.state.lock();
        let old_role = state.client_role;
        state.client_role = role;
        if state.channel.is_some() && old_role != role {
            self.emit(EngineCallback::ClientRoleChanged {
                old_role,
                new_role: role,
            });
        }
        Ok(())
    }

    fn join_channel(
        &self,
        token: Option<&str>,
        channel_id: &str,
        info: Option<&str>,
        uid: u32,
    ) -> EngineResult {
        self.call(
            "joinChannel",
            vec![token.into(), channel_id.into(), info.into(), uid.into()],
        )?;

        if channel_id.is_empty() {
            return Err(EngineError::new(ERR_INVALID_ARGUMENT, "channel id is empty"));
        }

        let mut state = self.inner.state.lock();
        if state.channel.is_some() {
            return Err(EngineError::new(ERR_NOT_READY, "already in a channel"));
        }

        let uid = if uid == 0 {
            state.next_uid += 1;
            state.next_uid
        } else {
            uid
        };
        state.channel = Some(ChannelState {
            channel: channel_id.to_string(),
            uid,
            joined_at: Instant::now(),
        });

        self.emit(EngineCallback::ConnectionStateChanged {
            state: CONNECTION_CONNECTED,
            reason: 1,
        });
        self.emit(EngineCallback::JoinChannelSuccess {
            channel: channel_id.to_string(),
            uid,
            elapsed: Self::elapsed_ms(self.inner.created_at),
        });
        Ok(())
    }

    fn leave_channel(&self) -> EngineResult {
        self.call("leaveChannel", Vec::new())?;

        let Some(left) = self.inner.state.lock().channel.take() else {
            return Ok(());
        };

        let stats = RtcStats {
            duration: u32::try_from(left.joined_at.elapsed().as_secs()).unwrap_or(u32::MAX),
            user_count: 1,
            ..RtcStats::default()
        };
        tracing::trace!("Loopback left '{}' as {}", left.channel, left.uid);

        self.emit(EngineCallback::LeaveChannel { stats });
        self.emit(EngineCallback::ConnectionStateChanged {
            state: CONNECTION_DISCONNECTED,
            reason: 5,
        });
        Ok(())
    }

    fn renew_token(&self, token: &str) -> EngineResult {
        self.call("renewToken", vec![token.into()])
    }

    fn enable_web_sdk_interoperability(&self, enabled: bool) -> EngineResult {
        self.call("enableWebSdkInteroperability", vec![enabled.into()])
    }

    fn connection_state(&self) -> i32 {
        if self.inner.state.lock().channel.is_some() {
            CONNECTION_CONNECTED
        } else {
            CONNECTION_DISCONNECTED
        }
    }

    fn enable_audio(&self) -> EngineResult {
        self.call("enableAudio", Vec::new())
    }

    fn disable_audio(&self) -> EngineResult {
        self.call("disableAudio", Vec::new())
    }

    fn set_audio_profile(&self, profile: i32, scenario: i32) -> EngineResult {
        self.call("setAudioProfile", vec![profile.into(), scenario.into()])
    }

    fn adjust_recording_signal_volume(&self, volume: i32) -> EngineResult {
        self.call("adjustRecordingSignalVolume", vec![volume.into()])?;
        check_volume(volume)
    }

    fn adjust_playback_signal_volume(&self, volume: i32) -> EngineResult {
        self.call("adjustPlaybackSignalVolume", vec![volume.into()])?;
        check_volume(volume)
    }

    fn enable_audio_volume_indication(&self, interval: i32, smooth: i32) -> EngineResult {
        self.call(
            "enableAudioVolumeIndication",
            vec![interval.into(), smooth.into()],
        )
    }

    fn enable_local_audio(&self, enabled: bool) -> EngineResult {
        self.call("enableLocalAudio", vec![enabled.into()])?;
        self.emit(EngineCallback::MicrophoneEnabled { enabled });
        Ok(())
    }

    fn mute_local_audio_stream(&self, muted: bool) -> EngineResult {
        self.call("muteLocalAudioStream", vec![muted.into()])
    }

    fn mute_remote_audio_stream(&self, uid: u32, muted: bool) -> EngineResult {
        self.call("muteRemoteAudioStream", vec![uid.into(), muted.into()])
    }

    fn mute_all_remote_audio_streams(&self, muted: bool) -> EngineResult {
        self.call("muteAllRemoteAudioStreams", vec![muted.into()])
    }

    fn set_default_mute_all_remote_audio_streams(&self, muted: bool) -> EngineResult {
        self.call("setDefaultMuteAllRemoteAudioStreams", vec![muted.into()])
    }

    fn set_beauty_effect_options(&self, enabled: bool, options: &BeautyOptions) -> EngineResult {
        self.call(
            "setBeautyEffectOptions",
            vec![
                enabled.into(),
                options.lightening_contrast_level.into(),
                options.lightening_level.into(),
                options.smoothness_level.into(),
                options.redness_level.into(),
            ],
        )
    }

    fn enable_video(&self) -> EngineResult {
        self.call("enableVideo", Vec::new())
    }

    fn disable_video(&self) -> EngineResult {
        self.call("disableVideo", Vec::new())
    }

    fn set_video_encoder_configuration(
        &self,
        config: &VideoEncoderConfiguration,
    ) -> EngineResult {
        self.call(
            "setVideoEncoderConfiguration",
            vec![
                config.dimensions.width.into(),
                config.dimensions.height.into(),
                config.frame_rate.into(),
                config.bitrate.into(),
                config.min_bitrate.into(),
                config.orientation_mode.to_wire().into(),
            ],
        )?;
        self.inner.state.lock().encoder = Some(*config);
        Ok(())
    }

    fn setup_local_video(&self, canvas: &VideoCanvas) -> EngineResult {
        self.call("setupLocalVideo", Self::canvas_args(canvas))
    }

    fn setup_remote_video(&self, canvas: &VideoCanvas) -> EngineResult {
        self.call("setupRemoteVideo", Self::canvas_args(canvas))
    }

    fn set_local_render_mode(&self, mode: i32) -> EngineResult {
        self.call("setLocalRenderMode", vec![mode.into()])
    }

    fn set_remote_render_mode(&self, uid: u32, mode: i32) -> EngineResult {
        self.call("setRemoteRenderMode", vec![uid.into(), mode.into()])
    }

    fn start_preview(&self) -> EngineResult {
        self.call("startPreview", Vec::new())?;

        let (width, height) = match self.inner.state.lock().encoder {
            Some(config) => (config.dimensions.width, config.dimensions.height),
            None => (640, 360),
        };
        self.emit(EngineCallback::FirstLocalVideoFrame {
            width,
            height,
            elapsed: Self::elapsed_ms(self.inner.created_at),
        });
        Ok(())
    }

    fn stop_preview(&self) -> EngineResult {
        self.call("stopPreview", Vec::new())
    }

    fn enable_local_video(&self, enabled: bool) -> EngineResult {
        self.call("enableLocalVideo", vec![enabled.into()])
    }

    fn mute_local_video_stream(&self, muted: bool) -> EngineResult {
        self.call("muteLocalVideoStream", vec![muted.into()])
    }

    fn mute_remote_video_stream(&self, uid: u32, muted: bool) -> EngineResult {
        self.call("muteRemoteVideoStream", vec![uid.into(), muted.into()])
    }

    fn mute_all_remote_video_streams(&self, muted: bool) -> EngineResult {
        self.call("muteAllRemoteVideoStreams", vec![muted.into()])
    }

    fn set_default_mute_all_remote_video_streams(&self, muted: bool) -> EngineResult {
        self.call("setDefaultMuteAllRemoteVideoStreams", vec![muted.into()])
    }

    fn set_default_audio_route_to_speakerphone(&self, default_to_speaker: bool) -> EngineResult {
        self.call(
            "setDefaultAudioRouteToSpeaker",
            vec![default_to_speaker.into()],
        )
    }

    fn set_enable_speakerphone(&self, enabled: bool) -> EngineResult {
        self.call("setEnableSpeakerphone", vec![enabled.into()])?;

        let mut state = self.inner.state.lock();
        if state.speakerphone != enabled {
            state.speakerphone = enabled;
            // 3 = speakerphone, 1 = earpiece
            let routing = if enabled { 3 } else { 1 };
            self.emit(EngineCallback::AudioRouteChanged { routing });
        }
        Ok(())
    }

    fn is_speakerphone_enabled(&self) -> bool {
        self.inner.state.lock().speakerphone
    }

    fn set_remote_user_priority(&self, uid: u32, user_priority: i32) -> EngineResult {
        self.call(
            "setRemoteUserPriority",
            vec![uid.into(), user_priority.into()],
        )
    }

    fn set_local_publish_fallback_option(&self, option: i32) -> EngineResult {
        self.call("setLocalPublishFallbackOption", vec![option.into()])
    }

    fn set_remote_subscribe_fallback_option(&self, option: i32) -> EngineResult {
        self.call("setRemoteSubscribeFallbackOption", vec![option.into()])
    }

    fn enable_dual_stream_mode(&self, enabled: bool) -> EngineResult {
        self.call("enableDualStreamMode", vec![enabled.into()])
    }

    fn set_remote_video_stream_type(&self, uid: u32, stream_type: i32) -> EngineResult {
        self.call(
            "setRemoteVideoStreamType",
            vec![uid.into(), stream_type.into()],
        )
    }

    fn set_remote_default_video_stream_type(&self, stream_type: i32) -> EngineResult {
        self.call("setRemoteDefaultVideoStreamType", vec![stream_type.into()])
    }

    fn set_encryption_secret(&self, secret: &str) -> EngineResult {
        self.call("setEncryptionSecret", vec![secret.into()])
    }

    fn set_encryption_mode(&self, mode: &str) -> EngineResult {
        self.call("setEncryptionMode", vec![mode.into()])?;
        if SUPPORTED_ENCRYPTION_MODES.contains(&mode) {
            Ok(())
        } else {
            Err(EngineError::new(
                ERR_INVALID_ARGUMENT,
                format!("unsupported encryption mode '{}'", mode),
            ))
        }
    }

    fn switch_camera(&self) -> EngineResult {
        self.call("switchCamera", Vec::new())
    }

    fn sdk_version(&self) -> String {
        self.inner.sdk_version.clone()
    }
}

fn check_volume(volume: i32) -> EngineResult {
    if (0..=400).contains(&volume) {
        Ok(())
    } else {
        Err(EngineError::new(
            ERR_INVALID_ARGUMENT,
            format!("volume {} outside 0..=400", volume),
        ))
    }
}

/// Factory producing [`LoopbackEngine`]s
///
/// Only a weak handle to the latest engine is kept, so destroying the session
/// that owns an engine also stops its callback thread.
pub struct LoopbackFactory {
    sdk_version: String,
    created: AtomicUsize,
    latest: Mutex<Weak<Inner>>,
}

impl LoopbackFactory {
    pub fn new() -> Self {
        Self::with_sdk_version(DEFAULT_SDK_VERSION)
    }

    pub fn with_sdk_version(sdk_version: impl Into<String>) -> Self {
        Self {
            sdk_version: sdk_version.into(),
            created: AtomicUsize::new(0),
            latest: Mutex::new(Weak::new()),
        }
    }

    /// Number of engines constructed so far
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// The most recently constructed engine, while its session still holds it
    pub fn last(&self) -> Option<LoopbackEngine> {
        self.latest
            .lock()
            .upgrade()
            .map(|inner| LoopbackEngine { inner })
    }
}

impl Default for LoopbackFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineFactory for LoopbackFactory {
    fn create(
        &self,
        app_id: &str,
        handler: Arc<dyn EngineEventHandler>,
    ) -> EngineResult<Box<dyn RtcEngine>> {
        let engine = LoopbackEngine::start(app_id, &self.sdk_version, handler)?;
        *self.latest.lock() = Arc::downgrade(&engine.inner);
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(engine))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Collect(mpsc::Sender<EngineCallback>);

    impl EngineEventHandler for Collect {
        fn on_callback(&self, callback: EngineCallback) {
            let _ = self.0.send(callback);
        }
    }

    fn engine() -> (LoopbackEngine, mpsc::Receiver<EngineCallback>) {
        let (tx, rx) = mpsc::channel();
        let engine = LoopbackEngine::start("app", DEFAULT_SDK_VERSION, Arc::new(Collect(tx))).unwrap();
        (engine, rx)
    }

    #[test]
    fn test_empty_app_id_rejected() {
        let (tx, _rx) = mpsc::channel();
        let err = LoopbackFactory::new()
            .create("", Arc::new(Collect(tx)))
            .err()
            .unwrap();
        assert_eq!(err.code, ERR_INVALID_APP_ID);
    }

    #[test]
    fn test_join_records_and_reports() {
        let (engine, rx) = engine();
        engine.join_channel(Some("t"), "room", None, 7).unwrap();

        assert_eq!(
            engine.ops_named("joinChannel")[0].args,
            vec![Value::from("t"), Value::from("room"), Value::Null, Value::Int(7)]
        );
        assert_eq!(engine.connection_state(), CONNECTION_CONNECTED);

        let mut joined = None;
        for _ in 0..2 {
            if let EngineCallback::JoinChannelSuccess { channel, uid, .. } =
                rx.recv_timeout(Duration::from_secs(2)).unwrap()
            {
                joined = Some((channel, uid));
            }
        }
        assert_eq!(joined, Some(("room".to_string(), 7)));
    }

    #[test]
    fn test_rejection_surfaces_code() {
        let (engine, _rx) = engine();
        engine.reject("switchCamera", -7);

        let err = engine.switch_camera().unwrap_err();
        assert_eq!(err.code, -7);
        assert_eq!(engine.ops_named("switchCamera").len(), 1);
    }

    #[test]
    fn test_unknown_encryption_mode() {
        let (engine, _rx) = engine();
        assert!(engine.set_encryption_mode("aes-128-xts").is_ok());
        assert_eq!(
            engine.set_encryption_mode("rot13").unwrap_err().code,
            ERR_INVALID_ARGUMENT
        );
    }

    #[test]
    fn test_factory_does_not_keep_engines_alive() {
        let factory = LoopbackFactory::new();
        let (tx, rx) = mpsc::channel();
        let engine = factory.create("app", Arc::new(Collect(tx))).unwrap();
        assert!(factory.last().is_some());

        drop(engine);
        assert!(factory.last().is_none());
        assert_eq!(factory.created(), 1);

        // The callback thread exits and releases its handler
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)),
            Err(mpsc::RecvTimeoutError::Disconnected)
        );
    }

    #[test]
    fn test_leave_without_join_is_silent() {
        let (engine, rx) = engine();
        engine.leave_channel().unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }
}
