//! CommandDispatcher - routes inbound method calls to the engine
//!
//! Every call goes through the same steps:
//!
//! 1. Look the method name up in the command table (unknown → not implemented)
//! 2. Check that an engine session exists when the command needs one
//! 3. Decode and validate the declared arguments
//! 4. Resolve view ids through the surface registry
//! 5. Invoke the engine and schedule the result on the delivery thread
//!
//! Steps 1 to 4 never touch the engine, so a rejected call has no side effects.

use parking_lot::RwLock;
use rtc_protocol::{Arguments, MethodResult, Value};
use std::sync::Arc;

use crate::command::{Command, CommandKind};
use crate::engine::{EngineFactory, RtcEngine, VideoCanvas};
use crate::error::{BridgeError, Result};
use crate::events::EventSink;
use crate::marshaller::Marshaller;
use crate::session::EngineSession;
use crate::surface::SurfaceRegistry;

/// Front door of the bridge
///
/// Shared across caller threads behind an `Arc`. Owns the (at most one)
/// engine session; there is no process-wide engine singleton.
pub struct CommandDispatcher {
    factory: Arc<dyn EngineFactory>,
    session: RwLock<Option<EngineSession>>,
    surfaces: Arc<SurfaceRegistry>,
    marshaller: Marshaller,
    sink: Arc<dyn EventSink>,
}

impl CommandDispatcher {
    /// Create a dispatcher
    ///
    /// Replies and events are both scheduled on `marshaller`; events end up in
    /// `sink`, replies in the responder passed to [`dispatch`](Self::dispatch).
    pub fn new(
        factory: Arc<dyn EngineFactory>,
        surfaces: Arc<SurfaceRegistry>,
        marshaller: Marshaller,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            factory,
            session: RwLock::new(None),
            surfaces,
            marshaller,
            sink,
        }
    }

    pub fn surfaces(&self) -> &Arc<SurfaceRegistry> {
        &self.surfaces
    }

    pub fn has_session(&self) -> bool {
        self.session.read().is_some()
    }

    /// Handle `method` and deliver its result to `responder` on the delivery thread
    ///
    /// Returns as soon as the engine call finished; never waits for delivery.
    pub fn dispatch<R>(&self, method: &str, args: &Arguments, responder: R)
    where
        R: FnOnce(MethodResult) + Send + 'static,
    {
        let result = match self.handle(method, args) {
            Ok(value) => MethodResult::Success(value),
            Err(e) => {
                match &e {
                    BridgeError::NativeFailure { .. } => {
                        tracing::warn!(method, "Engine rejected call: {}", e)
                    }
                    _ => tracing::debug!(method, "Call rejected: {}", e),
                }
                e.into()
            }
        };

        if self.marshaller.schedule(move || responder(result)).is_err() {
            tracing::warn!(method, "Reply dropped: delivery loop has shut down");
        }
    }

    /// Handle `method` synchronously on the calling thread
    pub fn handle(&self, method: &str, args: &Arguments) -> Result<Option<Value>> {
        let kind = CommandKind::from_name(method)
            .ok_or_else(|| BridgeError::Unimplemented(method.to_string()))?;

        tracing::debug!(method, "Dispatching");

        if kind.requires_session() && !self.has_session() {
            return Err(BridgeError::no_session(method));
        }

        match Command::decode(kind, args)? {
            Command::Create { app_id } => self.create(app_id),
            Command::Destroy => self.destroy(method),
            command => {
                let session = self.session.read();
                let session = session
                    .as_ref()
                    .ok_or_else(|| BridgeError::no_session(method))?;
                self.execute(session.engine(), command)
            }
        }
    }

    fn create(&self, app_id: &str) -> Result<Option<Value>> {
        let mut session = self.session.write();
        if session.is_some() {
            return Err(BridgeError::InvalidState(
                "an engine already exists; call 'destroy' first".to_string(),
            ));
        }

        let opened = EngineSession::open(
            self.factory.as_ref(),
            app_id,
            self.marshaller.clone(),
            self.sink.clone(),
        )?;
        *session = Some(opened);
        Ok(None)
    }

    fn destroy(&self, method: &str) -> Result<Option<Value>> {
        let closed = self.session.write().take();
        match closed {
            Some(session) => {
                drop(session);
                Ok(None)
            }
            None => Err(BridgeError::no_session(method)),
        }
    }

    fn canvas(&self, view_id: i64, render_mode: i32, uid: u32) -> Result<VideoCanvas> {
        Ok(VideoCanvas {
            surface: self.surfaces.get(view_id)?,
            render_mode,
            uid,
        })
    }

    fn execute(&self, engine: &dyn RtcEngine, command: Command<'_>) -> Result<Option<Value>> {
        use Command as C;

        match command {
            C::Create { .. } | C::Destroy => {
                return Err(BridgeError::InvalidState(
                    "lifecycle command routed to engine".to_string(),
                ));
            }

            // Calls that return a value
            C::GetConnectionState => return Ok(Some(engine.connection_state().into())),
            C::IsSpeakerphoneEnabled => return Ok(Some(engine.is_speakerphone_enabled().into())),
            C::GetSdkVersion => return Ok(Some(engine.sdk_version().into())),

            // Channel
            C::SetChannelProfile { profile } => engine.set_channel_profile(profile)?,
            C::SetClientRole { role } => engine.set_client_role(role)?,
            C::JoinChannel {
                token,
                channel_id,
                info,
                uid,
            } => engine.join_channel(token, channel_id, info, uid)?,
            C::LeaveChannel => engine.leave_channel()?,
            C::RenewToken { token } => engine.renew_token(token)?,
            C::EnableWebSdkInteroperability { enabled } => {
                engine.enable_web_sdk_interoperability(enabled)?
            }

            // Audio
            C::EnableAudio => engine.enable_audio()?,
            C::DisableAudio => engine.disable_audio()?,
            C::SetAudioProfile { profile, scenario } => {
                engine.set_audio_profile(profile, scenario)?
            }
            C::AdjustRecordingSignalVolume { volume } => {
                engine.adjust_recording_signal_volume(volume)?
            }
            C::AdjustPlaybackSignalVolume { volume } => {
                engine.adjust_playback_signal_volume(volume)?
            }
            C::EnableAudioVolumeIndication { interval, smooth } => {
                engine.enable_audio_volume_indication(interval, smooth)?
            }
            C::EnableLocalAudio { enabled } => engine.enable_local_audio(enabled)?,
            C::MuteLocalAudioStream { muted } => engine.mute_local_audio_stream(muted)?,
            C::MuteRemoteAudioStream { uid, muted } => {
                engine.mute_remote_audio_stream(uid, muted)?
            }
            C::MuteAllRemoteAudioStreams { muted } => {
                engine.mute_all_remote_audio_streams(muted)?
            }
            C::SetDefaultMuteAllRemoteAudioStreams { muted } => {
                engine.set_default_mute_all_remote_audio_streams(muted)?
            }

            C::SetBeautyEffectOptions { enabled, options } => {
                engine.set_beauty_effect_options(enabled, &options)?
            }

            // Video
            C::EnableVideo => engine.enable_video()?,
            C::DisableVideo => engine.disable_video()?,
            C::SetVideoEncoderConfiguration { config } => {
                engine.set_video_encoder_configuration(&config)?
            }
            C::SetupLocalVideo {
                view_id,
                render_mode,
            } => engine.setup_local_video(&self.canvas(view_id, render_mode, 0)?)?,
            C::SetupRemoteVideo {
                view_id,
                render_mode,
                uid,
            } => engine.setup_remote_video(&self.canvas(view_id, render_mode, uid)?)?,
            C::RemoveNativeView { view_id } => self.surfaces.remove(view_id),
            C::SetLocalRenderMode { mode } => engine.set_local_render_mode(mode)?,
            C::SetRemoteRenderMode { uid, mode } => engine.set_remote_render_mode(uid, mode)?,
            C::StartPreview => engine.start_preview()?,
            C::StopPreview => engine.stop_preview()?,
            C::EnableLocalVideo { enabled } => engine.enable_local_video(enabled)?,
            C::MuteLocalVideoStream { muted } => engine.mute_local_video_stream(muted)?,
            C::MuteRemoteVideoStream { uid, muted } => {
                engine.mute_remote_video_stream(uid, muted)?
            }
            C::MuteAllRemoteVideoStreams { muted } => {
                engine.mute_all_remote_video_streams(muted)?
            }
            C::SetDefaultMuteAllRemoteVideoStreams { muted } => {
                engine.set_default_mute_all_remote_video_streams(muted)?
            }

            // Audio routing
            C::SetDefaultAudioRouteToSpeaker { default_to_speaker } => {
                engine.set_default_audio_route_to_speakerphone(default_to_speaker)?
            }
            C::SetEnableSpeakerphone { enabled } => engine.set_enable_speakerphone(enabled)?,

            // Stream fallback
            C::SetRemoteUserPriority { uid, user_priority } => {
                engine.set_remote_user_priority(uid, user_priority)?
            }
            C::SetLocalPublishFallbackOption { option } => {
                engine.set_local_publish_fallback_option(option)?
            }
            C::SetRemoteSubscribeFallbackOption { option } => {
                engine.set_remote_subscribe_fallback_option(option)?
            }

            // Dual stream
            C::EnableDualStreamMode { enabled } => engine.enable_dual_stream_mode(enabled)?,
            C::SetRemoteVideoStreamType { uid, stream_type } => {
                engine.set_remote_video_stream_type(uid, stream_type)?
            }
            C::SetRemoteDefaultVideoStreamType { stream_type } => {
                engine.set_remote_default_video_stream_type(stream_type)?
            }

            // Encryption
            C::SetEncryptionSecret { secret } => engine.set_encryption_secret(secret)?,
            C::SetEncryptionMode { mode } => engine.set_encryption_mode(mode)?,

            C::SwitchCamera => engine.switch_camera()?,
        }

        Ok(None)
    }
}

impl std::fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("session", &*self.session.read())
            .field("surfaces", &self.surfaces)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::fields;
    use crate::engine::loopback::LoopbackFactory;
    use crate::marshaller::{self, DeliveryLoop};
    use parking_lot::Mutex;
    use rtc_protocol::EventMessage;

    fn setup() -> (CommandDispatcher, Arc<LoopbackFactory>, DeliveryLoop) {
        let factory = Arc::new(LoopbackFactory::new());
        let (marshaller, delivery) = marshaller::channel();
        let dispatcher = CommandDispatcher::new(
            factory.clone(),
            Arc::new(SurfaceRegistry::new()),
            marshaller,
            Arc::new(|_: EventMessage| {}),
        );
        (dispatcher, factory, delivery)
    }

    fn create(dispatcher: &CommandDispatcher) {
        let args = fields([("appId", "app".into())]);
        dispatcher.handle("create", &args).unwrap();
    }

    #[test]
    fn test_unknown_method() {
        let (dispatcher, _, _) = setup();
        assert_eq!(
            dispatcher.handle("teleport", &Arguments::new()),
            Err(BridgeError::Unimplemented("teleport".into()))
        );
    }

    #[test]
    fn test_session_check_precedes_decoding() {
        let (dispatcher, _, _) = setup();
        // Arguments are missing too, but the missing session wins
        let err = dispatcher.handle("joinChannel", &Arguments::new()).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidState(_)));
    }

    #[test]
    fn test_create_twice_rejected() {
        let (dispatcher, factory, _) = setup();
        create(&dispatcher);

        let args = fields([("appId", "other".into())]);
        let err = dispatcher.handle("create", &args).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidState(_)));
        assert_eq!(factory.created(), 1);
    }

    #[test]
    fn test_return_values() {
        let (dispatcher, _, _) = setup();
        create(&dispatcher);

        let none = Arguments::new();
        assert_eq!(
            dispatcher.handle("getSdkVersion", &none).unwrap(),
            Some(Value::from(crate::engine::loopback::DEFAULT_SDK_VERSION))
        );
        assert_eq!(
            dispatcher.handle("getConnectionState", &none).unwrap(),
            Some(Value::Int(1))
        );
        assert_eq!(
            dispatcher.handle("isSpeakerphoneEnabled", &none).unwrap(),
            Some(Value::Bool(false))
        );
    }

    #[test]
    fn test_remote_user_priority_makes_one_call() {
        let (dispatcher, factory, _) = setup();
        create(&dispatcher);

        let args = fields([("uid", 3.into()), ("userPriority", 50.into())]);
        dispatcher.handle("setRemoteUserPriority", &args).unwrap();

        let ops = factory.last().unwrap().ops();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].name, "setRemoteUserPriority");
    }

    #[test]
    fn test_dispatch_replies_on_delivery_loop() {
        let (dispatcher, _, delivery) = setup();
        let replies = Arc::new(Mutex::new(Vec::new()));

        let sink = replies.clone();
        dispatcher.dispatch("destroy", &Arguments::new(), move |result| {
            sink.lock().push(result)
        });
        assert!(replies.lock().is_empty());

        delivery.run_pending();
        let replies = replies.lock();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].error_code(), Some("INVALID_STATE"));
    }
}
