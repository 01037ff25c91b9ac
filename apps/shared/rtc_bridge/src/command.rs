//! Inbound command table
//!
//! [`CommandKind`] is the closed set of method names the bridge understands.
//! [`Command`] is a call whose arguments have been validated and decoded into
//! native types. Decoding never touches the engine or the surface registry.

use rtc_protocol::Arguments;

use crate::codec::{ArgReader, decode_beauty_options, decode_encoder_config};
use crate::engine::{BeautyOptions, VideoEncoderConfiguration};
use crate::error::Result;

macro_rules! command_kinds {
    ($($variant:ident => $name:literal),* $(,)?) => {
        /// Every method name accepted on the channel
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum CommandKind {
            $($variant),*
        }

        impl CommandKind {
            pub const ALL: &'static [CommandKind] = &[$(CommandKind::$variant),*];

            /// Wire name of the method
            pub fn name(self) -> &'static str {
                match self {
                    $(CommandKind::$variant => $name),*
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(CommandKind::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

command_kinds! {
    // Lifecycle
    Create => "create",
    Destroy => "destroy",
    // Channel
    SetChannelProfile => "setChannelProfile",
    SetClientRole => "setClientRole",
    JoinChannel => "joinChannel",
    LeaveChannel => "leaveChannel",
    RenewToken => "renewToken",
    EnableWebSdkInteroperability => "enableWebSdkInteroperability",
    GetConnectionState => "getConnectionState",
    // Audio
    EnableAudio => "enableAudio",
    DisableAudio => "disableAudio",
    SetAudioProfile => "setAudioProfile",
    AdjustRecordingSignalVolume => "adjustRecordingSignalVolume",
    AdjustPlaybackSignalVolume => "adjustPlaybackSignalVolume",
    EnableAudioVolumeIndication => "enableAudioVolumeIndication",
    EnableLocalAudio => "enableLocalAudio",
    MuteLocalAudioStream => "muteLocalAudioStream",
    MuteRemoteAudioStream => "muteRemoteAudioStream",
    MuteAllRemoteAudioStreams => "muteAllRemoteAudioStreams",
    SetDefaultMuteAllRemoteAudioStreams => "setDefaultMuteAllRemoteAudioStreams",
    // Video pre/post processing
    SetBeautyEffectOptions => "setBeautyEffectOptions",
    // Video
    EnableVideo => "enableVideo",
    DisableVideo => "disableVideo",
    SetVideoEncoderConfiguration => "setVideoEncoderConfiguration",
    SetupLocalVideo => "setupLocalVideo",
    SetupRemoteVideo => "setupRemoteVideo",
    RemoveNativeView => "removeNativeView",
    SetLocalRenderMode => "setLocalRenderMode",
    SetRemoteRenderMode => "setRemoteRenderMode",
    StartPreview => "startPreview",
    StopPreview => "stopPreview",
    EnableLocalVideo => "enableLocalVideo",
    MuteLocalVideoStream => "muteLocalVideoStream",
    MuteRemoteVideoStream => "muteRemoteVideoStream",
    MuteAllRemoteVideoStreams => "muteAllRemoteVideoStreams",
    SetDefaultMuteAllRemoteVideoStreams => "setDefaultMuteAllRemoteVideoStreams",
    // Audio routing
    SetDefaultAudioRouteToSpeaker => "setDefaultAudioRouteToSpeaker",
    SetEnableSpeakerphone => "setEnableSpeakerphone",
    IsSpeakerphoneEnabled => "isSpeakerphoneEnabled",
    // Stream fallback
    SetRemoteUserPriority => "setRemoteUserPriority",
    SetLocalPublishFallbackOption => "setLocalPublishFallbackOption",
    SetRemoteSubscribeFallbackOption => "setRemoteSubscribeFallbackOption",
    // Dual stream
    EnableDualStreamMode => "enableDualStreamMode",
    SetRemoteVideoStreamType => "setRemoteVideoStreamType",
    SetRemoteDefaultVideoStreamType => "setRemoteDefaultVideoStreamType",
    // Encryption
    SetEncryptionSecret => "setEncryptionSecret",
    SetEncryptionMode => "setEncryptionMode",
    // Camera
    SwitchCamera => "switchCamera",
    // Misc
    GetSdkVersion => "getSdkVersion",
}

impl CommandKind {
    /// Whether the command needs a live engine session
    ///
    /// Only `create` can run without one.
    pub fn requires_session(self) -> bool {
        !matches!(self, CommandKind::Create)
    }
}

/// A decoded command, borrowing strings from the call's arguments
#[derive(Debug, Clone)]
pub enum Command<'a> {
    Create { app_id: &'a str },
    Destroy,

    SetChannelProfile { profile: i32 },
    SetClientRole { role: i32 },
    JoinChannel {
        token: Option<&'a str>,
        channel_id: &'a str,
        info: Option<&'a str>,
        uid: u32,
    },
    LeaveChannel,
    RenewToken { token: &'a str },
    EnableWebSdkInteroperability { enabled: bool },
    GetConnectionState,

    EnableAudio,
    DisableAudio,
    SetAudioProfile { profile: i32, scenario: i32 },
    AdjustRecordingSignalVolume { volume: i32 },
    AdjustPlaybackSignalVolume { volume: i32 },
    EnableAudioVolumeIndication { interval: i32, smooth: i32 },
    EnableLocalAudio { enabled: bool },
    MuteLocalAudioStream { muted: bool },
    MuteRemoteAudioStream { uid: u32, muted: bool },
    MuteAllRemoteAudioStreams { muted: bool },
    SetDefaultMuteAllRemoteAudioStreams { muted: bool },

    SetBeautyEffectOptions { enabled: bool, options: BeautyOptions },

    EnableVideo,
    DisableVideo,
    SetVideoEncoderConfiguration { config: VideoEncoderConfiguration },
    SetupLocalVideo { view_id: i64, render_mode: i32 },
    SetupRemoteVideo { view_id: i64, render_mode: i32, uid: u32 },
    RemoveNativeView { view_id: i64 },
    SetLocalRenderMode { mode: i32 },
    SetRemoteRenderMode { uid: u32, mode: i32 },
    StartPreview,
    StopPreview,
    EnableLocalVideo { enabled: bool },
    MuteLocalVideoStream { muted: bool },
    MuteRemoteVideoStream { uid: u32, muted: bool },
    MuteAllRemoteVideoStreams { muted: bool },
    SetDefaultMuteAllRemoteVideoStreams { muted: bool },

    SetDefaultAudioRouteToSpeaker { default_to_speaker: bool },
    SetEnableSpeakerphone { enabled: bool },
    IsSpeakerphoneEnabled,

    SetRemoteUserPriority { uid: u32, user_priority: i32 },
    SetLocalPublishFallbackOption { option: i32 },
    SetRemoteSubscribeFallbackOption { option: i32 },

    EnableDualStreamMode { enabled: bool },
    SetRemoteVideoStreamType { uid: u32, stream_type: i32 },
    SetRemoteDefaultVideoStreamType { stream_type: i32 },

    SetEncryptionSecret { secret: &'a str },
    SetEncryptionMode { mode: &'a str },

    SwitchCamera,
    GetSdkVersion,
}

impl<'a> Command<'a> {
    /// Validate and decode the declared arguments of `kind`
    ///
    /// Undeclared keys are ignored.
    pub fn decode(kind: CommandKind, args: &'a Arguments) -> Result<Self> {
        use CommandKind as K;

        let args = ArgReader::new(args);

        let command = match kind {
            K::Create => Command::Create {
                app_id: args.string("appId")?,
            },
            K::Destroy => Command::Destroy,

            K::SetChannelProfile => Command::SetChannelProfile {
                profile: args.i32("profile")?,
            },
            K::SetClientRole => Command::SetClientRole {
                role: args.i32("role")?,
            },
            K::JoinChannel => Command::JoinChannel {
                token: args.nullable_string("token")?,
                channel_id: args.string("channelId")?,
                info: args.nullable_string("info")?,
                uid: args.uid("uid")?,
            },
            K::LeaveChannel => Command::LeaveChannel,
            K::RenewToken => Command::RenewToken {
                token: args.string("token")?,
            },
            K::EnableWebSdkInteroperability => Command::EnableWebSdkInteroperability {
                enabled: args.bool("enabled")?,
            },
            K::GetConnectionState => Command::GetConnectionState,

            K::EnableAudio => Command::EnableAudio,
            K::DisableAudio => Command::DisableAudio,
            K::SetAudioProfile => Command::SetAudioProfile {
                profile: args.i32("profile")?,
                scenario: args.i32("scenario")?,
            },
            K::AdjustRecordingSignalVolume => Command::AdjustRecordingSignalVolume {
                volume: args.i32("volume")?,
            },
            K::AdjustPlaybackSignalVolume => Command::AdjustPlaybackSignalVolume {
                volume: args.i32("volume")?,
            },
            K::EnableAudioVolumeIndication => Command::EnableAudioVolumeIndication {
                interval: args.i32("interval")?,
                smooth: args.i32("smooth")?,
            },
            K::EnableLocalAudio => Command::EnableLocalAudio {
                enabled: args.bool("enabled")?,
            },
            K::MuteLocalAudioStream => Command::MuteLocalAudioStream {
                muted: args.bool("muted")?,
            },
            K::MuteRemoteAudioStream => Command::MuteRemoteAudioStream {
                uid: args.uid("uid")?,
                muted: args.bool("muted")?,
            },
            K::MuteAllRemoteAudioStreams => Command::MuteAllRemoteAudioStreams {
                muted: args.bool("muted")?,
            },
            K::SetDefaultMuteAllRemoteAudioStreams => {
                Command::SetDefaultMuteAllRemoteAudioStreams {
                    muted: args.bool("muted")?,
                }
            }

            K::SetBeautyEffectOptions => Command::SetBeautyEffectOptions {
                enabled: args.bool("enabled")?,
                options: decode_beauty_options(&args.map("options")?)?,
            },

            K::EnableVideo => Command::EnableVideo,
            K::DisableVideo => Command::DisableVideo,
            K::SetVideoEncoderConfiguration => Command::SetVideoEncoderConfiguration {
                config: decode_encoder_config(&args.map("config")?)?,
            },
            K::SetupLocalVideo => Command::SetupLocalVideo {
                view_id: args.int("viewId")?,
                render_mode: args.i32("renderMode")?,
            },
            K::SetupRemoteVideo => Command::SetupRemoteVideo {
                view_id: args.int("viewId")?,
                render_mode: args.i32("renderMode")?,
                uid: args.uid("uid")?,
            },
            K::RemoveNativeView => Command::RemoveNativeView {
                view_id: args.int("viewId")?,
            },
            K::SetLocalRenderMode => Command::SetLocalRenderMode {
                mode: args.i32("mode")?,
            },
            K::SetRemoteRenderMode => Command::SetRemoteRenderMode {
                uid: args.uid("uid")?,
                mode: args.i32("mode")?,
            },
            K::StartPreview => Command::StartPreview,
            K::StopPreview => Command::StopPreview,
            K::EnableLocalVideo => Command::EnableLocalVideo {
                enabled: args.bool("enabled")?,
            },
            K::MuteLocalVideoStream => Command::MuteLocalVideoStream {
                muted: args.bool("muted")?,
            },
            K::MuteRemoteVideoStream => Command::MuteRemoteVideoStream {
                uid: args.uid("uid")?,
                muted: args.bool("muted")?,
            },
            K::MuteAllRemoteVideoStreams => Command::MuteAllRemoteVideoStreams {
                muted: args.bool("muted")?,
            },
            K::SetDefaultMuteAllRemoteVideoStreams => {
                Command::SetDefaultMuteAllRemoteVideoStreams {
                    muted: args.bool("muted")?,
                }
            }

            K::SetDefaultAudioRouteToSpeaker => Command::SetDefaultAudioRouteToSpeaker {
                default_to_speaker: args.bool("defaultToSpeaker")?,
            },
            K::SetEnableSpeakerphone => Command::SetEnableSpeakerphone {
                enabled: args.bool("enabled")?,
            },
            K::IsSpeakerphoneEnabled => Command::IsSpeakerphoneEnabled,

            K::SetRemoteUserPriority => Command::SetRemoteUserPriority {
                uid: args.uid("uid")?,
                user_priority: args.i32("userPriority")?,
            },
            K::SetLocalPublishFallbackOption => Command::SetLocalPublishFallbackOption {
                option: args.i32("option")?,
            },
            K::SetRemoteSubscribeFallbackOption => Command::SetRemoteSubscribeFallbackOption {
                option: args.i32("option")?,
            },

            K::EnableDualStreamMode => Command::EnableDualStreamMode {
                enabled: args.bool("enabled")?,
            },
            K::SetRemoteVideoStreamType => Command::SetRemoteVideoStreamType {
                uid: args.uid("uid")?,
                stream_type: args.i32("streamType")?,
            },
            K::SetRemoteDefaultVideoStreamType => Command::SetRemoteDefaultVideoStreamType {
                stream_type: args.i32("streamType")?,
            },

            K::SetEncryptionSecret => Command::SetEncryptionSecret {
                secret: args.string("secret")?,
            },
            K::SetEncryptionMode => Command::SetEncryptionMode {
                mode: args.string("encryptionMode")?,
            },

            K::SwitchCamera => Command::SwitchCamera,
            K::GetSdkVersion => Command::GetSdkVersion,
        };

        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::fields;
    use crate::error::BridgeError;
    use rtc_protocol::Value;

    #[test]
    fn test_names_round_trip() {
        for kind in CommandKind::ALL {
            assert_eq!(CommandKind::from_name(kind.name()), Some(*kind));
        }
        assert_eq!(CommandKind::ALL.len(), 49);
        assert_eq!(CommandKind::from_name("flyToMoon"), None);
    }

    #[test]
    fn test_only_create_is_session_free() {
        let free: Vec<_> = CommandKind::ALL
            .iter()
            .filter(|kind| !kind.requires_session())
            .collect();
        assert_eq!(free, vec![&CommandKind::Create]);
    }

    #[test]
    fn test_join_decodes_nullable_fields() {
        let args = fields([
            ("token", Value::Null),
            ("channelId", "room".into()),
            ("info", "".into()),
            ("uid", 0.into()),
        ]);
        match Command::decode(CommandKind::JoinChannel, &args).unwrap() {
            Command::JoinChannel {
                token,
                channel_id,
                info,
                uid,
            } => {
                assert_eq!(token, None);
                assert_eq!(channel_id, "room");
                assert_eq!(info, Some(""));
                assert_eq!(uid, 0);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_remote_user_priority_keys() {
        let args = fields([("uid", 4.into()), ("userPriority", 50.into())]);
        assert!(matches!(
            Command::decode(CommandKind::SetRemoteUserPriority, &args).unwrap(),
            Command::SetRemoteUserPriority {
                uid: 4,
                user_priority: 50
            }
        ));
    }

    #[test]
    fn test_extra_keys_ignored_missing_keys_named() {
        let args = fields([("muted", true.into()), ("extra", 1.into())]);
        assert!(Command::decode(CommandKind::MuteLocalVideoStream, &args).is_ok());

        let err = Command::decode(CommandKind::MuteRemoteVideoStream, &args).unwrap_err();
        assert_eq!(
            err,
            BridgeError::invalid_argument("uid", "missing required argument")
        );
    }
}
