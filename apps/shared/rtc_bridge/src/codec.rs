//! Conversion between wire values and native engine types
//!
//! Inbound: [`ArgReader`] pulls typed, validated arguments out of a call's
//! argument bag and names the offending key on failure. Nested maps report
//! keys with a dotted path such as `config.width`.
//!
//! Outbound: [`callback_payload`] turns an [`EngineCallback`] into the flat
//! payload map of its event. Stats structures are nested one level under
//! `stats` or `rect`.

use rtc_protocol::{Arguments, Payload, Value};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::engine::{
    AudioVolumeInfo, BeautyOptions, EngineCallback, LocalVideoStats, OrientationMode, Rect,
    RemoteAudioStats, RemoteVideoStats, RtcStats, VideoDimensions, VideoEncoderConfiguration,
};
use crate::error::{BridgeError, Result};

/// Typed view over a call's arguments
#[derive(Debug, Clone)]
pub struct ArgReader<'a> {
    args: &'a Arguments,
    prefix: Option<String>,
}

impl<'a> ArgReader<'a> {
    pub fn new(args: &'a Arguments) -> Self {
        Self { args, prefix: None }
    }

    fn key_name(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}.{}", prefix, key),
            None => key.to_string(),
        }
    }

    fn invalid(&self, key: &str, reason: impl Into<String>) -> BridgeError {
        BridgeError::invalid_argument(self.key_name(key), reason)
    }

    fn mismatch(&self, key: &str, expected: &str, got: &Value) -> BridgeError {
        self.invalid(key, format!("expected {}, got {}", expected, got.kind()))
    }

    /// The raw value under `key`; absence is an error
    pub fn value(&self, key: &str) -> Result<&'a Value> {
        self.args
            .get(key)
            .ok_or_else(|| self.invalid(key, "missing required argument"))
    }

    pub fn bool(&self, key: &str) -> Result<bool> {
        let value = self.value(key)?;
        value
            .as_bool()
            .ok_or_else(|| self.mismatch(key, "bool", value))
    }

    /// Integer argument; integral floats are accepted
    pub fn int(&self, key: &str) -> Result<i64> {
        let value = self.value(key)?;
        match value {
            Value::Int(i) => Ok(*i),
            Value::Float(f) if f.is_finite() && f.fract() == 0.0 => {
                if *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                    Ok(*f as i64)
                } else {
                    Err(self.invalid(key, format!("{} does not fit an integer", f)))
                }
            }
            Value::Float(f) => Err(self.invalid(key, format!("{} is not an integral number", f))),
            other => Err(self.mismatch(key, "int", other)),
        }
    }

    pub fn i32(&self, key: &str) -> Result<i32> {
        let raw = self.int(key)?;
        i32::try_from(raw).map_err(|_| self.invalid(key, format!("{} out of 32-bit range", raw)))
    }

    /// User id: an unsigned 32-bit integer
    pub fn uid(&self, key: &str) -> Result<u32> {
        let raw = self.int(key)?;
        u32::try_from(raw).map_err(|_| self.invalid(key, format!("{} is not a valid uid", raw)))
    }

    /// Float argument narrowed to `f32`; integers are accepted
    pub fn f32(&self, key: &str) -> Result<f32> {
        let value = self.value(key)?;
        value
            .as_f64()
            .map(|f| f as f32)
            .ok_or_else(|| self.mismatch(key, "number", value))
    }

    pub fn string(&self, key: &str) -> Result<&'a str> {
        let value = self.value(key)?;
        value
            .as_str()
            .ok_or_else(|| self.mismatch(key, "string", value))
    }

    /// A string that may be explicitly null; the key itself is still required
    pub fn nullable_string(&self, key: &str) -> Result<Option<&'a str>> {
        let value = self.value(key)?;
        match value {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            other => Err(self.mismatch(key, "string or null", other)),
        }
    }

    /// Reader over the nested map stored under `key`
    pub fn map(&self, key: &str) -> Result<ArgReader<'a>> {
        let value = self.value(key)?;
        let map = value
            .as_map()
            .ok_or_else(|| self.mismatch(key, "map", value))?;
        Ok(ArgReader {
            args: map,
            prefix: Some(self.key_name(key)),
        })
    }
}

/// Decode `{width, height, frameRate, bitrate, minBitrate, orientationMode}`
pub fn decode_encoder_config(config: &ArgReader<'_>) -> Result<VideoEncoderConfiguration> {
    Ok(VideoEncoderConfiguration {
        dimensions: VideoDimensions {
            width: config.i32("width")?,
            height: config.i32("height")?,
        },
        frame_rate: config.i32("frameRate")?,
        bitrate: config.i32("bitrate")?,
        min_bitrate: config.i32("minBitrate")?,
        orientation_mode: OrientationMode::from_wire(config.int("orientationMode")?),
    })
}

/// Decode `{lighteningContrastLevel, lighteningLevel, smoothnessLevel, rednessLevel}`
pub fn decode_beauty_options(options: &ArgReader<'_>) -> Result<BeautyOptions> {
    Ok(BeautyOptions {
        lightening_contrast_level: options.i32("lighteningContrastLevel")?,
        lightening_level: options.f32("lighteningLevel")?,
        smoothness_level: options.f32("smoothnessLevel")?,
        redness_level: options.f32("rednessLevel")?,
    })
}

/// Why a callback could not become an event
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("stream message from uid {uid} on stream {stream_id} is not valid UTF-8: {source}")]
    InvalidUtf8 {
        uid: u32,
        stream_id: i32,
        source: std::str::Utf8Error,
    },
}

/// Build a payload map from a fixed list of entries
pub fn fields<const N: usize>(entries: [(&str, Value); N]) -> Payload {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

pub fn rtc_stats_value(stats: &RtcStats) -> Value {
    Value::Map(fields([
        ("duration", stats.duration.into()),
        ("txBytes", stats.tx_bytes.into()),
        ("rxBytes", stats.rx_bytes.into()),
        ("txAudioKBitrate", stats.tx_audio_kbitrate.into()),
        ("rxAudioKBitrate", stats.rx_audio_kbitrate.into()),
        ("txVideoKBitrate", stats.tx_video_kbitrate.into()),
        ("rxVideoKBitrate", stats.rx_video_kbitrate.into()),
        ("txPacketLossRate", stats.tx_packet_loss_rate.into()),
        ("rxPacketLossRate", stats.rx_packet_loss_rate.into()),
        ("lastmileDelay", stats.lastmile_delay.into()),
        ("userCount", stats.user_count.into()),
        ("cpuAppUsage", stats.cpu_app_usage.into()),
        ("cpuTotalUsage", stats.cpu_total_usage.into()),
    ]))
}

pub fn rect_value(rect: &Rect) -> Value {
    Value::Map(fields([
        ("x", rect.x.into()),
        ("y", rect.y.into()),
        ("width", rect.width.into()),
        ("height", rect.height.into()),
    ]))
}

pub fn local_video_stats_value(stats: &LocalVideoStats) -> Value {
    Value::Map(fields([
        ("sentBitrate", stats.sent_bitrate.into()),
        ("sentFrameRate", stats.sent_frame_rate.into()),
        ("encoderOutputFrameRate", stats.encoder_output_frame_rate.into()),
        ("rendererOutputFrameRate", stats.renderer_output_frame_rate.into()),
    ]))
}

pub fn remote_video_stats_value(stats: &RemoteVideoStats) -> Value {
    Value::Map(fields([
        ("uid", stats.uid.into()),
        ("width", stats.width.into()),
        ("height", stats.height.into()),
        ("receivedBitrate", stats.received_bitrate.into()),
        ("decoderOutputFrameRate", stats.decoder_output_frame_rate.into()),
        ("rendererOutputFrameRate", stats.renderer_output_frame_rate.into()),
        ("rxStreamType", stats.rx_stream_type.into()),
    ]))
}

pub fn remote_audio_stats_value(stats: &RemoteAudioStats) -> Value {
    Value::Map(fields([
        ("uid", stats.uid.into()),
        ("quality", stats.quality.into()),
        ("networkTransportDelay", stats.network_transport_delay.into()),
        ("jitterBufferDelay", stats.jitter_buffer_delay.into()),
        ("audioLossRate", stats.audio_loss_rate.into()),
    ]))
}

fn speakers_value(speakers: &[AudioVolumeInfo]) -> Value {
    Value::List(
        speakers
            .iter()
            .map(|speaker| {
                let mut entry = BTreeMap::new();
                entry.insert("uid".to_string(), speaker.uid.into());
                entry.insert("volume".to_string(), speaker.volume.into());
                Value::Map(entry)
            })
            .collect(),
    )
}

/// Payload of the event raised for `callback`
pub fn callback_payload(callback: &EngineCallback) -> std::result::Result<Payload, PayloadError> {
    use EngineCallback as C;

    let payload = match callback {
        C::Warning { warn } => fields([("warn", (*warn).into())]),
        C::Error { err } => fields([("err", (*err).into())]),
        C::JoinChannelSuccess { channel, uid, elapsed }
        | C::RejoinChannelSuccess { channel, uid, elapsed } => fields([
            ("channel", channel.as_str().into()),
            ("uid", (*uid).into()),
            ("elapsed", (*elapsed).into()),
        ]),
        C::LeaveChannel { stats } | C::RtcStats { stats } => {
            fields([("stats", rtc_stats_value(stats))])
        }
        C::ClientRoleChanged { old_role, new_role } => fields([
            ("oldRole", (*old_role).into()),
            ("newRole", (*new_role).into()),
        ]),
        C::UserJoined { uid, elapsed } => {
            fields([("uid", (*uid).into()), ("elapsed", (*elapsed).into())])
        }
        C::UserOffline { uid, reason } => {
            fields([("uid", (*uid).into()), ("reason", (*reason).into())])
        }
        C::ConnectionStateChanged { state, reason } => {
            fields([("state", (*state).into()), ("reason", (*reason).into())])
        }
        C::NetworkTypeChanged { network_type } => fields([("type", (*network_type).into())]),
        C::ApiCallExecuted { error, api, result } => fields([
            ("error", (*error).into()),
            ("api", api.as_str().into()),
            ("result", result.as_str().into()),
        ]),
        C::TokenPrivilegeWillExpire { token } => fields([("token", token.as_str().into())]),
        C::MicrophoneEnabled { enabled } => fields([("enabled", (*enabled).into())]),
        C::AudioVolumeIndication {
            speakers,
            total_volume,
        } => fields([
            ("totalVolume", (*total_volume).into()),
            ("speakers", speakers_value(speakers)),
        ]),
        C::ActiveSpeaker { uid } => fields([("uid", (*uid).into())]),
        C::FirstLocalAudioFrame { elapsed } => fields([("elapsed", (*elapsed).into())]),
        C::FirstRemoteAudioFrame { uid, elapsed } | C::FirstRemoteAudioDecoded { uid, elapsed } => {
            fields([("uid", (*uid).into()), ("elapsed", (*elapsed).into())])
        }
        C::FirstLocalVideoFrame {
            width,
            height,
            elapsed,
        } => fields([
            ("width", (*width).into()),
            ("height", (*height).into()),
            ("elapsed", (*elapsed).into()),
        ]),
        C::FirstRemoteVideoDecoded {
            uid,
            width,
            height,
            elapsed,
        }
        | C::FirstRemoteVideoFrame {
            uid,
            width,
            height,
            elapsed,
        } => fields([
            ("uid", (*uid).into()),
            ("width", (*width).into()),
            ("height", (*height).into()),
            ("elapsed", (*elapsed).into()),
        ]),
        C::UserMuteAudio { uid, muted } | C::UserMuteVideo { uid, muted } => {
            fields([("uid", (*uid).into()), ("muted", (*muted).into())])
        }
        C::UserEnableVideo { uid, enabled } | C::UserEnableLocalVideo { uid, enabled } => {
            fields([("uid", (*uid).into()), ("enabled", (*enabled).into())])
        }
        C::VideoSizeChanged {
            uid,
            width,
            height,
            rotation,
        } => fields([
            ("uid", (*uid).into()),
            ("width", (*width).into()),
            ("height", (*height).into()),
            ("rotation", (*rotation).into()),
        ]),
        C::RemoteVideoStateChanged { uid, state } => {
            fields([("uid", (*uid).into()), ("state", (*state).into())])
        }
        C::LocalPublishFallbackToAudioOnly {
            is_fallback_or_recover,
        } => fields([("isFallbackOrRecover", (*is_fallback_or_recover).into())]),
        C::RemoteSubscribeFallbackToAudioOnly {
            uid,
            is_fallback_or_recover,
        } => fields([
            ("uid", (*uid).into()),
            ("isFallbackOrRecover", (*is_fallback_or_recover).into()),
        ]),
        C::AudioRouteChanged { routing } => fields([("routing", (*routing).into())]),
        C::CameraFocusAreaChanged { rect } | C::CameraExposureAreaChanged { rect } => {
            fields([("rect", rect_value(rect))])
        }
        C::LastmileQuality { quality } => fields([("quality", (*quality).into())]),
        C::NetworkQuality {
            uid,
            tx_quality,
            rx_quality,
        } => fields([
            ("uid", (*uid).into()),
            ("txQuality", (*tx_quality).into()),
            ("rxQuality", (*rx_quality).into()),
        ]),
        C::LocalVideoStats { stats } => fields([("stats", local_video_stats_value(stats))]),
        C::RemoteVideoStats { stats } => fields([("stats", remote_video_stats_value(stats))]),
        C::RemoteAudioStats { stats } => fields([("stats", remote_audio_stats_value(stats))]),
        C::RemoteAudioTransportStats {
            uid,
            delay,
            lost,
            rx_kbit_rate,
        }
        | C::RemoteVideoTransportStats {
            uid,
            delay,
            lost,
            rx_kbit_rate,
        } => fields([
            ("uid", (*uid).into()),
            ("delay", (*delay).into()),
            ("lost", (*lost).into()),
            ("rxKBitRate", (*rx_kbit_rate).into()),
        ]),
        C::LocalVideoStateChanged {
            local_video_state,
            error,
        } => fields([
            ("localVideoState", (*local_video_state).into()),
            ("error", (*error).into()),
        ]),
        C::AudioEffectFinished { sound_id } => fields([("soundId", (*sound_id).into())]),
        C::StreamPublished { url, error } => {
            fields([("url", url.as_str().into()), ("error", (*error).into())])
        }
        C::StreamUnpublished { url } => fields([("url", url.as_str().into())]),
        C::StreamInjectedStatus { url, uid, status } => fields([
            ("url", url.as_str().into()),
            ("uid", (*uid).into()),
            ("status", (*status).into()),
        ]),
        C::StreamMessage {
            uid,
            stream_id,
            data,
        } => {
            let message =
                std::str::from_utf8(data).map_err(|source| PayloadError::InvalidUtf8 {
                    uid: *uid,
                    stream_id: *stream_id,
                    source,
                })?;
            fields([
                ("uid", (*uid).into()),
                ("streamId", (*stream_id).into()),
                ("message", message.into()),
            ])
        }
        C::StreamMessageError {
            uid,
            stream_id,
            error,
            missed,
            cached,
        } => fields([
            ("uid", (*uid).into()),
            ("streamId", (*stream_id).into()),
            ("error", (*error).into()),
            ("missed", (*missed).into()),
            ("cached", (*cached).into()),
        ]),
        C::ConnectionLost
        | C::RequestToken
        | C::TranscodingUpdated
        | C::MediaEngineLoadSuccess
        | C::MediaEngineStartCallSuccess => Payload::new(),
    };

    Ok(payload)
}
