//! Engine callbacks to caller events
//!
//! The [`EventForwarder`] is the engine's [`EngineEventHandler`]. It runs on
//! whatever thread the engine calls from, so it only does three cheap things:
//! look up the event name, build the payload and hand the result to the
//! [`Marshaller`]. Delivery happens later on the delivery thread.

use rtc_protocol::EventMessage;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::codec::callback_payload;
use crate::engine::{CallbackKind, EngineCallback, EngineEventHandler};
use crate::marshaller::Marshaller;

/// Outbound event name per callback kind, indexed by `CallbackKind as usize`
pub const EVENT_NAMES: [&str; CallbackKind::COUNT] = [
    "onWarning",
    "onError",
    "onJoinChannelSuccess",
    "onRejoinChannelSuccess",
    "onLeaveChannel",
    "onClientRoleChanged",
    "onUserJoined",
    "onUserOffline",
    "onConnectionStateChanged",
    "onConnectionLost",
    "onNetworkTypeChanged",
    "onApiCallExecuted",
    "onTokenPrivilegeWillExpire",
    "onRequestToken",
    "onMicrophoneEnabled",
    "onAudioVolumeIndication",
    "onActiveSpeaker",
    "onFirstLocalAudioFrame",
    "onFirstRemoteAudioFrame",
    "onFirstRemoteAudioDecoded",
    "onFirstLocalVideoFrame",
    "onFirstRemoteVideoDecoded",
    "onFirstRemoteVideoFrame",
    "onUserMuteAudio",
    "onUserMuteVideo",
    "onUserEnableVideo",
    "onUserEnableLocalVideo",
    "onVideoSizeChanged",
    "onRemoteVideoStateChanged",
    "onLocalPublishFallbackToAudioOnly",
    "onRemoteSubscribeFallbackToAudioOnly",
    "onAudioRouteChanged",
    "onCameraFocusAreaChanged",
    "onCameraExposureAreaChanged",
    "onRtcStats",
    "onLastmileQuality",
    "onNetworkQuality",
    "onLocalVideoStats",
    "onRemoteVideoStats",
    "onRemoteAudioStats",
    "onRemoteAudioTransportStats",
    "onRemoteVideoTransportStats",
    "onLocalVideoStateChanged",
    "onAudioEffectFinished",
    "onStreamPublished",
    "onStreamUnpublished",
    "onTranscodingUpdated",
    "onStreamInjectedStatus",
    "onStreamMessage",
    "onStreamMessageError",
    "onMediaEngineLoadSuccess",
    "onMediaEngineStartCallSuccess",
];

pub fn event_name(kind: CallbackKind) -> &'static str {
    EVENT_NAMES[kind.index()]
}

/// Final destination of events, invoked on the delivery thread
pub trait EventSink: Send + Sync {
    fn deliver(&self, event: EventMessage);
}

impl<F> EventSink for F
where
    F: Fn(EventMessage) + Send + Sync,
{
    fn deliver(&self, event: EventMessage) {
        self(event)
    }
}

/// Callback receiver registered with the engine for one session
pub struct EventForwarder {
    marshaller: Marshaller,
    sink: Arc<dyn EventSink>,
    attached: AtomicBool,
}

impl EventForwarder {
    pub fn new(marshaller: Marshaller, sink: Arc<dyn EventSink>) -> Self {
        Self {
            marshaller,
            sink,
            attached: AtomicBool::new(true),
        }
    }

    /// Stop forwarding; callbacks arriving afterwards are discarded
    pub fn detach(&self) {
        self.attached.store(false, Ordering::Release);
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    fn forward(&self, callback: EngineCallback) {
        let name = event_name(callback.kind());

        let payload = match callback_payload(&callback) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(event = name, "Dropping event: {}", e);
                return;
            }
        };

        let sink = self.sink.clone();
        let event = EventMessage::new(name, payload);
        if self.marshaller.schedule(move || sink.deliver(event)).is_err() {
            tracing::warn!(event = name, "Dropping event: delivery loop has shut down");
        }
    }
}

impl EngineEventHandler for EventForwarder {
    fn on_callback(&self, callback: EngineCallback) {
        if !self.is_attached() {
            tracing::trace!("Callback {:?} after detach ignored", callback.kind());
            return;
        }
        self.forward(callback);
    }
}
