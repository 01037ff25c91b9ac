//! End-to-end behaviour of the bridge against the loopback engine

use rtc_bridge::codec::fields;
use rtc_bridge::engine::loopback::ERR_INVALID_APP_ID;
use rtc_bridge::marshaller;
use rtc_bridge::{
    CommandDispatcher, CommandKind, EngineCallback, HeadlessSurface, LoopbackEngine,
    LoopbackFactory, SurfaceRegistry,
};
use rtc_protocol::{Arguments, EventMessage, MethodResult, Value};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const DELIVERY_THREAD: &str = "rtc-delivery";
const TIMEOUT: Duration = Duration::from_secs(2);

/// A dispatcher wired to a loopback factory and a spawned delivery thread
struct Harness {
    dispatcher: CommandDispatcher,
    factory: Arc<LoopbackFactory>,
    surfaces: Arc<SurfaceRegistry>,
    events: mpsc::Receiver<(Option<String>, EventMessage)>,
    _delivery: JoinHandle<()>,
}

impl Harness {
    fn new() -> Self {
        let factory = Arc::new(LoopbackFactory::with_sdk_version("9.9.9-test"));
        let surfaces = Arc::new(SurfaceRegistry::new());
        let (marshaller, delivery) = marshaller::channel();
        let (event_tx, events) = mpsc::channel();

        let dispatcher = CommandDispatcher::new(
            factory.clone(),
            surfaces.clone(),
            marshaller,
            Arc::new(move |event: EventMessage| {
                let thread = thread::current().name().map(str::to_string);
                let _ = event_tx.send((thread, event));
            }),
        );

        Self {
            dispatcher,
            factory,
            surfaces,
            events,
            _delivery: delivery.spawn(DELIVERY_THREAD).unwrap(),
        }
    }

    fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    /// Dispatch and wait for the reply, asserting it arrives on the delivery thread
    fn call(&self, method: &str, args: Arguments) -> MethodResult {
        let (tx, rx) = mpsc::channel();
        self.dispatcher().dispatch(method, &args, move |result| {
            let thread = thread::current().name().map(str::to_string);
            let _ = tx.send((thread, result));
        });

        let (thread, result) = rx.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(thread.as_deref(), Some(DELIVERY_THREAD));
        result
    }

    fn create(&self) -> LoopbackEngine {
        let result = self.call("create", fields([("appId", "test-app".into())]));
        assert_eq!(result, MethodResult::Success(None));
        self.factory.last().unwrap()
    }

    /// Wait for the next event called `name`, skipping others
    fn next_event(&self, name: &str) -> EventMessage {
        loop {
            let (thread, event) = self.events.recv_timeout(TIMEOUT).unwrap();
            assert_eq!(thread.as_deref(), Some(DELIVERY_THREAD));
            if event.name == name {
                return event;
            }
        }
    }
}

fn join_args(token: Value, channel: &str, info: Value, uid: i64) -> Arguments {
    fields([
        ("token", token),
        ("channelId", channel.into()),
        ("info", info),
        ("uid", uid.into()),
    ])
}

#[test]
fn create_and_destroy_manage_one_session() {
    let harness = Harness::new();
    assert!(!harness.dispatcher().has_session());

    harness.create();
    assert!(harness.dispatcher().has_session());

    let second = harness.call("create", fields([("appId", "again".into())]));
    assert_eq!(second.error_code(), Some("INVALID_STATE"));
    assert_eq!(harness.factory.created(), 1);

    assert_eq!(harness.call("destroy", Arguments::new()), MethodResult::Success(None));
    assert!(!harness.dispatcher().has_session());

    // A fresh create works after destroy
    harness.create();
    assert_eq!(harness.factory.created(), 2);
}

#[test]
fn session_scoped_commands_need_a_session() {
    let harness = Harness::new();
    let engine = harness.create();
    harness.call("destroy", Arguments::new());
    engine.clear_ops();

    for kind in CommandKind::ALL.iter().filter(|kind| kind.requires_session()) {
        let result = harness.call(kind.name(), Arguments::new());
        assert_eq!(
            result.error_code(),
            Some("INVALID_STATE"),
            "{} should require a session",
            kind.name()
        );
    }

    assert!(engine.ops().is_empty());
}

#[test]
fn unknown_method_is_not_implemented() {
    let harness = Harness::new();
    harness.create();
    assert_eq!(
        harness.call("startWarpDrive", Arguments::new()),
        MethodResult::NotImplemented
    );
}

#[test]
fn construction_failure_is_recoverable() {
    let harness = Harness::new();

    match harness.call("create", fields([("appId", "".into())])) {
        MethodResult::Error { code, details, .. } => {
            assert_eq!(code, "NATIVE_FAILURE");
            assert_eq!(details, Some(Value::Int(ERR_INVALID_APP_ID as i64)));
        }
        other => panic!("unexpected result {:?}", other),
    }
    assert!(!harness.dispatcher().has_session());

    harness.create();
    assert!(harness.dispatcher().has_session());
}

#[test]
fn join_channel_reaches_engine_once() {
    let harness = Harness::new();
    let engine = harness.create();

    let result = harness.call(
        "joinChannel",
        join_args("t".into(), "c", "".into(), 0),
    );
    assert_eq!(result, MethodResult::Success(None));

    let joins = engine.ops_named("joinChannel");
    assert_eq!(joins.len(), 1);
    assert_eq!(
        joins[0].args,
        vec![Value::from("t"), Value::from("c"), Value::from(""), Value::Int(0)]
    );

    let joined = harness.next_event("onJoinChannelSuccess");
    assert_eq!(joined.payload["channel"], Value::from("c"));
}

#[test]
fn join_channel_accepts_null_token_but_requires_key() {
    let harness = Harness::new();
    let engine = harness.create();

    let ok = harness.call("joinChannel", join_args(Value::Null, "c", Value::Null, 5));
    assert!(ok.is_success());
    assert_eq!(engine.ops_named("joinChannel")[0].args[0], Value::Null);

    let mut missing = join_args(Value::Null, "d", Value::Null, 5);
    missing.remove("token");
    match harness.call("joinChannel", missing) {
        MethodResult::Error { code, details, .. } => {
            assert_eq!(code, "INVALID_ARGUMENT");
            assert_eq!(details, Some(Value::from("token")));
        }
        other => panic!("unexpected result {:?}", other),
    }
    assert_eq!(engine.ops_named("joinChannel").len(), 1);
}

#[test]
fn join_callback_becomes_event() {
    let harness = Harness::new();
    let engine = harness.create();

    engine.emit(EngineCallback::JoinChannelSuccess {
        channel: "c".into(),
        uid: 7,
        elapsed: 120,
    });

    let event = harness.next_event("onJoinChannelSuccess");
    assert_eq!(
        event.payload,
        fields([
            ("channel", "c".into()),
            ("uid", 7.into()),
            ("elapsed", 120.into()),
        ])
    );
}

#[test]
fn events_keep_scheduling_order_across_threads() {
    let harness = Harness::new();
    let engine = harness.create();

    let remote = engine.clone();
    thread::spawn(move || remote.emit(EngineCallback::UserJoined { uid: 1, elapsed: 10 }))
        .join()
        .unwrap();
    engine.emit(EngineCallback::UserJoined { uid: 2, elapsed: 20 });

    let first = harness.next_event("onUserJoined");
    let second = harness.next_event("onUserJoined");
    assert_eq!(first.payload["uid"], Value::Int(1));
    assert_eq!(second.payload["uid"], Value::Int(2));
}

#[test]
fn encoder_orientation_falls_back_to_adaptive() {
    let harness = Harness::new();
    let engine = harness.create();

    let config = fields([
        ("width", 640.into()),
        ("height", 360.into()),
        ("frameRate", 15.into()),
        ("bitrate", 400.into()),
        ("minBitrate", 1.into()),
        ("orientationMode", 99.into()),
    ]);
    let result = harness.call(
        "setVideoEncoderConfiguration",
        fields([("config", Value::Map(config))]),
    );
    assert!(result.is_success());

    let op = &engine.ops_named("setVideoEncoderConfiguration")[0];
    assert_eq!(op.args[0], Value::Int(640));
    assert_eq!(op.args[5], Value::Int(0));
}

#[test]
fn beauty_options_keep_fractional_levels() {
    let harness = Harness::new();
    let engine = harness.create();

    let options = fields([
        ("lighteningContrastLevel", 2.into()),
        ("lighteningLevel", 0.5.into()),
        ("smoothnessLevel", 0.25.into()),
        ("rednessLevel", 1.into()),
    ]);
    let result = harness.call(
        "setBeautyEffectOptions",
        fields([("enabled", true.into()), ("options", Value::Map(options))]),
    );
    assert!(result.is_success());

    let op = &engine.ops_named("setBeautyEffectOptions")[0];
    assert_eq!(op.args[1], Value::Int(2));
    assert_eq!(op.args[2], Value::Float(0.5));
    assert_eq!(op.args[3], Value::Float(0.25));
    assert_eq!(op.args[4], Value::Float(1.0));
}

#[test]
fn video_setup_resolves_registered_views() {
    let harness = Harness::new();
    let engine = harness.create();
    let surface = HeadlessSurface::handle("preview");
    harness.surfaces.add(5, &surface);

    let local = harness.call(
        "setupLocalVideo",
        fields([("viewId", 5.into()), ("renderMode", 1.into())]),
    );
    assert!(local.is_success());
    assert_eq!(
        engine.ops_named("setupLocalVideo")[0].args,
        vec![Value::from("preview"), Value::Int(1), Value::Int(0)]
    );

    let removed = harness.call("removeNativeView", fields([("viewId", 5.into())]));
    assert!(removed.is_success());
    assert!(harness.surfaces.is_empty());

    let after = harness.call(
        "setupLocalVideo",
        fields([("viewId", 5.into()), ("renderMode", 1.into())]),
    );
    assert_eq!(after.error_code(), Some("NOT_FOUND"));
    assert_eq!(engine.ops_named("setupLocalVideo").len(), 1);
}

#[test]
fn remote_video_with_unknown_view_is_not_found() {
    let harness = Harness::new();
    let engine = harness.create();

    let result = harness.call(
        "setupRemoteVideo",
        fields([
            ("viewId", 404.into()),
            ("renderMode", 1.into()),
            ("uid", 9.into()),
        ]),
    );
    match result {
        MethodResult::Error { code, details, .. } => {
            assert_eq!(code, "NOT_FOUND");
            assert_eq!(details, Some(Value::Int(404)));
        }
        other => panic!("unexpected result {:?}", other),
    }
    assert!(engine.ops().is_empty());
}

#[test]
fn engine_rejection_carries_native_code() {
    let harness = Harness::new();
    let engine = harness.create();

    match harness.call("setEncryptionMode", fields([("encryptionMode", "rot13".into())])) {
        MethodResult::Error { code, details, .. } => {
            assert_eq!(code, "NATIVE_FAILURE");
            assert_eq!(details, Some(Value::Int(-2)));
        }
        other => panic!("unexpected result {:?}", other),
    }

    engine.reject("switchCamera", -1001);
    let rejected = harness.call("switchCamera", Arguments::new());
    assert_eq!(rejected.error_code(), Some("NATIVE_FAILURE"));
}

#[test]
fn query_commands_return_values() {
    let harness = Harness::new();
    harness.create();

    assert_eq!(
        harness.call("getSdkVersion", Arguments::new()),
        MethodResult::Success(Some(Value::from("9.9.9-test")))
    );

    harness.call("setEnableSpeakerphone", fields([("enabled", true.into())]));
    assert_eq!(
        harness.call("isSpeakerphoneEnabled", Arguments::new()),
        MethodResult::Success(Some(Value::Bool(true)))
    );
    let route = harness.next_event("onAudioRouteChanged");
    assert_eq!(route.payload["routing"], Value::Int(3));
}

#[test]
fn destroyed_session_stops_events() {
    let harness = Harness::new();
    let engine = harness.create();
    harness.call("destroy", Arguments::new());

    engine.emit(EngineCallback::ConnectionLost);
    assert!(harness.events.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn delivery_thread_ends_once_bridge_is_released() {
    let factory = Arc::new(LoopbackFactory::new());
    let (marshaller, delivery) = marshaller::channel();
    let delivery = delivery.spawn(DELIVERY_THREAD).unwrap();
    let dispatcher = CommandDispatcher::new(
        factory.clone(),
        Arc::new(SurfaceRegistry::new()),
        marshaller,
        Arc::new(|_: EventMessage| {}),
    );

    for _ in 0..3 {
        dispatcher
            .handle("create", &fields([("appId", "cycle".into())]))
            .unwrap();
        dispatcher
            .handle("setEnableSpeakerphone", &fields([("enabled", true.into())]))
            .unwrap();
        dispatcher.handle("destroy", &Arguments::new()).unwrap();
        assert!(factory.last().is_none());
    }
    assert_eq!(factory.created(), 3);

    drop(dispatcher);
    let started = std::time::Instant::now();
    while !delivery.is_finished() {
        assert!(started.elapsed() < TIMEOUT, "delivery thread still running");
        thread::sleep(Duration::from_millis(10));
    }
    delivery.join().unwrap();
}
