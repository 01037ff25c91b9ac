//! The live engine instance and its callback registration

use std::sync::Arc;

use crate::engine::{EngineFactory, EngineResult, RtcEngine};
use crate::events::{EventForwarder, EventSink};
use crate::marshaller::Marshaller;

/// One engine plus the forwarder it reports to
///
/// Dropping the session detaches the forwarder first, so callbacks the engine
/// still raises while shutting down never reach the caller.
pub struct EngineSession {
    app_id: String,
    engine: Box<dyn RtcEngine>,
    forwarder: Arc<EventForwarder>,
}

impl EngineSession {
    /// Construct an engine for `app_id` with a fresh forwarder
    pub fn open(
        factory: &dyn EngineFactory,
        app_id: &str,
        marshaller: Marshaller,
        sink: Arc<dyn EventSink>,
    ) -> EngineResult<Self> {
        let forwarder = Arc::new(EventForwarder::new(marshaller, sink));
        let engine = factory.create(app_id, forwarder.clone())?;

        tracing::info!("Engine session opened for app '{}'", app_id);

        Ok(Self {
            app_id: app_id.to_string(),
            engine,
            forwarder,
        })
    }

    pub fn engine(&self) -> &dyn RtcEngine {
        self.engine.as_ref()
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        self.forwarder.detach();
        tracing::info!("Engine session closed for app '{}'", self.app_id);
    }
}

impl std::fmt::Debug for EngineSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSession")
            .field("app_id", &self.app_id)
            .field("attached", &self.forwarder.is_attached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineCallback;
    use crate::engine::loopback::LoopbackFactory;
    use crate::marshaller;
    use rtc_protocol::EventMessage;

    #[test]
    fn test_drop_detaches_forwarder() {
        let factory = LoopbackFactory::new();
        let (marshaller, delivery) = marshaller::channel();
        let sink: Arc<dyn EventSink> = Arc::new(|_: EventMessage| {});

        let session = EngineSession::open(&factory, "app", marshaller, sink).unwrap();
        assert_eq!(session.app_id(), "app");
        let forwarder = session.forwarder.clone();
        assert!(forwarder.is_attached());
        let engine = factory.last().unwrap();

        drop(session);
        assert!(!forwarder.is_attached());

        // A handle outliving the session can still fire; nothing is queued
        engine.emit(EngineCallback::ConnectionLost);
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(delivery.run_pending(), 0);
    }

    #[test]
    fn test_open_failure_is_reported() {
        let factory = LoopbackFactory::new();
        let (marshaller, _delivery) = marshaller::channel();
        let sink: Arc<dyn EventSink> = Arc::new(|_: EventMessage| {});

        let err = EngineSession::open(&factory, "", marshaller, sink).unwrap_err();
        assert_eq!(err.code, crate::engine::loopback::ERR_INVALID_APP_ID);
    }
}
