use serde::{Deserialize, Serialize};

use crate::value::{Arguments, Payload, Value};

/// Inbound request from the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    /// Caller-chosen correlation id, echoed in the reply
    pub id: u64,
    /// Method name (e.g. "joinChannel")
    pub method: String,
    /// Named arguments
    pub arguments: Arguments,
}

impl MethodCall {
    pub fn new(id: u64, method: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            id,
            method: method.into(),
            arguments,
        }
    }

    /// Builder-style helper to add one argument
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }
}

/// The single response to a method call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MethodResult {
    /// Call completed; optional return value
    Success(Option<Value>),
    /// Call failed before or inside the engine
    Error {
        code: String,
        message: String,
        details: Option<Value>,
    },
    /// The method name is not known to the bridge
    NotImplemented,
}

impl MethodResult {
    pub fn is_success(&self) -> bool {
        matches!(self, MethodResult::Success(_))
    }

    /// Error code, if this is an error result
    pub fn error_code(&self) -> Option<&str> {
        match self {
            MethodResult::Error { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// Unsolicited push from the bridge to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    pub name: String,
    pub payload: Payload,
}

impl EventMessage {
    pub fn new(name: impl Into<String>, payload: Payload) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

/// Everything that travels over a method channel connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChannelMessage {
    // Caller -> Bridge
    /// Method call request
    Call(MethodCall),

    // Bridge -> Caller
    /// Response to the call with the same id
    Reply { id: u64, result: MethodResult },
    /// Pushed engine event
    Event(EventMessage),
}

impl ChannelMessage {
    /// Serialize message to bytes using bincode
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize message from bytes using bincode
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_nested_call_survives_encoding() {
        let mut config = BTreeMap::new();
        config.insert("width".to_string(), Value::Int(640));
        config.insert("frameRate".to_string(), Value::Float(15.0));

        let call = MethodCall::new(9, "setVideoEncoderConfiguration", Arguments::new())
            .with_arg("config", Value::Map(config));
        let message = ChannelMessage::Call(call);

        let bytes = message.to_bytes().unwrap();
        assert_eq!(ChannelMessage::from_bytes(&bytes).unwrap(), message);
    }

    #[test]
    fn test_error_code_accessor() {
        let result = MethodResult::Error {
            code: "NOT_FOUND".into(),
            message: "no view".into(),
            details: None,
        };
        assert_eq!(result.error_code(), Some("NOT_FOUND"));
        assert!(!result.is_success());
        assert_eq!(MethodResult::Success(None).error_code(), None);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(ChannelMessage::from_bytes(&[0xff, 0xff, 0xff, 0xff, 0x01]).is_err());
    }
}
