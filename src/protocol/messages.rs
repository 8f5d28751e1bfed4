//! Protocol messages for client-server communication.
//!
//! Every message is an [`Event`]: a type tag plus a flat map of arguments,
//! serialized as JSON over WebSocket:
//!
//! ```json
//! {"event_type": "guess", "args": {"variant": 2}}
//! ```
//!
//! The same shape travels in both directions.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtocolError;

/// Named arguments of an event.
pub type EventArgs = Map<String, Value>;

pub const REGISTER: &str = "register";
pub const UNREGISTER: &str = "unregister";
pub const GUESS: &str = "guess";
pub const STATUS: &str = "status";
pub const QUESTION: &str = "question";
pub const GUESSED: &str = "guessed";
pub const ERROR: &str = "error";
pub const CONNECTION_CLOSED: &str = "connection_closed";

/// A tagged message exchanged over the transport channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: String,
    pub args: EventArgs,
}

impl Event {
    /// Create an event without arguments.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            args: EventArgs::new(),
        }
    }

    /// Add an argument, builder style.
    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }

    /// Serialize to the wire representation.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse the wire representation.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn status(registered: bool) -> Self {
        Self::new(STATUS).with_arg("registered", registered)
    }

    pub fn question(number_of_variants: u32) -> Self {
        Self::new(QUESTION).with_arg("number_of_variants", number_of_variants)
    }

    pub fn guessed(score: u64, correct: bool) -> Self {
        Self::new(GUESSED)
            .with_arg("score", score)
            .with_arg("correct", correct)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(ERROR).with_arg("text", text.into())
    }

    pub fn connection_closed(reason: impl Into<String>) -> Self {
        Self::new(CONNECTION_CLOSED).with_arg("reason", reason.into())
    }
}

/// Client requests the server acts upon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Register { name: String },
    Unregister,
    Guess { variant: u32 },
}

impl Request {
    /// Interpret an inbound event.
    ///
    /// Returns `Ok(None)` for tags the server does not know, so newer clients
    /// can send events this server ignores.
    pub fn from_event(event: &Event) -> Result<Option<Self>, ProtocolError> {
        let request = match event.event_type.as_str() {
            REGISTER => {
                let name = required(event, "name")?
                    .as_str()
                    .ok_or_else(|| invalid(event, "name"))?;
                Request::Register {
                    name: name.to_string(),
                }
            }
            UNREGISTER => Request::Unregister,
            GUESS => {
                let variant = required(event, "variant")?
                    .as_u64()
                    .and_then(|v| u32::try_from(v).ok())
                    .ok_or_else(|| invalid(event, "variant"))?;
                Request::Guess { variant }
            }
            _ => return Ok(None),
        };

        Ok(Some(request))
    }
}

fn required<'a>(event: &'a Event, argument: &'static str) -> Result<&'a Value, ProtocolError> {
    event.arg(argument).ok_or_else(|| ProtocolError::MissingArgument {
        event_type: event.event_type.clone(),
        argument,
    })
}

fn invalid(event: &Event, argument: &'static str) -> ProtocolError {
    ProtocolError::InvalidArgument {
        event_type: event.event_type.clone(),
        argument,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_shape() {
        let json: Value = serde_json::from_str(&Event::guessed(1200, true).encode().unwrap()).unwrap();
        assert_eq!(
            json,
            json!({"event_type": "guessed", "args": {"score": 1200, "correct": true}})
        );
    }

    #[test]
    fn test_encode_then_decode_server_event() {
        let event = Event::connection_closed("server is shutting down");
        let text = event.encode().unwrap();
        assert!(!text.is_empty());
        assert_eq!(Event::decode(&text).unwrap(), event);
    }

    #[test]
    fn test_decode_client_event() {
        let event = Event::decode(r#"{"event_type":"register","args":{"name":"Alice"}}"#).unwrap();
        assert_eq!(event.event_type, "register");
        assert_eq!(event.arg("name"), Some(&json!("Alice")));
    }

    #[test]
    fn test_decode_rejects_missing_fields() {
        assert!(matches!(
            Event::decode(r#"{"event_type":"register"}"#),
            Err(ProtocolError::MalformedMessage(_))
        ));
        assert!(matches!(
            Event::decode(r#"{"args":{}}"#),
            Err(ProtocolError::MalformedMessage(_))
        ));
        assert!(Event::decode(r#"{"event_type":"register","args":[1,2]}"#).is_err());
        assert!(Event::decode("not json").is_err());
    }

    #[test]
    fn test_request_parsing() {
        let register = Event::new(REGISTER).with_arg("name", "Bob");
        assert_eq!(
            Request::from_event(&register).unwrap(),
            Some(Request::Register {
                name: "Bob".to_string()
            })
        );

        let guess = Event::new(GUESS).with_arg("variant", 3);
        assert_eq!(
            Request::from_event(&guess).unwrap(),
            Some(Request::Guess { variant: 3 })
        );

        assert_eq!(
            Request::from_event(&Event::new(UNREGISTER)).unwrap(),
            Some(Request::Unregister)
        );
    }

    #[test]
    fn test_unknown_event_is_ignored() {
        assert_eq!(Request::from_event(&Event::new("dance")).unwrap(), None);
    }

    #[test]
    fn test_request_argument_errors() {
        assert!(matches!(
            Request::from_event(&Event::new(REGISTER)),
            Err(ProtocolError::MissingArgument { argument: "name", .. })
        ));
        assert!(matches!(
            Request::from_event(&Event::new(GUESS).with_arg("variant", "two")),
            Err(ProtocolError::InvalidArgument { argument: "variant", .. })
        ));
        assert!(matches!(
            Request::from_event(&Event::new(GUESS).with_arg("variant", -1)),
            Err(ProtocolError::InvalidArgument { argument: "variant", .. })
        ));
    }
}
