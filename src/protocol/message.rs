//! Wire messages
//!
//! Requests and responses are JSON objects, one per line. Every request
//! carries a caller-chosen `id` that the matching response echoes, so a
//! client can keep a long poll outstanding while it sends on the same
//! connection.
//!
//! ```text
//! → {"id":7,"call":"send","identity":"alice","text":"hi"}
//! ← {"id":7,"result":"ok","reply":{"type":"sent","ok":true}}
//! → {"id":8,"call":"poll","identity":"bob","timeout_ms":25000,"max_batch":32}
//! ← {"id":8,"result":"error","code":"NOT_REGISTERED","message":"not joined: bob"}
//! ```

use serde::{Deserialize, Serialize};

use crate::broker::{BrokerError, Message};

/// Code sent when a request line cannot be decoded
pub const BAD_REQUEST: &str = "BAD_REQUEST";

/// A call and its correlation id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation id echoed in the response
    pub id: u64,
    #[serde(flatten)]
    pub call: Call,
}

/// The four broker calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum Call {
    Join {
        identity: String,
    },
    Leave {
        identity: String,
    },
    Send {
        identity: String,
        text: String,
    },
    Poll {
        identity: String,
        #[serde(default)]
        timeout_ms: i64,
        #[serde(default)]
        max_batch: i64,
    },
}

impl Call {
    /// Identity the call is made on behalf of
    pub fn identity(&self) -> &str {
        match self {
            Call::Join { identity }
            | Call::Leave { identity }
            | Call::Send { identity, .. }
            | Call::Poll { identity, .. } => identity,
        }
    }

    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Call::Join { .. } => "join",
            Call::Leave { .. } => "leave",
            Call::Send { .. } => "send",
            Call::Poll { .. } => "poll",
        }
    }
}

/// Successful call results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    Joined { ok: bool },
    Left { found: bool },
    Sent { ok: bool },
    Messages { messages: Vec<Message> },
}

/// Response to one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Id of the request this answers (0 if it could not be decoded)
    pub id: u64,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Success or failure of a call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    Ok { reply: Reply },
    Error { code: String, message: String },
}

impl Response {
    /// Successful response
    pub fn ok(id: u64, reply: Reply) -> Self {
        Self {
            id,
            outcome: Outcome::Ok { reply },
        }
    }

    /// Response carrying a broker error
    pub fn error(id: u64, err: &BrokerError) -> Self {
        Self {
            id,
            outcome: Outcome::Error {
                code: err.code().to_string(),
                message: err.to_string(),
            },
        }
    }

    /// Response to a line that could not be decoded
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            id: 0,
            outcome: Outcome::Error {
                code: BAD_REQUEST.to_string(),
                message: message.into(),
            },
        }
    }

    /// Build a response from a call result
    pub fn from_result(id: u64, result: Result<Reply, BrokerError>) -> Self {
        match result {
            Ok(reply) => Self::ok(id, reply),
            Err(err) => Self::error(id, &err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let request = Request {
            id: 7,
            call: Call::Send {
                identity: "alice".into(),
                text: "hi".into(),
            },
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["call"], "send");
        assert_eq!(json["identity"], "alice");
        assert_eq!(json["text"], "hi");
    }

    #[test]
    fn test_poll_defaults_missing_fields() {
        let request: Request =
            serde_json::from_str(r#"{"id":1,"call":"poll","identity":"bob"}"#).unwrap();

        assert_eq!(
            request.call,
            Call::Poll {
                identity: "bob".into(),
                timeout_ms: 0,
                max_batch: 0,
            }
        );
        assert_eq!(request.call.identity(), "bob");
        assert_eq!(request.call.name(), "poll");
    }

    #[test]
    fn test_unknown_call_rejected() {
        let result = serde_json::from_str::<Request>(r#"{"id":1,"call":"shout","identity":"a"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_error_response_shape() {
        let response = Response::error(3, &BrokerError::NotRegistered("bob".into()));

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["result"], "error");
        assert_eq!(json["code"], "NOT_REGISTERED");
        assert_eq!(json["message"], "not joined: bob");
    }

    #[test]
    fn test_ok_response_decodes() {
        let line = r#"{"id":9,"result":"ok","reply":{"type":"left","found":false}}"#;
        let response: Response = serde_json::from_str(line).unwrap();

        assert_eq!(response, Response::ok(9, Reply::Left { found: false }));
    }
}
