//! Text framing for the two wire encodings.
//!
//! JSON frames follow the OCPP-J array layout. SOAP frames wrap the same JSON
//! payload in an envelope whose headers carry the action and message ids.

use crate::error::TransportError;
use ocpp_core::{Action, TransportKind};
use serde_json::{json, Value};

const CALL: u64 = 2;
const CALL_RESULT: u64 = 3;
const CALL_ERROR: u64 = 4;

const SOAP_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
const SOAP_RESPONSE_ACTION: &str = "/Response";
const SOAP_FAULT_ACTION: &str = "/Fault";

/// One protocol frame, independent of encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Call {
        message_id: String,
        action: Action,
        payload: Value,
    },
    CallResult {
        message_id: String,
        payload: Value,
    },
    CallError {
        message_id: String,
        code: String,
        description: String,
    },
}

impl Frame {
    pub fn message_id(&self) -> &str {
        match self {
            Frame::Call { message_id, .. }
            | Frame::CallResult { message_id, .. }
            | Frame::CallError { message_id, .. } => message_id,
        }
    }
}

/// Encodes and decodes frames for one [`TransportKind`].
#[derive(Debug, Clone, Copy)]
pub struct WireCodec {
    kind: TransportKind,
}

impl WireCodec {
    pub fn new(kind: TransportKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn encode(&self, frame: &Frame) -> Result<String, TransportError> {
        match self.kind {
            TransportKind::Json => encode_json(frame),
            TransportKind::Soap => encode_soap(frame),
        }
    }

    pub fn decode(&self, text: &str) -> Result<Frame, TransportError> {
        match self.kind {
            TransportKind::Json => decode_json(text),
            TransportKind::Soap => decode_soap(text),
        }
    }
}

fn codec_error(e: impl std::fmt::Display) -> TransportError {
    TransportError::Codec(e.to_string())
}

fn encode_json(frame: &Frame) -> Result<String, TransportError> {
    let value = match frame {
        Frame::Call {
            message_id,
            action,
            payload,
        } => json!([CALL, message_id, action.as_str(), payload]),
        Frame::CallResult {
            message_id,
            payload,
        } => json!([CALL_RESULT, message_id, payload]),
        Frame::CallError {
            message_id,
            code,
            description,
        } => json!([CALL_ERROR, message_id, code, description, {}]),
    };
    serde_json::to_string(&value).map_err(codec_error)
}

fn decode_json(text: &str) -> Result<Frame, TransportError> {
    let value: Value = serde_json::from_str(text).map_err(codec_error)?;
    let items = value
        .as_array()
        .ok_or_else(|| codec_error("frame is not an array"))?;

    let string_at = |index: usize, what: &str| -> Result<String, TransportError> {
        items
            .get(index)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| codec_error(format!("missing {what}")))
    };

    let message_type = items
        .first()
        .and_then(Value::as_u64)
        .ok_or_else(|| codec_error("missing message type"))?;
    let message_id = string_at(1, "message id")?;

    match message_type {
        CALL => {
            let action = string_at(2, "action")?.parse().map_err(codec_error)?;
            let payload = items.get(3).cloned().unwrap_or_else(|| json!({}));
            Ok(Frame::Call {
                message_id,
                action,
                payload,
            })
        }
        CALL_RESULT => Ok(Frame::CallResult {
            message_id,
            payload: items.get(2).cloned().unwrap_or_else(|| json!({})),
        }),
        CALL_ERROR => Ok(Frame::CallError {
            message_id,
            code: string_at(2, "error code")?,
            description: string_at(3, "error description").unwrap_or_default(),
        }),
        other => Err(codec_error(format!("unknown message type {other}"))),
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn envelope(action: &str, id_header: &str, message_id: &str, body: &str) -> String {
    format!(
        "<s:Envelope xmlns:s=\"{SOAP_NS}\"><s:Header><Action>{}</Action><{id_header}>{}</{id_header}></s:Header><s:Body>{body}</s:Body></s:Envelope>",
        escape(action),
        escape(message_id),
    )
}

fn encode_soap(frame: &Frame) -> Result<String, TransportError> {
    let text = match frame {
        Frame::Call {
            message_id,
            action,
            payload,
        } => {
            let body = serde_json::to_string(payload).map_err(codec_error)?;
            envelope(
                &format!("/{}", action.as_str()),
                "MessageID",
                message_id,
                &escape(&body),
            )
        }
        Frame::CallResult {
            message_id,
            payload,
        } => {
            let body = serde_json::to_string(payload).map_err(codec_error)?;
            envelope(SOAP_RESPONSE_ACTION, "RelatesTo", message_id, &escape(&body))
        }
        Frame::CallError {
            message_id,
            code,
            description,
        } => {
            let fault = format!(
                "<s:Fault><s:Code>{}</s:Code><s:Reason>{}</s:Reason></s:Fault>",
                escape(code),
                escape(description)
            );
            envelope(SOAP_FAULT_ACTION, "RelatesTo", message_id, &fault)
        }
    };
    Ok(text)
}

/// Text between `<tag>` and the following `</tag>`.
fn element<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = text.find(&open)? + open.len();
    let end = text[start..].find(&close)? + start;
    Some(&text[start..end])
}

fn decode_soap(text: &str) -> Result<Frame, TransportError> {
    if !text.starts_with("<s:Envelope") {
        return Err(codec_error("not a SOAP envelope"));
    }
    let header = element(text, "s:Header").ok_or_else(|| codec_error("missing header"))?;
    let body = element(text, "s:Body").ok_or_else(|| codec_error("missing body"))?;
    let action = element(header, "Action")
        .map(unescape)
        .ok_or_else(|| codec_error("missing Action header"))?;

    let parse_body = |body: &str| -> Result<Value, TransportError> {
        serde_json::from_str(&unescape(body)).map_err(codec_error)
    };

    match action.as_str() {
        SOAP_RESPONSE_ACTION | SOAP_FAULT_ACTION => {
            let message_id = element(header, "RelatesTo")
                .map(unescape)
                .ok_or_else(|| codec_error("missing RelatesTo header"))?;
            if action == SOAP_RESPONSE_ACTION {
                return Ok(Frame::CallResult {
                    message_id,
                    payload: parse_body(body)?,
                });
            }
            let fault = element(body, "s:Fault").ok_or_else(|| codec_error("missing Fault"))?;
            Ok(Frame::CallError {
                message_id,
                code: element(fault, "s:Code").map(unescape).unwrap_or_default(),
                description: element(fault, "s:Reason").map(unescape).unwrap_or_default(),
            })
        }
        call => {
            let message_id = element(header, "MessageID")
                .map(unescape)
                .ok_or_else(|| codec_error("missing MessageID header"))?;
            let action = call
                .strip_prefix('/')
                .unwrap_or(call)
                .parse()
                .map_err(codec_error)?;
            Ok(Frame::Call {
                message_id,
                action,
                payload: parse_body(body)?,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_transfer_call() -> Frame {
        Frame::Call {
            message_id: "42".to_string(),
            action: Action::DataTransfer,
            payload: json!({ "vendorId": "acme", "data": "<a & b>" }),
        }
    }

    #[test]
    fn test_json_call_uses_ocpp_j_layout() {
        let codec = WireCodec::new(TransportKind::Json);
        let text = codec.encode(&data_transfer_call()).unwrap();
        let raw: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(raw[0], json!(2));
        assert_eq!(raw[1], json!("42"));
        assert_eq!(raw[2], json!("DataTransfer"));
        assert_eq!(codec.decode(&text).unwrap(), data_transfer_call());
    }

    #[test]
    fn test_soap_call_escapes_body_and_carries_action_header() {
        let codec = WireCodec::new(TransportKind::Soap);
        let text = codec.encode(&data_transfer_call()).unwrap();
        assert!(text.starts_with("<s:Envelope"));
        assert!(text.contains("<Action>/DataTransfer</Action>"));
        assert!(text.contains("<MessageID>42</MessageID>"));
        assert!(!text.contains("<a & b>"), "Body must be escaped: {text}");
        assert_eq!(codec.decode(&text).unwrap(), data_transfer_call());
    }

    #[test]
    fn test_call_error_survives_both_encodings() {
        let frame = Frame::CallError {
            message_id: "7".to_string(),
            code: "NotSupported".to_string(),
            description: "Reset is not handled here".to_string(),
        };
        for kind in [TransportKind::Json, TransportKind::Soap] {
            let codec = WireCodec::new(kind);
            let text = codec.encode(&frame).unwrap();
            assert_eq!(codec.decode(&text).unwrap(), frame, "kind {kind:?}");
        }
    }

    #[test]
    fn test_soap_result_relates_to_request_id() {
        let codec = WireCodec::new(TransportKind::Soap);
        let frame = Frame::CallResult {
            message_id: "abc".to_string(),
            payload: json!({ "status": "Accepted" }),
        };
        let text = codec.encode(&frame).unwrap();
        assert!(text.contains("<RelatesTo>abc</RelatesTo>"));
        assert_eq!(codec.decode(&text).unwrap().message_id(), "abc");
    }

    #[test]
    fn test_malformed_frames_are_rejected() {
        let json = WireCodec::new(TransportKind::Json);
        assert!(matches!(json.decode("{}"), Err(TransportError::Codec(_))));
        assert!(matches!(json.decode("[9,\"1\"]"), Err(TransportError::Codec(_))));
        assert!(matches!(
            json.decode("[2,\"1\",\"Teleport\",{}]"),
            Err(TransportError::Codec(_))
        ));

        let soap = WireCodec::new(TransportKind::Soap);
        assert!(matches!(soap.decode("[2,\"1\",\"Heartbeat\",{}]"), Err(TransportError::Codec(_))));
        assert!(matches!(
            soap.decode("<s:Envelope><s:Body>{}</s:Body></s:Envelope>"),
            Err(TransportError::Codec(_))
        ));
    }
}
