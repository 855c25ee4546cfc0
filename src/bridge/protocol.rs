use serde::{Deserialize, Serialize};

/// Messages exchanged over the window channel between the two script worlds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeMessage {
    #[serde(rename = "GOT_CLUE_CHECK_OCR")]
    CheckReady,
    #[serde(rename = "GOT_CLUE_OCR_READY")]
    OcrReady { ready: bool },
    #[serde(rename = "GOT_CLUE_OCR_EXTRACT")]
    Extract {
        #[serde(rename = "requestId")]
        request_id: u64,
        selector: String,
    },
    #[serde(rename = "GOT_CLUE_OCR_RESULT")]
    OcrResult {
        #[serde(rename = "requestId")]
        request_id: u64,
        result: Option<String>,
        error: Option<String>,
    },
}

impl BridgeMessage {
    pub fn success(request_id: u64, text: String) -> Self {
        Self::OcrResult {
            request_id,
            result: Some(text),
            error: None,
        }
    }

    pub fn failure(request_id: u64, error: impl Into<String>) -> Self {
        Self::OcrResult {
            request_id,
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn encode(&self) -> String {
        // Plain enums of strings and integers always serialize.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parses a window message; anything that is not ours yields `None`.
    pub fn decode(data: &str) -> Option<Self> {
        match serde_json::from_str(data) {
            Ok(message) => Some(message),
            Err(err) => {
                tracing::trace!(?err, "ignoring foreign window message");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_uses_wire_type_names() {
        let extract = BridgeMessage::Extract {
            request_id: 7,
            selector: "img#hero".to_string(),
        };
        assert_eq!(
            extract.encode(),
            r#"{"type":"GOT_CLUE_OCR_EXTRACT","requestId":7,"selector":"img#hero"}"#
        );
        assert_eq!(
            BridgeMessage::CheckReady.encode(),
            r#"{"type":"GOT_CLUE_CHECK_OCR"}"#
        );
    }

    #[test]
    fn decode_reads_results_with_null_fields() {
        let message = BridgeMessage::decode(
            r#"{"type":"GOT_CLUE_OCR_RESULT","requestId":3,"result":null,"error":"Element not found"}"#,
        );
        assert_eq!(message, Some(BridgeMessage::failure(3, "Element not found")));
    }

    #[test]
    fn decode_ignores_unrelated_page_messages() {
        assert_eq!(BridgeMessage::decode(r#"{"type":"SOME_ANALYTICS_PING"}"#), None);
        assert_eq!(BridgeMessage::decode("not json"), None);
    }
}
