//! Sale note records, inbound payloads and rendered documents.

use crate::error::{ProcessError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Product name used when a line item's product cannot be resolved.
pub const PLACEHOLDER_PRODUCT_NAME: &str = "Producto";

/// Path prefix used when the customer has no tax identifier.
pub const GENERIC_TAX_ID: &str = "GENERICO";

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// A sales note, owned by the system of record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub folio: String,
    pub customer_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub tax_id: Option<String>,
    pub display_name: String,
}

/// One product line of a note. Quantity and amount keep the decimal text
/// exactly as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: String,
    pub note_id: String,
    pub product_id: String,
    pub quantity: String,
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub display_name: Option<String>,
}

impl Product {
    /// Name to print on the note, falling back to the placeholder.
    pub fn name_or_placeholder(product: Option<&Product>) -> &str {
        product
            .and_then(|p| p.display_name.as_deref())
            .unwrap_or(PLACEHOLDER_PRODUCT_NAME)
    }
}

/// Extracts the note id from a raw queue body.
///
/// Accepts either `{"noteId": ...}` or a fan-out envelope whose `Message`
/// field holds the real payload as a JSON string. Returns `Ok(None)` when
/// neither shape carries a usable `noteId`. A `Message` that is present but
/// not a string is a malformed payload.
pub fn parse_note_id(body: &str) -> Result<Option<String>> {
    let value: Value = serde_json::from_str(body).map_err(ProcessError::MalformedPayload)?;

    let payload = match value.get("Message") {
        Some(Value::String(inner)) => {
            serde_json::from_str(inner).map_err(ProcessError::MalformedPayload)?
        }
        Some(other) => {
            return Err(ProcessError::MalformedPayload(serde::de::Error::custom(
                format_args!("envelope `Message` must be a JSON string, got {}", other),
            )));
        }
        None => value,
    };

    let note_id = match payload.get("noteId") {
        Some(Value::String(id)) if !id.is_empty() => Some(id.clone()),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => None,
    };

    Ok(note_id)
}

/// Metadata tags attached to a published document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSet {
    pub send_time: DateTime<Utc>,
    pub note_downloaded: bool,
    pub times_sent: u32,
}

impl TagSet {
    pub const SEND_TIME: &'static str = "send-time";
    pub const NOTE_DOWNLOADED: &'static str = "note-downloaded";
    pub const TIMES_SENT: &'static str = "times-sent";

    /// Tags for a freshly sent document. Redelivery resets the counter to 1.
    pub fn first_send(send_time: DateTime<Utc>) -> Self {
        Self {
            send_time,
            note_downloaded: false,
            times_sent: 1,
        }
    }

    /// Key/value pairs in wire order.
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            (
                Self::SEND_TIME,
                self.send_time.to_rfc3339_opts(SecondsFormat::Micros, true),
            ),
            (Self::NOTE_DOWNLOADED, self.note_downloaded.to_string()),
            (Self::TIMES_SENT, self.times_sent.to_string()),
        ]
    }
}

/// A rendered PDF ready to be published.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub key: String,
    pub bytes: Vec<u8>,
    pub tags: TagSet,
}

impl RenderedDocument {
    pub fn new(customer: &Customer, note: &Note, bytes: Vec<u8>, sent_at: DateTime<Utc>) -> Self {
        Self {
            key: Self::storage_key(customer, note),
            bytes,
            tags: TagSet::first_send(sent_at),
        }
    }

    /// `<tax-id>/<folio>.pdf`
    pub fn storage_key(customer: &Customer, note: &Note) -> String {
        let tax_id = customer
            .tax_id
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(GENERIC_TAX_ID);
        format!("{}/{}.pdf", tax_id, note.folio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn customer(tax_id: Option<&str>) -> Customer {
        Customer {
            id: "C1".to_string(),
            tax_id: tax_id.map(str::to_string),
            display_name: "Acme Corp".to_string(),
        }
    }

    fn note() -> Note {
        Note {
            id: "N1".to_string(),
            folio: "F-100".to_string(),
            customer_id: "C1".to_string(),
        }
    }

    #[test]
    fn test_direct_payload() {
        let id = parse_note_id(r#"{"noteId": "N1"}"#).unwrap();
        assert_eq!(id.as_deref(), Some("N1"));
    }

    #[test]
    fn test_envelope_payload() {
        let body = r#"{"Type": "Notification", "Message": "{\"noteId\": \"N1\"}"}"#;
        let id = parse_note_id(body).unwrap();
        assert_eq!(id.as_deref(), Some("N1"));
    }

    #[test]
    fn test_numeric_note_id() {
        let id = parse_note_id(r#"{"noteId": 42}"#).unwrap();
        assert_eq!(id.as_deref(), Some("42"));
    }

    #[test]
    fn test_missing_note_id() {
        assert_eq!(parse_note_id(r#"{"other": "x"}"#).unwrap(), None);
        assert_eq!(parse_note_id(r#"{"noteId": ""}"#).unwrap(), None);
        assert_eq!(parse_note_id(r#"{"Message": "{}"}"#).unwrap(), None);
    }

    #[test]
    fn test_malformed_payload() {
        assert!(matches!(
            parse_note_id("not json"),
            Err(ProcessError::MalformedPayload(_))
        ));
        assert!(matches!(
            parse_note_id(r#"{"Message": "not json"}"#),
            Err(ProcessError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_non_string_message_is_malformed() {
        for body in [
            r#"{"Message": {"noteId": "N1"}, "noteId": "N2"}"#,
            r#"{"Message": 7, "noteId": "N2"}"#,
            r#"{"Message": null}"#,
        ] {
            let err = parse_note_id(body).unwrap_err();
            assert!(matches!(err, ProcessError::MalformedPayload(_)), "{}", body);
            assert_eq!(err.severity(), crate::error::Severity::Fatal);
        }
    }

    #[test]
    fn test_storage_key() {
        assert_eq!(
            RenderedDocument::storage_key(&customer(Some("ACM010101AAA")), &note()),
            "ACM010101AAA/F-100.pdf"
        );
        assert_eq!(
            RenderedDocument::storage_key(&customer(None), &note()),
            "GENERICO/F-100.pdf"
        );
    }

    #[test]
    fn test_first_send_tags() {
        let sent_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let tags = TagSet::first_send(sent_at);

        assert_eq!(
            tags.pairs(),
            vec![
                ("send-time", "2024-05-01T12:30:00.000000Z".to_string()),
                ("note-downloaded", "false".to_string()),
                ("times-sent", "1".to_string()),
            ]
        );
    }

    #[test]
    fn test_placeholder_product_name() {
        let named = Product {
            id: "P1".to_string(),
            display_name: Some("Widget".to_string()),
        };
        let unnamed = Product {
            id: "P2".to_string(),
            display_name: None,
        };

        assert_eq!(Product::name_or_placeholder(Some(&named)), "Widget");
        assert_eq!(Product::name_or_placeholder(Some(&unnamed)), "Producto");
        assert_eq!(Product::name_or_placeholder(None), "Producto");
    }
}
