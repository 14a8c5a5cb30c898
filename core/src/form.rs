//! State of the write form: which record type is selected and which fields are shown.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::write::{AuthType, WriteRequest};

/// Record type selectable on the write form
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum RecordKind {
    #[default]
    Text,
    Url,
    Json,
    Wifi,
    Empty,
}

impl RecordKind {
    pub const ALL: [RecordKind; 5] = [
        RecordKind::Text,
        RecordKind::Url,
        RecordKind::Json,
        RecordKind::Wifi,
        RecordKind::Empty,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Url => "url",
            Self::Json => "json",
            Self::Wifi => "wifi",
            Self::Empty => "empty",
        }
    }

    /// Human-readable label shown in the selector.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Text => "Text",
            Self::Url => "URL",
            Self::Json => "JSON",
            Self::Wifi => "Wi-Fi",
            Self::Empty => "Empty (erase tag)",
        }
    }
}

impl Display for RecordKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown record type: {0}")]
pub struct UnknownRecordKind(pub String);

impl FromStr for RecordKind {
    type Err = UnknownRecordKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownRecordKind(s.to_string()))
    }
}

/// Input field (or group of fields) on the form
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Field {
    /// Single-line free text, used for text and URL.
    Text,

    /// Multi-line JSON text.
    Json,

    /// SSID, password and authentication type.
    Wifi,
}

/// What the form shows for a selected record type
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FormLayout {
    /// The only visible field, if any.
    pub visible: Option<Field>,
    pub placeholder: Option<&'static str>,
    pub write_button: &'static str,
}

impl FormLayout {
    pub fn for_kind(kind: RecordKind) -> Self {
        let (visible, placeholder) = match kind {
            RecordKind::Text => (
                Some(Field::Text),
                Some("Enter the text to write to the tag"),
            ),
            RecordKind::Url => (
                Some(Field::Text),
                Some("e.g. example.com or http://192.168.1.1"),
            ),
            RecordKind::Json => (Some(Field::Json), None),
            RecordKind::Wifi => (Some(Field::Wifi), None),
            RecordKind::Empty => (None, None),
        };

        Self {
            visible,
            placeholder,
            write_button: match kind {
                RecordKind::Empty => "Erase tag",
                _ => "Write tag",
            },
        }
    }

    pub fn is_visible(&self, field: Field) -> bool {
        self.visible == Some(field)
    }
}

impl Default for FormLayout {
    fn default() -> Self {
        Self::for_kind(RecordKind::default())
    }
}

/// Current values of the form
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FormState {
    pub kind: RecordKind,
    pub text: String,
    pub json: String,
    pub ssid: String,
    pub password: String,
    pub auth: AuthType,
}

impl FormState {
    /// Derives the write request from the fields of the selected record type.
    pub fn request(&self) -> WriteRequest {
        match self.kind {
            RecordKind::Text => WriteRequest::Text(self.text.clone()),
            RecordKind::Url => WriteRequest::Url(self.text.clone()),
            RecordKind::Json => WriteRequest::Json(self.json.clone()),
            RecordKind::Wifi => WriteRequest::Wifi {
                ssid: self.ssid.clone(),
                password: self.password.clone(),
                auth: self.auth,
            },
            RecordKind::Empty => WriteRequest::Empty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wifi_shows_only_wifi_group() {
        let layout = FormLayout::for_kind(RecordKind::Wifi);

        assert!(layout.is_visible(Field::Wifi));
        assert!(!layout.is_visible(Field::Text));
        assert!(!layout.is_visible(Field::Json));
        assert_eq!("Write tag", layout.write_button);
    }

    #[test]
    fn test_layouts() {
        let layout = FormLayout::for_kind(RecordKind::Url);
        assert!(layout.is_visible(Field::Text));
        assert_eq!(Some("e.g. example.com or http://192.168.1.1"), layout.placeholder);

        let layout = FormLayout::for_kind(RecordKind::Json);
        assert!(layout.is_visible(Field::Json));
        assert_eq!(None, layout.placeholder);

        let layout = FormLayout::for_kind(RecordKind::Empty);
        assert_eq!(None, layout.visible);
        assert_eq!("Erase tag", layout.write_button);
    }

    #[test]
    fn test_request_uses_selected_fields_only() {
        let state = FormState {
            kind: RecordKind::Url,
            text: "example.com".to_string(),
            json: "{}".to_string(),
            ssid: "Home".to_string(),
            ..Default::default()
        };
        assert_eq!(WriteRequest::Url("example.com".to_string()), state.request());

        let state = FormState {
            kind: RecordKind::Empty,
            ..state
        };
        assert_eq!(WriteRequest::Empty, state.request());
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!(RecordKind::Wifi, "wifi".parse().unwrap());
        assert!("mime".parse::<RecordKind>().is_err());
    }
}
