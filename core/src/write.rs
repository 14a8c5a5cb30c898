//! Builds the records to write from the user input, validating them first.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::form::RecordKind;
use crate::record::{Record, TagMessage, MEDIA_TYPE_JSON};

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Text content cannot be empty!")]
    EmptyText,

    #[error("URL cannot be empty!")]
    EmptyUrl,

    #[error("JSON content cannot be empty!")]
    EmptyJson,

    #[error("Invalid JSON format!")]
    InvalidJson,

    #[error("Wi-Fi name (SSID) cannot be empty!")]
    EmptySsid,
}

/// Authentication type of a Wi-Fi network
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum AuthType {
    #[default]
    Wpa,
    Wep,
    NoPass,
}

impl AuthType {
    pub const ALL: [AuthType; 3] = [AuthType::Wpa, AuthType::Wep, AuthType::NoPass];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wpa => "WPA",
            Self::Wep => "WEP",
            Self::NoPass => "nopass",
        }
    }
}

impl Display for AuthType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown authentication type: {0} (expected WPA, WEP or nopass)")]
pub struct UnknownAuthType(pub String);

impl FromStr for AuthType {
    type Err = UnknownAuthType;

    /// Parses the type case-insensitively. An empty string is the default type.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "wpa" => Ok(Self::Wpa),
            "wep" => Ok(Self::Wep),
            "nopass" => Ok(Self::NoPass),
            _ => Err(UnknownAuthType(s.to_string())),
        }
    }
}

/// Verb describing the write to the user
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Action {
    Write,
    Erase,
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Write => "Write",
            Self::Erase => "Erase",
        })
    }
}

/// Input values of the selected record type
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WriteRequest {
    Text(String),
    Url(String),
    Json(String),
    Wifi {
        ssid: String,
        password: String,
        auth: AuthType,
    },
    Empty,
}

impl WriteRequest {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Text(_) => RecordKind::Text,
            Self::Url(_) => RecordKind::Url,
            Self::Json(_) => RecordKind::Json,
            Self::Wifi { .. } => RecordKind::Wifi,
            Self::Empty => RecordKind::Empty,
        }
    }

    pub fn action(&self) -> Action {
        match self {
            Self::Empty => Action::Erase,
            _ => Action::Write,
        }
    }

    /// Validates the input, then builds the message to write.
    pub fn build(&self) -> Result<TagMessage, ValidationError> {
        let record = match self {
            Self::Text(text) => {
                if text.is_empty() {
                    return Err(ValidationError::EmptyText);
                }

                Record::text(text.as_str())
            }
            Self::Url(url) => {
                if url.is_empty() {
                    return Err(ValidationError::EmptyUrl);
                }

                Record::url(url.as_str())
            }
            Self::Json(json) => {
                if json.is_empty() {
                    return Err(ValidationError::EmptyJson);
                }

                // Parsed only to validate; the input is written as is.
                serde_json::from_str::<serde_json::Value>(json)
                    .map_err(|_| ValidationError::InvalidJson)?;

                Record::mime(MEDIA_TYPE_JSON, json.as_bytes())
            }
            Self::Wifi {
                ssid,
                password,
                auth,
            } => {
                if ssid.is_empty() {
                    return Err(ValidationError::EmptySsid);
                }

                Record::text(wifi_credential(ssid, password, *auth))
            }
            Self::Empty => Record::Empty,
        };

        Ok(TagMessage::new(vec![record]))
    }
}

/// Formats the credential in the text format understood by QR code and NFC Wi-Fi joiners.
pub fn wifi_credential(ssid: &str, password: &str, auth: AuthType) -> String {
    format!("WIFI:T:{};S:{};P:{};;", auth, ssid, password)
}
