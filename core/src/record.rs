//! Records and messages exchanged with a tag.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Media type of a record holding a JSON document.
pub const MEDIA_TYPE_JSON: &str = "application/json";

/// Media type of a Wi-Fi Simple Configuration record.
pub const MEDIA_TYPE_WIFI: &str = "application/vnd.wfa.wsc";

/// Tag of a record, telling how its payload should be interpreted.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RecordType {
    Text,
    Url,
    Mime,
    Empty,
    Unknown,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Url => "url",
            Self::Mime => "mime",
            Self::Empty => "empty",
            Self::Unknown => "unknown",
        }
    }
}

impl Display for RecordType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown record type: {0}")]
pub struct UnknownRecordType(pub String);

impl FromStr for RecordType {
    type Err = UnknownRecordType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "url" => Ok(Self::Url),
            "mime" => Ok(Self::Mime),
            "empty" => Ok(Self::Empty),
            "unknown" => Ok(Self::Unknown),
            _ => Err(UnknownRecordType(s.to_string())),
        }
    }
}

/// A self-contained unit of data in a tag message.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(
    feature = "serde",
    serde(tag = "record_type", rename_all = "lowercase")
)]
pub enum Record {
    /// Text in the declared encoding, UTF-8 if none.
    Text {
        data: Vec<u8>,
        encoding: Option<String>,
        lang: Option<String>,
    },

    /// An absolute URL, encoded in UTF-8.
    Url { data: Vec<u8> },

    /// Arbitrary octets typed by a media type.
    Mime { media_type: String, data: Vec<u8> },

    /// A record without any payload.
    Empty,

    /// A record of a type not interpreted here, such as a smart poster or an external type.
    /// Kept as read so the other records of the message are still usable.
    Unknown {
        tnf: u8,
        type_name: String,
        data: Vec<u8>,
    },
}

impl Record {
    /// Creates an UTF-8 text record.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            data: text.into().into_bytes(),
            encoding: None,
            lang: None,
        }
    }

    /// Creates an URL record.
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url {
            data: url.into().into_bytes(),
        }
    }

    /// Creates a record typed by the media type.
    pub fn mime(media_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self::Mime {
            media_type: media_type.into(),
            data: data.into(),
        }
    }

    pub fn record_type(&self) -> RecordType {
        match self {
            Self::Text { .. } => RecordType::Text,
            Self::Url { .. } => RecordType::Url,
            Self::Mime { .. } => RecordType::Mime,
            Self::Empty => RecordType::Empty,
            Self::Unknown { .. } => RecordType::Unknown,
        }
    }

    /// Media type of the record, only present on mime records.
    pub fn media_type(&self) -> Option<&str> {
        match self {
            Self::Mime { media_type, .. } => Some(media_type),
            _ => None,
        }
    }

    /// Payload of the record, absent on empty records.
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Self::Text { data, .. }
            | Self::Url { data }
            | Self::Mime { data, .. }
            | Self::Unknown { data, .. } => Some(data),
            Self::Empty => None,
        }
    }

    /// Declared encoding of the payload, only present on text records.
    pub fn encoding(&self) -> Option<&str> {
        match self {
            Self::Text { encoding, .. } => encoding.as_deref(),
            _ => None,
        }
    }
}

/// An ordered collection of records read from or written to a single tag.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct TagMessage {
    pub serial_number: Option<String>,
    pub records: Vec<Record>,
}

impl TagMessage {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            serial_number: None,
            records,
        }
    }

    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
