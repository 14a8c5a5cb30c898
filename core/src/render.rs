//! Converts a tag message into the text shown in the log.

use std::fmt::{Display, Formatter, Write};

use encoding_rs::Encoding;
use serde_json::{Map, Value};

use crate::record::{Record, RecordType, TagMessage, MEDIA_TYPE_JSON, MEDIA_TYPE_WIFI};

const NOT_AVAILABLE: &str = "N/A";
const URL_SEPARATOR: &str = "://";

/// Largest integer a JavaScript number holds exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Unsupported text encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("Failed to format the JSON content: {0}")]
    Json(#[from] serde_json::Error),
}

impl RenderError {
    /// Name of the error kind, reported in the diagnostic log.
    pub fn name(&self) -> &'static str {
        match self {
            Self::UnsupportedEncoding(_) => "UnsupportedEncoding",
            Self::Json(_) => "Json",
        }
    }
}

/// Rendered content of a record
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Content {
    /// The record carries no payload.
    NoData,

    /// A Wi-Fi configuration record, never decoded.
    WifiConfig,

    /// A link to the exact decoded text.
    Link(String),

    /// A JSON document, pretty-printed.
    Json(String),

    /// Text declared as JSON that could not be parsed.
    NonStandardJson(String),

    /// Plain decoded text.
    Text(String),

    /// A record of a type that is not interpreted.
    Unsupported { tnf: u8, type_name: String },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecordLog {
    pub record_type: RecordType,
    pub media_type: Option<String>,
    pub content: Content,
}

/// Log rendered from a single tag message
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Log {
    pub serial_number: Option<String>,
    pub records: Vec<RecordLog>,
}

impl Log {
    /// Formats the log, rendering each link with the closure.
    pub fn format_with<F>(&self, link: F) -> String
    where
        F: Fn(&str) -> String,
    {
        let mut out = String::new();

        // Writing into a String never fails.
        let _ = self.write(&mut out, link);
        out
    }

    fn write<W, F>(&self, out: &mut W, link: F) -> std::fmt::Result
    where
        W: Write,
        F: Fn(&str) -> String,
    {
        writeln!(
            out,
            "> Serial number: {}",
            self.serial_number.as_deref().unwrap_or(NOT_AVAILABLE)
        )?;

        if self.records.is_empty() {
            return write!(out, "> Tag is empty or contains no recognizable NDEF records.");
        }

        for record in &self.records {
            writeln!(out, "> Record type: {}", record.record_type)?;
            writeln!(
                out,
                "> MIME type: {}",
                record.media_type.as_deref().unwrap_or(NOT_AVAILABLE)
            )?;

            match &record.content {
                Content::NoData => writeln!(out, "> Content: [record has no data]")?,
                Content::WifiConfig => {
                    writeln!(out, "> Content: [this is a Wi-Fi configuration record]")?
                }
                Content::Link(url) => writeln!(out, "> Content: {}", link(url))?,
                Content::Json(json) => writeln!(out, "> JSON content:\n{}", json)?,
                Content::NonStandardJson(text) => {
                    writeln!(out, "> Content (non-standard JSON): {}", text)?
                }
                Content::Text(text) => writeln!(out, "> Content: {}", text)?,
                Content::Unsupported { tnf, type_name } => writeln!(
                    out,
                    "> Content: [unsupported record (TNF {:#04x}, type \"{}\")]",
                    tnf, type_name
                )?,
            }
        }

        Ok(())
    }
}

impl Display for Log {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.write(f, |url| url.to_string())
    }
}

/// Decodes every record of the message and classifies its content.
pub fn render(message: &TagMessage) -> Result<Log, RenderError> {
    Ok(Log {
        serial_number: message.serial_number.clone(),
        records: message
            .records
            .iter()
            .map(render_record)
            .collect::<Result<_, _>>()?,
    })
}

fn render_record(record: &Record) -> Result<RecordLog, RenderError> {
    let record_type = record.record_type();
    let media_type = record.media_type();

    let content = match (record, record.data()) {
        (Record::Unknown { tnf, type_name, .. }, _) => Content::Unsupported {
            tnf: *tnf,
            type_name: type_name.clone(),
        },
        (_, None) => Content::NoData,
        (_, Some(_)) if record_type == RecordType::Mime && media_type == Some(MEDIA_TYPE_WIFI) => {
            Content::WifiConfig
        }
        (_, Some(data)) => {
            let text = decode_text(data, record.encoding())?;

            if record_type == RecordType::Url
                || (record_type == RecordType::Text && text.contains(URL_SEPARATOR))
            {
                Content::Link(text)
            } else if media_type == Some(MEDIA_TYPE_JSON) {
                match serde_json::from_str::<Value>(&text) {
                    Ok(value) => Content::Json(serde_json::to_string_pretty(&normalize_json(value))?),
                    Err(_) => Content::NonStandardJson(text),
                }
            } else {
                Content::Text(text)
            }
        }
    };

    Ok(RecordLog {
        record_type,
        media_type: media_type.map(str::to_string),
        content,
    })
}

/// Decodes the payload as text in the encoding, UTF-8 if not specified.
/// Encodings are looked up by their WHATWG label; a leading BOM of the encoding is removed and
/// malformed sequences are replaced with U+FFFD.
pub fn decode_text(data: &[u8], encoding: Option<&str>) -> Result<String, RenderError> {
    let label = encoding.unwrap_or("utf-8").trim().to_ascii_lowercase();

    let encoding = match Encoding::for_label(label.as_bytes()) {
        Some(encoding) if encoding != encoding_rs::REPLACEMENT => encoding,
        _ => return Err(RenderError::UnsupportedEncoding(label)),
    };

    let (text, _) = encoding.decode_with_bom_removal(data);

    Ok(text.into_owned())
}

/// Rewrites the document the way a JavaScript engine holds it: integral numbers lose their
/// fraction, and integer-like keys come first in ascending order.
fn normalize_json(value: Value) -> Value {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f)
                if n.is_f64() && f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER =>
            {
                Value::from(f as i64)
            }
            _ => Value::Number(n),
        },
        Value::Array(values) => Value::Array(values.into_iter().map(normalize_json).collect()),
        Value::Object(map) => {
            let (mut indices, names): (Vec<_>, Vec<_>) = map
                .into_iter()
                .map(|(key, value)| (key, normalize_json(value)))
                .partition(|(key, _)| array_index(key).is_some());

            indices.sort_by_key(|(key, _)| array_index(key));

            Value::Object(indices.into_iter().chain(names).collect::<Map<_, _>>())
        }
        other => other,
    }
}

/// Parses the key as an array index: a canonical decimal below 2^32 - 1.
fn array_index(key: &str) -> Option<u32> {
    match key.parse::<u32>() {
        Ok(index) if index != u32::MAX && index.to_string() == key => Some(index),
        _ => None,
    }
}
