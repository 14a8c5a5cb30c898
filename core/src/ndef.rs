//! NDEF message encoding, as stored in the NDEF file of a tag.

use crate::record::Record;

const FLAG_MB: u8 = 0x80;
const FLAG_ME: u8 = 0x40;
const FLAG_CF: u8 = 0x20;
const FLAG_SR: u8 = 0x10;
const FLAG_IL: u8 = 0x08;
const TNF_MASK: u8 = 0x07;

const TNF_EMPTY: u8 = 0x00;
const TNF_WELL_KNOWN: u8 = 0x01;
const TNF_MEDIA: u8 = 0x02;
const TNF_ABSOLUTE_URI: u8 = 0x03;

const RTD_TEXT: &[u8] = b"T";
const RTD_URI: &[u8] = b"U";

const TEXT_UTF16: u8 = 0x80;
const TEXT_LANG_MASK: u8 = 0x3F;
const DEFAULT_LANG: &str = "en";

const BOM_LE: [u8; 2] = [0xFF, 0xFE];
const BOM_BE: [u8; 2] = [0xFE, 0xFF];

/// URI identifier codes of the URI record type definition, indexed by their code.
const URI_PREFIXES: [&str; 36] = [
    "",
    "http://www.",
    "https://www.",
    "http://",
    "https://",
    "tel:",
    "mailto:",
    "ftp://anonymous:anonymous@",
    "ftp://ftp.",
    "ftps://",
    "sftp://",
    "smb://",
    "nfs://",
    "ftp://",
    "dav://",
    "news:",
    "telnet://",
    "imap:",
    "rtsp://",
    "urn:",
    "pop:",
    "sip:",
    "sips:",
    "tftp:",
    "btspp://",
    "btl2cap://",
    "btgoep://",
    "tcpobex://",
    "irdaobex://",
    "file://",
    "urn:epc:id:",
    "urn:epc:tag:",
    "urn:epc:pat:",
    "urn:epc:raw:",
    "urn:epc:",
    "urn:nfc:",
];

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("NDEF message is truncated")]
    Truncated,

    #[error("Chunked NDEF records are not supported")]
    Chunked,

    #[error("Unknown URI identifier code: {0:#04x}")]
    UnknownUriPrefix(u8),

    #[error("Text encoding cannot be stored in a text record: {0}")]
    UnsupportedEncoding(String),

    #[error("Language code is too long: {0}")]
    LanguageTooLong(String),

    #[error("Record field is too large: {0} octets")]
    TooLarge(usize),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Stateful reader over an NDEF message, failing instead of reading past the end.
struct Reader<'a> {
    buffer: &'a [u8],
    cursor: usize,
}

impl<'a> Reader<'a> {
    fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, cursor: 0 }
    }

    fn is_at_end(&self) -> bool {
        self.cursor >= self.buffer.len()
    }

    /// Reads a next octet and seeks the cursor.
    fn next(&mut self) -> Result<u8> {
        Ok(self.read(1)?[0])
    }

    /// Reads data of specified size and seeks the cursor.
    fn read(&mut self, length: usize) -> Result<&'a [u8]> {
        let end = self.cursor.checked_add(length).ok_or(Error::Truncated)?;
        let bytes = self.buffer.get(self.cursor..end).ok_or(Error::Truncated)?;
        self.cursor = end;

        Ok(bytes)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read(4)?;

        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

/// Decodes the records of an NDEF message.
/// An empty buffer is an empty message.
pub fn decode(buffer: &[u8]) -> Result<Vec<Record>> {
    let mut reader = Reader::new(buffer);
    let mut records = Vec::new();

    while !reader.is_at_end() {
        let header = reader.next()?;
        if header & FLAG_CF != 0 {
            return Err(Error::Chunked);
        }

        let type_length = reader.next()? as usize;
        let payload_length = match header & FLAG_SR {
            0 => reader.read_u32()? as usize,
            _ => reader.next()? as usize,
        };
        let id_length = match header & FLAG_IL {
            0 => 0,
            _ => reader.next()? as usize,
        };

        let record_type = reader.read(type_length)?;
        reader.read(id_length)?;
        let payload = reader.read(payload_length)?;

        records.push(decode_record(header & TNF_MASK, record_type, payload)?);

        if header & FLAG_ME != 0 {
            break;
        }
    }

    Ok(records)
}

fn decode_record(tnf: u8, record_type: &[u8], payload: &[u8]) -> Result<Record> {
    match (tnf, record_type) {
        (TNF_EMPTY, _) => Ok(Record::Empty),
        (TNF_WELL_KNOWN, RTD_TEXT) => decode_text(payload),
        (TNF_WELL_KNOWN, RTD_URI) => decode_uri(payload),
        (TNF_MEDIA, _) => Ok(Record::Mime {
            media_type: String::from_utf8_lossy(record_type).to_string(),
            data: payload.to_vec(),
        }),
        (TNF_ABSOLUTE_URI, _) => Ok(Record::Url {
            data: record_type.to_vec(),
        }),
        _ => Ok(Record::Unknown {
            tnf,
            type_name: String::from_utf8_lossy(record_type).to_string(),
            data: payload.to_vec(),
        }),
    }
}

fn decode_text(payload: &[u8]) -> Result<Record> {
    let mut reader = Reader::new(payload);
    let status = reader.next()?;
    let lang = reader.read((status & TEXT_LANG_MASK) as usize)?;
    let text = &payload[reader.cursor..];

    let (encoding, text) = match status & TEXT_UTF16 {
        0 => ("utf-8", text),
        _ => match text.get(..2) {
            Some(bom) if bom == BOM_LE => ("utf-16le", &text[2..]),
            Some(bom) if bom == BOM_BE => ("utf-16be", &text[2..]),
            _ => ("utf-16be", text),
        },
    };

    Ok(Record::Text {
        data: text.to_vec(),
        encoding: Some(encoding.to_string()),
        lang: Some(String::from_utf8_lossy(lang).to_string()),
    })
}

fn decode_uri(payload: &[u8]) -> Result<Record> {
    let (code, rest) = payload.split_first().ok_or(Error::Truncated)?;
    let prefix = URI_PREFIXES
        .get(*code as usize)
        .ok_or(Error::UnknownUriPrefix(*code))?;

    let mut data = prefix.as_bytes().to_vec();
    data.extend_from_slice(rest);

    Ok(Record::Url { data })
}

/// Encodes the records into an NDEF message.
pub fn encode(records: &[Record]) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();

    for (i, record) in records.iter().enumerate() {
        let (tnf, record_type, payload) = encode_record(record)?;
        if record_type.len() > u8::MAX as usize {
            return Err(Error::TooLarge(record_type.len()));
        }

        let mut header = tnf;
        if i == 0 {
            header |= FLAG_MB;
        }
        if i == records.len() - 1 {
            header |= FLAG_ME;
        }

        let short = payload.len() <= u8::MAX as usize;
        if short {
            header |= FLAG_SR;
        }

        buffer.push(header);
        buffer.push(record_type.len() as u8);
        if short {
            buffer.push(payload.len() as u8);
        } else {
            let length =
                u32::try_from(payload.len()).map_err(|_| Error::TooLarge(payload.len()))?;
            buffer.extend_from_slice(&length.to_be_bytes());
        }

        buffer.extend_from_slice(&record_type);
        buffer.extend_from_slice(&payload);
    }

    Ok(buffer)
}

fn encode_record(record: &Record) -> Result<(u8, Vec<u8>, Vec<u8>)> {
    match record {
        Record::Empty => Ok((TNF_EMPTY, vec![], vec![])),
        Record::Text {
            data,
            encoding,
            lang,
        } => Ok((
            TNF_WELL_KNOWN,
            RTD_TEXT.to_vec(),
            encode_text(data, encoding.as_deref(), lang.as_deref())?,
        )),
        Record::Url { data } => Ok((TNF_WELL_KNOWN, RTD_URI.to_vec(), encode_uri(data))),
        Record::Mime { media_type, data } => {
            Ok((TNF_MEDIA, media_type.as_bytes().to_vec(), data.clone()))
        }
        Record::Unknown {
            tnf,
            type_name,
            data,
        } => Ok((tnf & TNF_MASK, type_name.as_bytes().to_vec(), data.clone())),
    }
}

fn encode_text(data: &[u8], encoding: Option<&str>, lang: Option<&str>) -> Result<Vec<u8>> {
    let lang = lang.unwrap_or(DEFAULT_LANG);
    if lang.len() > TEXT_LANG_MASK as usize {
        return Err(Error::LanguageTooLong(lang.to_string()));
    }

    let (utf16, bom): (bool, &[u8]) = match encoding.map(|e| e.to_ascii_lowercase()).as_deref() {
        None | Some("utf-8") | Some("utf8") => (false, &[][..]),
        Some("utf-16be") => (true, &[][..]),
        Some("utf-16") | Some("utf-16le") => (true, &BOM_LE[..]),
        Some(other) => return Err(Error::UnsupportedEncoding(other.to_string())),
    };

    let mut payload = vec![lang.len() as u8 | if utf16 { TEXT_UTF16 } else { 0 }];
    payload.extend_from_slice(lang.as_bytes());
    payload.extend_from_slice(bom);
    payload.extend_from_slice(data);

    Ok(payload)
}

fn encode_uri(data: &[u8]) -> Vec<u8> {
    // Code 0 (no prefix) always matches, so the longest match is never absent.
    let (code, prefix) = URI_PREFIXES
        .iter()
        .enumerate()
        .filter(|(_, prefix)| data.starts_with(prefix.as_bytes()))
        .max_by_key(|(_, prefix)| prefix.len())
        .unwrap_or((0, &""));

    let mut payload = vec![code as u8];
    payload.extend_from_slice(&data[prefix.len()..]);
    payload
}
