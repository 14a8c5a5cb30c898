//! NFC Forum Type 4 Tag: NDEF message stored in an ISO/IEC 7816-4 file system.

use apdu::{command, Command, Response};

#[cfg(feature = "tracing")]
use tracing::debug;

use crate::ndef;
use crate::nfc::{HandleError, Handler};
use crate::record::TagMessage;

const NDEF_APPLICATION: [u8; 7] = [0xD2, 0x76, 0x00, 0x00, 0x85, 0x01, 0x01];
const EF_CAPABILITY_CONTAINER: [u8; 2] = [0xE1, 0x03];

const CLA_DEFAULT: u8 = 0x00;

/// CLA of pseudo-APDUs interpreted by the PC/SC reader itself.
const CLA_READER: u8 = 0xFF;

const INS_UPDATE_BINARY: u8 = 0xD6;
const INS_GET_DATA: u8 = 0xCA;

const SELECT_P1_NAME: u8 = 0x04;
const SELECT_P1_ID: u8 = 0x00;
const SELECT_P2_FIRST: u8 = 0x00;
const SELECT_P2_NO_FCI: u8 = 0x0C;

const CC_SIZE: u16 = 0x0F;
const TLV_NDEF_FILE_CONTROL: u8 = 0x04;
const ACCESS_GRANTED: u8 = 0x00;

/// Size of NLEN, the length of the message preceding it in the NDEF file.
const NLEN_SIZE: u16 = 2;

/// Largest Le / Lc of a short APDU.
const SHORT_APDU_MAX: u16 = 0xFF;

/// Largest response of a short APDU: 256 octets of data and the status words.
const RESPONSE_BUFFER_SIZE: usize = 0x102;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Error occurred while communicating with the tag: {0}")]
    Handle(String),

    #[error(transparent)]
    Apdu(#[from] apdu::Error),

    #[error(transparent)]
    Ndef(#[from] ndef::Error),

    #[error("Capability container of the tag is malformed")]
    MalformedCapabilityContainer,

    #[error("The tag is read-only")]
    ReadOnly,

    #[error("Message is too large for the tag: {size} octets (max {max} octets)")]
    TooLarge { size: usize, max: usize },
}

impl From<HandleError> for Error {
    fn from(e: HandleError) -> Self {
        // The delegate error is not Send, so only its message is kept.
        Error::Handle(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Capability container, describing how the NDEF file can be accessed
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CapabilityContainer {
    pub mapping_version: u8,

    /// Maximum data size that can be read with a single READ BINARY (MLe).
    pub max_read: u16,

    /// Maximum data size that can be sent with a single UPDATE BINARY (MLc).
    pub max_write: u16,

    pub file_id: [u8; 2],

    /// Maximum size of the NDEF file, including NLEN.
    pub max_size: u16,

    pub read_access: u8,
    pub write_access: u8,
}

impl CapabilityContainer {
    /// Parses the capability container from its octets.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < CC_SIZE as usize || buf[7] != TLV_NDEF_FILE_CONTROL || buf[8] < 0x06 {
            return Err(Error::MalformedCapabilityContainer);
        }

        let u16_at = |i: usize| u16::from_be_bytes([buf[i], buf[i + 1]]);

        Ok(Self {
            mapping_version: buf[2],
            max_read: u16_at(3),
            max_write: u16_at(5),
            file_id: [buf[9], buf[10]],
            max_size: u16_at(11),
            read_access: buf[13],
            write_access: buf[14],
        })
    }

    pub fn is_writable(&self) -> bool {
        self.write_access == ACCESS_GRANTED
    }

    /// Largest message the NDEF file can hold.
    pub fn max_message_size(&self) -> usize {
        self.max_size.saturating_sub(NLEN_SIZE) as usize
    }

    fn read_chunk(&self) -> u16 {
        self.max_read.clamp(1, SHORT_APDU_MAX)
    }

    fn write_chunk(&self) -> u16 {
        self.max_write.clamp(1, SHORT_APDU_MAX)
    }
}

/// An adapter to communicate with the tag through the delegate
pub struct Tag<T>
where
    T: Handler,
{
    delegate: Box<T>,
}

impl<T> Tag<T>
where
    T: Handler,
{
    /// Initiates an adapter with the delegate.
    pub fn new(delegate: Box<T>) -> Self {
        Self { delegate }
    }

    /// Selects the NDEF Tag Application.
    pub fn select_application(&self) -> Result<()> {
        self.handle(command::select_file(
            SELECT_P1_NAME,
            SELECT_P2_FIRST,
            &NDEF_APPLICATION,
        ))
        .map(|_| ())
    }

    /// Selects an EF with their identifier.
    pub fn select_file(&self, id: [u8; 2]) -> Result<()> {
        self.handle(command::select_file(SELECT_P1_ID, SELECT_P2_NO_FCI, &id))
            .map(|_| ())
    }

    /// Reads `len` octets from the selected file, starting at `offset`.
    pub fn read(&self, offset: u16, len: u16, chunk: u16) -> Result<Vec<u8>> {
        let mut pos: u16 = 0;
        let mut buf: Vec<u8> = Vec::new();

        while pos < len {
            let [p1, p2] = (offset + pos).to_be_bytes();
            let le = (len - pos).min(chunk) as u8;

            let mut fragment = self.handle(command::read_binary(p1, p2, le))?;
            let length = fragment.len();

            fragment.truncate((len - pos) as usize);
            buf.append(&mut fragment);
            pos = pos.saturating_add(length as u16);

            if length < le as usize {
                break;
            }
        }

        Ok(buf)
    }

    /// Writes the data into the selected file, starting at `offset`.
    pub fn update(&self, offset: u16, data: &[u8], chunk: u16) -> Result<()> {
        for (i, fragment) in data.chunks(chunk as usize).enumerate() {
            let [p1, p2] = (offset + i as u16 * chunk).to_be_bytes();

            self.handle(Command::new_with_payload(
                CLA_DEFAULT,
                INS_UPDATE_BINARY,
                p1,
                p2,
                fragment,
            ))?;
        }

        Ok(())
    }

    /// Selects the application and reads the capability container.
    pub fn read_capability_container(&self) -> Result<CapabilityContainer> {
        self.select_application()?;
        self.select_file(EF_CAPABILITY_CONTAINER)?;

        let buf = self.read(0, CC_SIZE, CC_SIZE)?;
        let cc = CapabilityContainer::parse(&buf)?;

        debug!("Capability container: {:?}", cc);

        Ok(cc)
    }

    /// Reads the UID of the tag from the reader.
    /// Returns `None` if the reader does not answer this pseudo-APDU.
    pub fn serial_number(&self) -> Result<Option<String>> {
        let get_uid = Command::new_with_le(CLA_READER, INS_GET_DATA, 0x00, 0x00, 0);

        match self.handle(get_uid) {
            Ok(uid) if !uid.is_empty() => Ok(Some(
                uid.iter()
                    .map(|b| hex::encode([*b]))
                    .collect::<Vec<_>>()
                    .join(":"),
            )),
            Ok(_) | Err(Error::Apdu(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Reads the NDEF message stored on the tag.
    pub fn read_message(&self) -> Result<TagMessage> {
        let serial_number = self.serial_number()?;
        let cc = self.read_capability_container()?;
        self.select_file(cc.file_id)?;

        let nlen = self.read(0, NLEN_SIZE, NLEN_SIZE)?;
        let nlen = match nlen.as_slice() {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            _ => return Err(ndef::Error::Truncated.into()),
        };
        let nlen = nlen.min(cc.max_message_size() as u16);

        let buf = self.read(NLEN_SIZE, nlen, cc.read_chunk())?;
        debug!("NDEF message ({} octets): {}", buf.len(), hex::encode(&buf));

        Ok(TagMessage {
            serial_number,
            records: ndef::decode(&buf)?,
        })
    }

    /// Writes the message over the one stored on the tag.
    pub fn write_message(&self, message: &TagMessage) -> Result<()> {
        let buf = ndef::encode(&message.records)?;
        let cc = self.read_capability_container()?;

        if !cc.is_writable() {
            return Err(Error::ReadOnly);
        }

        let max = cc.max_message_size();
        if buf.len() > max {
            return Err(Error::TooLarge {
                size: buf.len(),
                max,
            });
        }

        self.select_file(cc.file_id)?;

        // NLEN stays zero while the message itself is being written.
        self.update(0, &[0x00, 0x00], NLEN_SIZE)?;
        self.update(NLEN_SIZE, &buf, cc.write_chunk())?;
        self.update(0, &(buf.len() as u16).to_be_bytes(), NLEN_SIZE)?;

        debug!("Wrote NDEF message ({} octets)", buf.len());

        Ok(())
    }

    fn handle<'a>(&self, command: impl Into<Command<'a>>) -> Result<Vec<u8>> {
        let tx = Vec::from(command.into());
        let mut rx = [0u8; RESPONSE_BUFFER_SIZE];

        let len = self.delegate.handle(&tx, &mut rx)?;
        let response = Response::from(&rx[..len.min(RESPONSE_BUFFER_SIZE)]);

        match response.is_ok() {
            true => Ok(response.payload.to_vec()),
            _ => Err(apdu::Error::from(response).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::nfc::HandlerInCtx;
    use crate::record::Record;

    const NDEF_FILE: [u8; 2] = [0xE1, 0x04];

    const SW_OK: [u8; 2] = [0x90, 0x00];

    /// A command APDU split into its fields.
    struct Apdu<'a> {
        ins: u8,
        offset: usize,
        data: &'a [u8],
        le: Option<u8>,
    }

    impl<'a> Apdu<'a> {
        fn parse(bytes: &'a [u8]) -> Self {
            let (header, body) = bytes.split_at(4);
            let (data, le) = match body {
                [] => (&[][..], None),
                [le] => (&[][..], Some(*le)),
                [lc, rest @ ..] => {
                    let lc = *lc as usize;
                    (&rest[..lc], rest.get(lc).copied())
                }
            };

            Self {
                ins: header[1],
                offset: u16::from_be_bytes([header[2], header[3]]) as usize,
                data,
                le,
            }
        }
    }

    /// An in-memory Type 4 tag answering the commands of the adapter.
    struct FakeTag {
        uid: Option<Vec<u8>>,
        cc: Vec<u8>,
        ndef: RefCell<Vec<u8>>,
        selected: RefCell<Option<[u8; 2]>>,
        commands: RefCell<Vec<Vec<u8>>>,
    }

    impl FakeTag {
        fn new(message: &[u8]) -> Self {
            let mut ndef = vec![0u8; 0x800];
            ndef[..2].copy_from_slice(&(message.len() as u16).to_be_bytes());
            ndef[2..2 + message.len()].copy_from_slice(message);

            Self {
                uid: Some(vec![0x04, 0xA2, 0x2B, 0x1A]),
                cc: vec![
                    0x00, 0x0F, 0x20, 0x00, 0x3B, 0x00, 0x34, 0x04, 0x06, 0xE1, 0x04, 0x08, 0x00,
                    0x00, 0x00,
                ],
                ndef: RefCell::new(ndef),
                selected: RefCell::new(None),
                commands: RefCell::new(vec![]),
            }
        }

        fn stored_message(&self) -> Vec<u8> {
            let ndef = self.ndef.borrow();
            let nlen = u16::from_be_bytes([ndef[0], ndef[1]]) as usize;

            ndef[2..2 + nlen].to_vec()
        }

        fn file(&self) -> Option<Vec<u8>> {
            match *self.selected.borrow() {
                Some(EF_CAPABILITY_CONTAINER) => Some(self.cc.clone()),
                Some(NDEF_FILE) => Some(self.ndef.borrow().clone()),
                _ => None,
            }
        }

        /// Answers the command, status words included.
        fn respond(&self, command: &Apdu) -> Vec<u8> {
            let ok = |payload: &[u8]| [payload, &SW_OK].concat();

            match command.ins {
                INS_GET_DATA => match &self.uid {
                    Some(uid) => ok(uid),
                    None => vec![0x6A, 0x81],
                },
                0xA4 => match command.data {
                    aid if aid == NDEF_APPLICATION => ok(&[]),
                    &[a, b] if [a, b] == EF_CAPABILITY_CONTAINER || [a, b] == NDEF_FILE => {
                        *self.selected.borrow_mut() = Some([a, b]);
                        ok(&[])
                    }
                    _ => vec![0x6A, 0x82],
                },
                0xB0 => match self.file() {
                    Some(file) => {
                        let le = command.le.unwrap_or(0) as usize;
                        let end = (command.offset + le).min(file.len());
                        ok(&file[command.offset.min(end)..end])
                    }
                    None => vec![0x69, 0x86],
                },
                INS_UPDATE_BINARY => match *self.selected.borrow() {
                    Some(NDEF_FILE) => {
                        let range = command.offset..command.offset + command.data.len();
                        self.ndef.borrow_mut()[range].copy_from_slice(command.data);
                        ok(&[])
                    }
                    _ => vec![0x69, 0x82],
                },
                _ => vec![0x6D, 0x00],
            }
        }

        /// Commands received with the instruction, parsed.
        fn received(&self, ins: u8) -> Vec<(usize, usize, Option<u8>)> {
            self.commands
                .borrow()
                .iter()
                .map(|bytes| Apdu::parse(bytes))
                .filter(|c| c.ins == ins)
                .map(|c| (c.offset, c.data.len(), c.le))
                .collect()
        }
    }

    impl HandlerInCtx for FakeTag {
        fn handle_in_ctx(&self, _: (), command: &[u8], response: &mut [u8]) -> apdu::core::Result {
            self.commands.borrow_mut().push(command.to_vec());

            let rx = self.respond(&Apdu::parse(command));
            response[..rx.len()].copy_from_slice(&rx);

            Ok(rx.len())
        }
    }

    impl Handler for FakeTag {}

    /// A reader that lost the tag.
    struct LostTag;

    impl HandlerInCtx for LostTag {
        fn handle_in_ctx(&self, _: (), _: &[u8], _: &mut [u8]) -> apdu::core::Result {
            Err(HandleError::Nfc(Box::new("tag was removed")))
        }
    }

    impl Handler for LostTag {}

    #[test]
    fn test_parse_capability_container() {
        let cc = CapabilityContainer::parse(&FakeTag::new(&[]).cc).unwrap();

        assert_eq!(0x20, cc.mapping_version);
        assert_eq!(0x3B, cc.max_read);
        assert_eq!(0x34, cc.max_write);
        assert_eq!(NDEF_FILE, cc.file_id);
        assert_eq!(0x800 - 2, cc.max_message_size());
        assert!(cc.is_writable());

        assert!(matches!(
            CapabilityContainer::parse(&[0x00, 0x0F, 0x20]),
            Err(Error::MalformedCapabilityContainer)
        ));
    }

    #[test]
    fn test_read_message() {
        let message = ndef::encode(&[Record::url("https://example.com")]).unwrap();
        let tag = Tag::new(Box::new(FakeTag::new(&message)));

        let read = tag.read_message().unwrap();

        assert_eq!(Some("04:a2:2b:1a".to_string()), read.serial_number);
        assert_eq!(vec![Record::url("https://example.com")], read.records);
    }

    #[test]
    fn test_commands_on_the_wire() {
        let tag = Tag::new(Box::new(FakeTag::new(&[])));
        tag.read_message().unwrap();

        let commands = tag.delegate.commands.borrow();
        assert_eq!(vec![0xFF, 0xCA, 0x00, 0x00, 0x00], commands[0]);
        assert_eq!(
            vec![0x00, 0xA4, 0x04, 0x00, 0x07, 0xD2, 0x76, 0x00, 0x00, 0x85, 0x01, 0x01],
            commands[1]
        );
        assert_eq!(vec![0x00, 0xA4, 0x00, 0x0C, 0x02, 0xE1, 0x03], commands[2]);
        assert_eq!(vec![0x00, 0xB0, 0x00, 0x00, 0x0F], commands[3]);
    }

    #[test]
    fn test_read_without_uid() {
        let mut fake = FakeTag::new(&[]);
        fake.uid = None;
        let read = Tag::new(Box::new(fake)).read_message().unwrap();

        assert_eq!(None, read.serial_number);
        assert!(read.records.is_empty());
    }

    #[test]
    fn test_read_in_chunks() {
        let text = "x".repeat(200);
        let message = ndef::encode(&[Record::text(text.as_str())]).unwrap();
        let tag = Tag::new(Box::new(FakeTag::new(&message)));

        let read = tag.read_message().unwrap();
        assert!(matches!(&read.records[0], Record::Text { data, .. } if data == text.as_bytes()));

        let reads = tag
            .delegate
            .received(0xB0)
            .into_iter()
            .filter_map(|(_, _, le)| le)
            .collect::<Vec<_>>();

        // CC, NLEN, then the message in MLe-sized fragments
        assert_eq!(vec![0x0F, 0x02, 0x3B, 0x3B, 0x3B, 0x1E], reads);
    }

    #[test]
    fn test_write_message() {
        let tag = Tag::new(Box::new(FakeTag::new(&[0xD0, 0x00, 0x00])));
        let message = TagMessage::new(vec![Record::text("x".repeat(120))]);

        tag.write_message(&message).unwrap();

        assert_eq!(
            ndef::encode(&message.records).unwrap(),
            tag.delegate.stored_message()
        );

        let writes = tag
            .delegate
            .received(INS_UPDATE_BINARY)
            .into_iter()
            .map(|(offset, len, _)| (offset, len))
            .collect::<Vec<_>>();

        // NLEN cleared, 127 octets in MLc-sized fragments, then NLEN set
        assert_eq!(
            vec![(0, 2), (2, 0x34), (2 + 0x34, 0x34), (2 + 0x68, 23), (0, 2)],
            writes
        );
    }

    #[test]
    fn test_write_read_only() {
        let mut fake = FakeTag::new(&[]);
        fake.cc[14] = 0xFF;
        let tag = Tag::new(Box::new(fake));

        assert!(matches!(
            tag.write_message(&TagMessage::new(vec![Record::Empty])),
            Err(Error::ReadOnly)
        ));
        assert!(tag.delegate.received(INS_UPDATE_BINARY).is_empty());
    }

    #[test]
    fn test_write_too_large() {
        let mut fake = FakeTag::new(&[]);
        fake.cc[11..13].copy_from_slice(&[0x00, 0x10]);
        let tag = Tag::new(Box::new(fake));
        let message = TagMessage::new(vec![Record::text("more than fourteen octets")]);

        assert!(matches!(
            tag.write_message(&message),
            Err(Error::TooLarge { max: 14, .. })
        ));
    }

    #[test]
    fn test_status_words_and_handler_errors() {
        let mut fake = FakeTag::new(&[]);
        fake.cc[7] = 0x00;
        let tag = Tag::new(Box::new(fake));
        assert!(matches!(
            tag.read_message(),
            Err(Error::MalformedCapabilityContainer)
        ));

        let tag = Tag::new(Box::new(FakeTag::new(&[])));
        assert!(matches!(
            tag.select_file([0x00, 0x01]),
            Err(Error::Apdu(apdu::Error::FileNotFound))
        ));

        let err = Tag::new(Box::new(LostTag)).read_message().unwrap_err();
        assert_eq!(
            "Error occurred while communicating with the tag: tag was removed",
            err.to_string()
        );
    }
}
