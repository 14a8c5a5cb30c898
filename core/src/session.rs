//! Application state shown to the user: a status line and a log.
//!
//! Every handler of [`Session`] corresponds with an user action. Failures of the NFC capability
//! are caught at the handler and turned into an error status; nothing propagates further except
//! the returned [`Error`], which callers may use to decide their exit status.

use std::fmt::{Display, Formatter};

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

use crate::form::{FormLayout, RecordKind};
use crate::nfc::{self, Reader, Scan, ScanEvent, Writer};
use crate::record::TagMessage;
use crate::render::{self, Log, RenderError};
use crate::write::{Action, ValidationError, WriteRequest};

/// Text of the log before anything is read.
pub const INITIAL_LOG: &str = "Read content will be shown here...";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("NFC is not supported in this environment")]
    Unsupported,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Nfc(#[from] nfc::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Visual style of the status line
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Severity {
    Info,
    Loading,
    Error,
    Success,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Status {
    pub message: String,
    pub severity: Severity,
}

/// Content of the log region
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LogView {
    Placeholder,
    Rendered(Log),

    /// Details of an error caught while rendering, to be reported by the user.
    Diagnostic { name: String, message: String },
}

impl Display for LogView {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Placeholder => f.write_str(INITIAL_LOG),
            Self::Rendered(log) => write!(f, "{}", log),
            Self::Diagnostic { name, message } => write!(
                f,
                "Caught an error while rendering the data:\n- Error name: {}\n- Error message: {}\nPlease send a screenshot of this message.",
                name, message
            ),
        }
    }
}

pub struct Session {
    supported: bool,
    status: Status,
    log: LogView,
    kind: RecordKind,
    form: FormLayout,
}

impl Session {
    /// Creates a session for an environment providing the NFC capability.
    pub fn new() -> Self {
        Self {
            supported: true,
            status: Status {
                message: "Ready".to_string(),
                severity: Severity::Info,
            },
            log: LogView::Placeholder,
            kind: RecordKind::default(),
            form: FormLayout::default(),
        }
    }

    /// Creates a session for an environment lacking the NFC capability.
    /// Every control is disabled for the whole session.
    pub fn unsupported() -> Self {
        let mut session = Self::new();
        session.supported = false;
        session.update_status("This environment does not support NFC!", Severity::Error);
        session
    }

    pub fn is_supported(&self) -> bool {
        self.supported
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn log(&self) -> &LogView {
        &self.log
    }

    pub fn record_kind(&self) -> RecordKind {
        self.kind
    }

    pub fn form(&self) -> &FormLayout {
        &self.form
    }

    /// Starts scanning for tags.
    /// Feed each event of the returned scan to [`Self::handle_scan_event`].
    pub fn scan<R: Reader>(&mut self, reader: &R) -> Result<Scan<R::Poller>> {
        self.ensure_supported()?;
        self.update_status(
            "Scan started, bring an NFC tag close to the reader...",
            Severity::Loading,
        );

        reader.scan().map_err(|e| {
            self.update_status(format!("Failed to start scanning: {}", e), Severity::Error);
            e.into()
        })
    }

    pub fn handle_scan_event(&mut self, event: ScanEvent) {
        match event {
            ScanEvent::Reading(message) => {
                self.update_status("Read successful!", Severity::Success);
                self.show_message(&message);
            }
            ScanEvent::Error(message) => {
                let message = match message.is_empty() {
                    true => "unknown error".to_string(),
                    _ => message,
                };

                self.update_status(
                    format!("Error while scanning: {}", message),
                    Severity::Error,
                );
            }
        }
    }

    /// Renders the message into the log, replacing its previous content.
    pub fn show_message(&mut self, message: &TagMessage) {
        self.log = match render::render(message) {
            Ok(log) => LogView::Rendered(log),
            Err(e) => self.diagnose(e),
        };
    }

    /// Validates the request, then writes it to the next tag presented.
    /// The writer is not invoked at all if the validation fails.
    pub fn write<W: Writer>(&mut self, writer: &W, request: &WriteRequest) -> Result<()> {
        let message = self.prepare_write(request)?;

        self.complete_write(request.action(), writer.write(&message))
    }

    /// Validates the request and builds the message, announcing the pending write.
    /// Pass the outcome of writing the message to [`Self::complete_write`].
    pub fn prepare_write(&mut self, request: &WriteRequest) -> Result<TagMessage> {
        self.ensure_supported()?;

        let message = request.build().map_err(|e| {
            self.update_status(e.to_string(), Severity::Error);
            e
        })?;

        self.update_status(
            format!(
                "Ready to {}, bring an NFC tag close to the reader...",
                request.action().to_string().to_lowercase()
            ),
            Severity::Loading,
        );

        Ok(message)
    }

    pub fn complete_write(&mut self, action: Action, result: nfc::Result<()>) -> Result<()> {
        match result {
            Ok(()) => {
                self.update_status(format!("{} succeeded!", action), Severity::Success);
                Ok(())
            }
            Err(e) => {
                self.update_status(format!("{} failed: {}", action, e), Severity::Error);
                Err(e.into())
            }
        }
    }

    pub fn clear_log(&mut self) -> Result<()> {
        self.ensure_supported()?;

        self.log = LogView::Placeholder;
        self.update_status("Log cleared", Severity::Info);

        Ok(())
    }

    /// Switches the form to the record type.
    pub fn select_record_kind(&mut self, kind: RecordKind) -> Result<()> {
        self.ensure_supported()?;

        self.kind = kind;
        self.form = FormLayout::for_kind(kind);
        self.update_status(
            format!("Switched to \"{}\" mode", kind.label()),
            Severity::Info,
        );

        Ok(())
    }

    fn diagnose(&mut self, e: RenderError) -> LogView {
        warn!("Error caught while rendering: {:?}", e);

        self.update_status(
            "An internal error occurred while processing the data!",
            Severity::Error,
        );

        LogView::Diagnostic {
            name: e.name().to_string(),
            message: e.to_string(),
        }
    }

    fn ensure_supported(&self) -> Result<()> {
        match self.supported {
            true => Ok(()),
            _ => Err(Error::Unsupported),
        }
    }

    fn update_status(&mut self, message: impl Into<String>, severity: Severity) {
        let message = message.into();
        debug!("Status ({:?}): {}", severity, message);

        self.status = Status { message, severity };
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::time::Duration;

    use super::*;
    use crate::form::Field;
    use crate::nfc::Poller;
    use crate::record::{Record, MEDIA_TYPE_JSON};
    use crate::write::AuthType;

    struct FakeReader {
        fail: bool,
        events: RefCell<Option<VecDeque<nfc::Result<Option<TagMessage>>>>>,
    }

    struct FakePoller(VecDeque<nfc::Result<Option<TagMessage>>>);

    impl Poller for FakePoller {
        fn poll(&mut self) -> nfc::Result<Option<TagMessage>> {
            self.0.pop_front().unwrap_or(Ok(None))
        }
    }

    impl Reader for FakeReader {
        type Poller = FakePoller;

        fn scan(&self) -> nfc::Result<Scan<FakePoller>> {
            if self.fail {
                return Err(nfc::Error::Unavailable("no reader".to_string()));
            }

            let events = self.events.borrow_mut().take().unwrap_or_default();
            Ok(Scan::new(FakePoller(events), Duration::from_millis(1)))
        }
    }

    #[derive(Default)]
    struct FakeWriter {
        fail: bool,
        written: RefCell<Vec<TagMessage>>,
        calls: Cell<usize>,
    }

    impl Writer for FakeWriter {
        fn write(&self, message: &TagMessage) -> nfc::Result<()> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(nfc::Error::Platform("tag lost".into()));
            }

            self.written.borrow_mut().push(message.clone());
            Ok(())
        }
    }

    #[test]
    fn test_read_flow() {
        let reader = FakeReader {
            fail: false,
            events: RefCell::new(Some(VecDeque::from(vec![
                Ok(Some(TagMessage::new(vec![Record::text("hello")]))),
                Err(nfc::Error::Platform("".into())),
                Ok(Some(TagMessage::new(vec![]))),
            ]))),
        };
        let mut session = Session::new();

        let mut scan = session.scan(&reader).unwrap();
        assert_eq!(Severity::Loading, session.status().severity);

        session.handle_scan_event(scan.next().unwrap());
        assert_eq!(Severity::Success, session.status().severity);
        assert!(session.log().to_string().contains("> Content: hello\n"));

        session.handle_scan_event(scan.next().unwrap());
        assert_eq!(
            Status {
                message: "Error while scanning: unknown error".to_string(),
                severity: Severity::Error,
            },
            *session.status()
        );
        // Errors leave the log untouched.
        assert!(session.log().to_string().contains("> Content: hello\n"));

        // Each read replaces the log entirely.
        session.handle_scan_event(scan.next().unwrap());
        assert_eq!(
            "> Serial number: N/A\n> Tag is empty or contains no recognizable NDEF records.",
            session.log().to_string()
        );
    }

    #[test]
    fn test_scan_start_failure() {
        let reader = FakeReader {
            fail: true,
            events: RefCell::new(None),
        };
        let mut session = Session::new();

        assert!(matches!(session.scan(&reader), Err(Error::Nfc(_))));
        assert_eq!(
            "Failed to start scanning: NFC is not available: no reader",
            session.status().message
        );
        assert_eq!(Severity::Error, session.status().severity);
    }

    #[test]
    fn test_render_error_is_diagnosed() {
        let mut session = Session::new();
        session.show_message(&TagMessage::new(vec![Record::Text {
            data: b"x".to_vec(),
            encoding: Some("ebcdic".to_string()),
            lang: None,
        }]));

        assert_eq!(Severity::Error, session.status().severity);
        assert_eq!(
            LogView::Diagnostic {
                name: "UnsupportedEncoding".to_string(),
                message: "Unsupported text encoding: ebcdic".to_string(),
            },
            *session.log()
        );
        assert!(session
            .log()
            .to_string()
            .starts_with("Caught an error while rendering the data:\n- Error name: UnsupportedEncoding\n"));
    }

    #[test]
    fn test_write_flow() {
        let writer = FakeWriter::default();
        let mut session = Session::new();

        session
            .write(&writer, &WriteRequest::Json(r#"{"a":1}"#.to_string()))
            .unwrap();

        assert_eq!("Write succeeded!", session.status().message);
        assert_eq!(Severity::Success, session.status().severity);
        assert_eq!(
            vec![TagMessage::new(vec![Record::mime(MEDIA_TYPE_JSON, &br#"{"a":1}"#[..])])],
            *writer.written.borrow()
        );
        assert_eq!(LogView::Placeholder, *session.log());
    }

    #[test]
    fn test_validation_failure_skips_writer() {
        let writer = FakeWriter::default();
        let mut session = Session::new();

        let request = WriteRequest::Wifi {
            ssid: String::new(),
            password: "secret".to_string(),
            auth: AuthType::Wpa,
        };
        assert!(matches!(
            session.write(&writer, &request),
            Err(Error::Validation(ValidationError::EmptySsid))
        ));
        assert_eq!("Wi-Fi name (SSID) cannot be empty!", session.status().message);

        let request = WriteRequest::Json("{bad".to_string());
        assert!(session.write(&writer, &request).is_err());
        assert_eq!("Invalid JSON format!", session.status().message);
        assert_eq!(Severity::Error, session.status().severity);

        assert_eq!(0, writer.calls.get());
    }

    #[test]
    fn test_prepare_write_announces_action() {
        let mut session = Session::new();
        let message = session.prepare_write(&WriteRequest::Empty).unwrap();

        assert_eq!(vec![Record::Empty], message.records);
        assert_eq!(
            Status {
                message: "Ready to erase, bring an NFC tag close to the reader...".to_string(),
                severity: Severity::Loading,
            },
            *session.status()
        );

        session.complete_write(Action::Erase, Ok(())).unwrap();
        assert_eq!("Erase succeeded!", session.status().message);
    }

    #[test]
    fn test_erase_failure() {
        let writer = FakeWriter {
            fail: true,
            ..Default::default()
        };
        let mut session = Session::new();

        assert!(session.write(&writer, &WriteRequest::Empty).is_err());
        assert_eq!("Erase failed: tag lost", session.status().message);
        assert_eq!(1, writer.calls.get());
    }

    #[test]
    fn test_clear_log() {
        let mut session = Session::new();
        session.show_message(&TagMessage::new(vec![Record::text("hello")]));

        session.clear_log().unwrap();

        assert_eq!(INITIAL_LOG, session.log().to_string());
        assert_eq!("Log cleared", session.status().message);
    }

    #[test]
    fn test_select_record_kind() {
        let mut session = Session::new();
        session.select_record_kind(RecordKind::Wifi).unwrap();

        assert!(session.form().is_visible(Field::Wifi));
        assert!(!session.form().is_visible(Field::Text));
        assert!(!session.form().is_visible(Field::Json));
        assert_eq!("Switched to \"Wi-Fi\" mode", session.status().message);
    }

    #[test]
    fn test_unsupported_disables_everything() {
        let writer = FakeWriter::default();
        let reader = FakeReader {
            fail: false,
            events: RefCell::new(None),
        };
        let mut session = Session::unsupported();

        assert!(!session.is_supported());
        assert!(matches!(session.scan(&reader), Err(Error::Unsupported)));
        assert!(matches!(
            session.write(&writer, &WriteRequest::Empty),
            Err(Error::Unsupported)
        ));
        assert!(session.clear_log().is_err());
        assert!(session.select_record_kind(RecordKind::Url).is_err());

        assert_eq!(0, writer.calls.get());
        assert_eq!(
            "This environment does not support NFC!",
            session.status().message
        );
    }
}
