//! PC/SC support for nfctag library.
//! Can be enabled by turning `pcsc` feature on.
//!
//! ## What is PC/SC?
//! PC/SC (Personal Computer/Smart Card) is an abstraction layer for communicating with Smart Cards
//! from Windows. Using this layer, applications can connect to any devices that supports PC/SC,
//! without depending on their driver implementation. Windows and macOS supports PC/SC by themselves,
//! Linux also supports by installing pcsc-lite shared library.
//! Most contactless readers expose the tags presented to them as cards through this layer.
//!
//! ## Supported tags
//! Only NFC Forum Type 4 tags are supported, since they are accessed with plain ISO/IEC 7816-4
//! commands which the reader passes through as is.
//!
//! ## Usage
//! ```rust,no_run
//! use nfctag::nfc::{Reader, ScanEvent};
//! use nfctag::pcsc::Pcsc;
//!
//! let pcsc = Pcsc::new();
//! for event in pcsc.scan().unwrap() {
//!     if let ScanEvent::Reading(message) = event {
//!         println!("{:?}", message);
//!     }
//! }
//! ```

use std::ffi::{CStr, CString};
use std::thread::sleep;
use std::time::Duration;

use pcsc::{Protocols, Scope, ShareMode, MAX_BUFFER_SIZE};

#[cfg(feature = "tracing")]
use tracing::{debug, info};

use crate::nfc::{self, HandleError, Handler, HandlerInCtx, Poller, Scan};
use crate::record::TagMessage;
use crate::type4::{self, Tag};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Error occurred while communicating with PC/SC: {0}")]
    PcscError(#[from] pcsc::Error),

    #[error("Reader not found on PC/SC service")]
    ReaderNotFound,

    #[error(transparent)]
    Tag(#[from] type4::Error),
}

pub(crate) type Result<T> = std::result::Result<T, Error>;

impl From<Error> for nfc::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::ReaderNotFound
            | Error::PcscError(pcsc::Error::NoService)
            | Error::PcscError(pcsc::Error::ServiceStopped) => {
                nfc::Error::Unavailable(e.to_string())
            }
            _ => nfc::Error::Platform(Box::new(e)),
        }
    }
}

/// PC/SC context.
pub struct Context {
    ctx: pcsc::Context,
}

impl Context {
    /// Creates a PC/SC context in user scope.
    pub fn try_new() -> Result<Self> {
        Ok(Self {
            ctx: pcsc::Context::establish(Scope::User)?,
        })
    }

    /// Finds a PC/SC device whose name contains `name`, or the first one if not specified.
    pub fn open(&self, name: Option<&str>) -> Result<Device> {
        let mut buf = [0u8; 2048];

        let mut readers = self.ctx.list_readers(&mut buf).map_err(|e| match e {
            pcsc::Error::NoReadersAvailable => Error::ReaderNotFound,
            e => Error::PcscError(e),
        })?;

        readers
            .find(|reader| match name {
                Some(name) => reader.to_string_lossy().contains(name),
                None => true,
            })
            .map(Device::new)
            .ok_or(Error::ReaderNotFound)
    }
}

/// PC/SC device handle.
pub struct Device {
    reader: CString,
}

impl Device {
    fn new(reader: &CStr) -> Self {
        debug!("Using device: {}", reader.to_str().unwrap_or_default());

        Self {
            reader: reader.to_owned(),
        }
    }

    pub fn name(&self) -> String {
        self.reader.to_string_lossy().to_string()
    }

    /// Connects to the card presented to the device, if any.
    pub fn try_connect(&self, ctx: &Context) -> Result<Option<PcscCard>> {
        match ctx
            .ctx
            .connect(&self.reader, ShareMode::Shared, Protocols::ANY)
        {
            Ok(card) => Ok(Some(PcscCard::new(card))),
            Err(pcsc::Error::NoSmartcard) | Err(pcsc::Error::RemovedCard) => Ok(None),
            Err(e) => Err(Error::PcscError(e)),
        }
    }

    /// Connects to the card presented to the device after waiting them.
    pub fn connect(&self, ctx: &Context, interval: Duration) -> Result<PcscCard> {
        // Waits for touching card, polling for each interval.
        debug!("Waiting for a card");

        loop {
            if let Some(card) = self.try_connect(ctx)? {
                debug!("Connected to your card");

                return Ok(card);
            }

            info!("Still waiting for your card...");
            sleep(interval);
        }
    }
}

/// A card to be communicated through PC/SC.
pub struct PcscCard {
    card: pcsc::Card,
}

impl PcscCard {
    fn new(card: pcsc::Card) -> Self {
        Self { card }
    }

    /// Transmits an APDU command to the card, then receives a response from them.
    pub fn transmit(&self, tx: &[u8]) -> Result<Vec<u8>> {
        debug!("TX: {}", hex::encode(tx));

        let mut rx = [0u8; MAX_BUFFER_SIZE];
        let rx = self.card.transmit(tx, &mut rx)?;

        debug!("RX: {}", hex::encode(rx));

        Ok(Vec::from(rx))
    }
}

impl HandlerInCtx for PcscCard {
    fn handle_in_ctx(&self, _: (), command: &[u8], response: &mut [u8]) -> apdu::core::Result {
        let rx = self
            .transmit(command)
            .map_err(|e| HandleError::Nfc(Box::new(e)))?;

        if rx.len() > response.len() {
            return Err(HandleError::NotEnoughBuffer(rx.len()));
        }

        response[..rx.len()].copy_from_slice(&rx);

        Ok(rx.len())
    }
}

impl Handler for PcscCard {}

/// NFC capability backed by a PC/SC reader.
#[derive(Clone, Debug)]
pub struct Pcsc {
    reader: Option<String>,
    interval: Duration,
}

impl Default for Pcsc {
    fn default() -> Self {
        Self {
            reader: None,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl Pcsc {
    pub fn new() -> Self {
        Default::default()
    }

    /// Uses the first reader whose name contains `name`.
    pub fn with_reader(mut self, name: impl Into<String>) -> Self {
        self.reader = Some(name.into());
        self
    }

    /// Sets the interval to poll the reader for tags.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Determines whether the PC/SC service can be reached.
    pub fn is_available(&self) -> bool {
        Context::try_new().is_ok()
    }

    fn open(&self) -> Result<(Context, Device)> {
        let ctx = Context::try_new()?;
        let device = ctx.open(self.reader.as_deref())?;

        Ok((ctx, device))
    }
}

/// Polls the reader, reading each card once per presentation.
pub struct PcscPoller {
    ctx: Context,
    device: Device,
    presented: bool,
}

impl Poller for PcscPoller {
    fn poll(&mut self) -> nfc::Result<Option<TagMessage>> {
        let card = match self.device.try_connect(&self.ctx)? {
            Some(card) => card,
            None => {
                if self.presented {
                    debug!("Card removed");
                }

                self.presented = false;
                return Ok(None);
            }
        };

        // Still the card that was already reported
        if self.presented {
            return Ok(None);
        }

        self.presented = true;

        let message = Tag::new(Box::new(card))
            .read_message()
            .map_err(Error::Tag)?;

        info!("Read {} record(s) from the card", message.records.len());

        Ok(Some(message))
    }
}

impl nfc::Reader for Pcsc {
    type Poller = PcscPoller;

    fn scan(&self) -> nfc::Result<Scan<PcscPoller>> {
        let (ctx, device) = self.open()?;

        info!("Scanning for tags on {}", device.name());

        Ok(Scan::new(
            PcscPoller {
                ctx,
                device,
                presented: false,
            },
            self.interval,
        ))
    }
}

impl nfc::Writer for Pcsc {
    fn write(&self, message: &TagMessage) -> nfc::Result<()> {
        let (ctx, device) = self.open()?;
        let card = device.connect(&ctx, self.interval)?;

        Tag::new(Box::new(card))
            .write_message(message)
            .map_err(Error::Tag)?;

        Ok(())
    }
}
