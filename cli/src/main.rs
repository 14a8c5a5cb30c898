mod output;
mod prompt;

use std::num::NonZeroUsize;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use nfctag::nfc::{ExclusiveWriter, ScanEvent, Writer};
use nfctag::pcsc::Pcsc;
use nfctag::write::AuthType;
use nfctag::{Session, WriteRequest};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error(transparent)]
    Session(#[from] nfctag::session::Error),

    #[error("Failed to prompt: {0}")]
    Prompt(#[from] std::io::Error),

    #[error("Cancelled")]
    Cancelled,

    #[error("Failed to serialize the message: {0}")]
    Json(#[from] serde_json::Error),
}

type Result<T> = std::result::Result<T, Error>;

#[derive(Parser)]
#[command(name = "nfctag", version, about)]
struct Cli {
    /// Uses the first reader whose name contains this text.
    #[arg(long, global = true)]
    reader: Option<String>,

    /// Interval to poll the reader for tags, in milliseconds.
    #[arg(long, global = true, default_value_t = 500)]
    poll_interval: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reads the tags presented to the reader, printing their content.
    Read {
        /// Stops after reading this number of tags.
        #[arg(long)]
        count: Option<NonZeroUsize>,

        /// Stops scanning after this number of seconds.
        #[arg(long)]
        timeout: Option<u64>,

        /// Prints the messages as JSON instead of the log.
        #[arg(long)]
        json: bool,
    },

    /// Writes a record to the next tag presented.
    Write {
        #[command(subcommand)]
        record: WriteCommand,
    },

    /// Fills in the write form interactively, then writes it.
    Form,
}

#[derive(Subcommand)]
enum WriteCommand {
    /// A plain text record.
    Text { text: String },

    /// An URL record. The URL is not checked.
    Url { url: String },

    /// A JSON document, stored as an application/json record.
    Json { json: String },

    /// Wi-Fi credentials, stored as a WIFI: text record.
    Wifi {
        #[arg(long)]
        ssid: String,

        #[arg(long, default_value = "")]
        password: String,

        /// WPA, WEP or nopass.
        #[arg(long, default_value = "WPA")]
        auth: AuthType,
    },

    /// A single empty record, erasing the tag.
    Empty,
}

impl From<WriteCommand> for WriteRequest {
    fn from(command: WriteCommand) -> Self {
        match command {
            WriteCommand::Text { text } => WriteRequest::Text(text),
            WriteCommand::Url { url } => WriteRequest::Url(url),
            WriteCommand::Json { json } => WriteRequest::Json(json),
            WriteCommand::Wifi {
                ssid,
                password,
                auth,
            } => WriteRequest::Wifi {
                ssid,
                password,
                auth,
            },
            WriteCommand::Empty => WriteRequest::Empty,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // The session has already reported the failure on the status line.
            debug!("Exiting with an error: {:?}", e);

            if let Error::Prompt(_) | Error::Json(_) | Error::Cancelled = e {
                eprintln!("{}", e);
            }

            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut pcsc = Pcsc::new().with_poll_interval(Duration::from_millis(cli.poll_interval));
    if let Some(reader) = cli.reader {
        pcsc = pcsc.with_reader(reader);
    }

    let mut session = match pcsc.is_available() {
        true => Session::new(),
        _ => Session::unsupported(),
    };

    if !session.is_supported() {
        output::status(&session);
        return Err(nfctag::session::Error::Unsupported.into());
    }

    match cli.command {
        Commands::Read {
            count,
            timeout,
            json,
        } => read(&mut session, &pcsc, count, timeout, json),
        Commands::Write { record } => write(&mut session, pcsc, &record.into()),
        Commands::Form => {
            let request = prompt::fill_form(&mut session)?;
            write(&mut session, pcsc, &request)
        }
    }
}

fn write(session: &mut Session, pcsc: Pcsc, request: &WriteRequest) -> Result<()> {
    let writer = ExclusiveWriter::new(pcsc);

    let message = session.prepare_write(request);
    output::status(session);
    let message = message?;

    let result = session.complete_write(request.action(), writer.write(&message));
    output::status(session);

    result.map_err(Error::from)
}

fn read(
    session: &mut Session,
    pcsc: &Pcsc,
    count: Option<NonZeroUsize>,
    timeout: Option<u64>,
    json: bool,
) -> Result<()> {
    let scan = session.scan(pcsc);
    output::status(session);
    let scan = scan?;

    if let Some(timeout) = timeout {
        let handle = scan.cancel_handle();
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(timeout));
            handle.cancel();
        });
    }

    let mut read = 0;
    for event in scan {
        let reading = match &event {
            ScanEvent::Reading(message) => {
                if json {
                    println!("{}", serde_json::to_string_pretty(message)?);
                }

                true
            }
            ScanEvent::Error(_) => false,
        };

        session.handle_scan_event(event);
        output::status(session);

        if !reading {
            continue;
        }

        if !json {
            output::log(session);
        }

        read += 1;
        if count.map_or(false, |count| read >= count.get()) {
            break;
        }
    }

    Ok(())
}
