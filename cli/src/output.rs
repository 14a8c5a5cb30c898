use std::io::{stdout, IsTerminal};

use nfctag::session::{LogView, Severity};
use nfctag::Session;

/// Prints the status line to stderr.
pub fn status(session: &Session) {
    let status = session.status();
    let label = match status.severity {
        Severity::Info => "info",
        Severity::Loading => "wait",
        Severity::Error => "error",
        Severity::Success => "ok",
    };

    eprintln!("[{}] {}", label, status.message);
}

/// Prints the log to stdout, with clickable links when it is a terminal.
pub fn log(session: &Session) {
    match session.log() {
        LogView::Rendered(log) if stdout().is_terminal() => {
            println!("{}", log.format_with(hyperlink))
        }
        view => println!("{}", view),
    }
}

/// Wraps the URL into an OSC 8 hyperlink.
/// Control characters are dropped, so the URL cannot terminate the sequence early.
fn hyperlink(url: &str) -> String {
    let url = url.chars().filter(|c| !c.is_control()).collect::<String>();

    format!("\x1b]8;;{0}\x1b\\{0}\x1b]8;;\x1b\\", url)
}
