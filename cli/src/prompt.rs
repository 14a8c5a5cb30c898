use dialoguer::{Confirm, Input, Password, Select};
use nfctag::form::{Field, FormState, RecordKind};
use nfctag::write::AuthType;
use nfctag::{Session, WriteRequest};

use crate::{output, Result};

/// Walks through the write form on the terminal.
/// Only the fields shown for the selected record type are asked.
pub fn fill_form(session: &mut Session) -> Result<WriteRequest> {
    let labels = RecordKind::ALL.map(|kind| kind.label());
    let index = Select::new()
        .with_prompt("Record type")
        .items(&labels)
        .default(0)
        .interact()?;

    let kind = RecordKind::ALL[index];
    session.select_record_kind(kind)?;
    output::status(session);

    let layout = session.form().clone();
    let mut state = FormState {
        kind,
        ..Default::default()
    };

    match layout.visible {
        Some(Field::Text) => {
            state.text = Input::<String>::new()
                .with_prompt(layout.placeholder.unwrap_or(kind.label()))
                .allow_empty(true)
                .interact_text()?;
        }
        Some(Field::Json) => {
            state.json = Input::<String>::new()
                .with_prompt("JSON")
                .allow_empty(true)
                .interact_text()?;
        }
        Some(Field::Wifi) => {
            state.ssid = Input::<String>::new()
                .with_prompt("Wi-Fi name (SSID)")
                .allow_empty(true)
                .interact_text()?;
            state.password = Password::new()
                .with_prompt("Password")
                .allow_empty_password(true)
                .interact()?;

            let auth = Select::new()
                .with_prompt("Authentication")
                .items(&AuthType::ALL.map(|auth| auth.as_str()))
                .default(0)
                .interact()?;
            state.auth = AuthType::ALL[auth];
        }
        None => {}
    }

    let proceed = Confirm::new()
        .with_prompt(layout.write_button)
        .default(true)
        .interact()?;

    match proceed {
        true => Ok(state.request()),
        _ => Err(crate::Error::Cancelled),
    }
}
