use std::io::Write;

#[derive(Clone, Debug, PartialEq)]
pub struct AlertConfig {
    /// Ring the terminal bell when a countdown reaches zero.
    pub bell: bool,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self { bell: true }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Note {
    /// The backend timer value could not be read and counted as 0 seconds.
    UnparsedTimer { raw: String },
    WeakSecret,
    /// The link's `row` differs from the signed one; the signed row is shown.
    RowMismatch { link_row: u32, token_row: u32 },
    RowOutOfRange { requested: u32, max_rows: u32 },
    BackendUnavailable(String),
    EditingLocked,
    CountdownFinished { row: u32 },
}

impl Note {
    pub fn message(&self) -> String {
        match self {
            Note::UnparsedTimer { raw } => {
                format!("Timer value {:?} was not understood; counting down from 0.", raw)
            }
            Note::WeakSecret => {
                "No handoff secret configured; links are signed with the development key.".into()
            }
            Note::RowMismatch { link_row, token_row } => format!(
                "Link asks for row {} but the timer token is for row {}; showing row {}.",
                link_row, token_row, token_row
            ),
            Note::RowOutOfRange { requested, max_rows } => format!(
                "Row {} is past the last row; showing row {}.",
                requested, max_rows
            ),
            Note::BackendUnavailable(reason) => format!("Row data unavailable: {}", reason),
            Note::EditingLocked => "Locked view: editing is disabled.".into(),
            Note::CountdownFinished { row } => format!("Row {} countdown finished!", row),
        }
    }

    pub fn level(&self) -> log::Level {
        match self {
            Note::WeakSecret
            | Note::RowMismatch { .. }
            | Note::RowOutOfRange { .. }
            | Note::BackendUnavailable(_) => log::Level::Warn,
            _ => log::Level::Info,
        }
    }
}

pub fn fire_alert(config: &AlertConfig, note: &Note) {
    log::log!(note.level(), "{}", note.message());
    if config.bell && matches!(note, Note::CountdownFinished { .. }) {
        let mut out = std::io::stdout();
        out.write_all(b"\x07").ok();
        out.flush().ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_messages() {
        let note = Note::UnparsedTimer { raw: "ten".into() };
        assert!(note.message().contains("\"ten\""));
        assert_eq!(note.level(), log::Level::Info);
        assert_eq!(Note::WeakSecret.level(), log::Level::Warn);
        assert!(Note::RowMismatch { link_row: 2, token_row: 5 }
            .message()
            .contains("showing row 5"));
    }
}
