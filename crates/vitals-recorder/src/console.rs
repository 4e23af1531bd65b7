//! Line-oriented console front-end.
//!
//! Reads one command per line from stdin, forwards it to the
//! [`RecordingSession`], and prints session events as they arrive.

use std::str::FromStr;

use recorder_core::formatting::format_sample_lines;
use recorder_core::models::Record;
use recorder_core::RecorderError;
use recorder_core::time_utils::to_iso;
use recorder_runtime::orchestrator::{RecordingSession, SessionEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

const HELP: &str = "\
Commands:
  new                      open a new patient entry
  set <field> <value>      set a form field (e.g. set fullName Jane Doe)
  show                     show the open entry
  capture                  freeze the current sensor values
  retake                   discard the captured values
  save                     save the entry to the session ledger
  cancel                   abandon the open entry
  list                     list saved records, newest first
  export                   export the session to CSV
  export-patient <id>      export one patient's records to CSV
  live                     show the current sensor values
  elapsed                  show the session clock
  help                     show this help
  quit                     stop recording";

// ── Command ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    New,
    Set { field: String, value: String },
    Show,
    Capture,
    Retake,
    Save,
    Cancel,
    List,
    Export,
    ExportPatient(String),
    Live,
    Elapsed,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (line, ""),
        };

        let command = match head {
            "new" => Command::New,
            "set" => {
                let (field, value) = match rest.split_once(char::is_whitespace) {
                    Some((field, value)) => (field, value.trim()),
                    None => (rest, ""),
                };
                if field.is_empty() {
                    return Err("usage: set <field> <value>".to_string());
                }
                Command::Set {
                    field: field.to_string(),
                    value: value.to_string(),
                }
            }
            "show" => Command::Show,
            "capture" => Command::Capture,
            "retake" => Command::Retake,
            "save" => Command::Save,
            "cancel" => Command::Cancel,
            "list" => Command::List,
            "export" => Command::Export,
            "export-patient" => {
                if rest.is_empty() {
                    return Err("usage: export-patient <id>".to_string());
                }
                Command::ExportPatient(rest.to_string())
            }
            "live" => Command::Live,
            "elapsed" => Command::Elapsed,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(format!("unknown command: {other} (try `help`)")),
        };
        Ok(command)
    }
}

// ── Event loop ────────────────────────────────────────────────────────────────

/// Run the console until `quit`, end of input, or Ctrl+C.
pub async fn run(
    mut session: RecordingSession,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
) -> anyhow::Result<()> {
    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<Command>() {
                    Ok(Command::Quit) => break,
                    Ok(command) => execute(&mut session, command).await,
                    Err(msg) => println!("{msg}"),
                }
            }
            Some(event) = events.recv() => {
                if let Some(text) = render_event(&event) {
                    println!("{text}");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received; stopping session");
                break;
            }
        }
    }

    session.shutdown().await;
    Ok(())
}

/// Apply one command. Failures are printed; the session keeps running.
async fn execute(session: &mut RecordingSession, command: Command) {
    let outcome: recorder_core::Result<()> = match command {
        Command::New => session.open_entry().map(|()| println!("New entry opened.")),
        Command::Set { field, value } => session.set_field(&field, &value),
        Command::Show => {
            match session.draft() {
                Some(draft) => {
                    for (key, value) in draft.columns() {
                        println!("  {key:<24} {value}");
                    }
                    println!("  {:<24} {}", "capture", session.capture_status());
                }
                None => println!("No open entry. Use `new`."),
            }
            Ok(())
        }
        Command::Capture => session.capture().map(|sample| {
            println!("Captured at {}:", to_iso(sample.timestamp));
            for line in format_sample_lines(&sample) {
                println!("  {line}");
            }
        }),
        Command::Retake => session.retake().map(|()| println!("Snapshot discarded.")),
        // Success and failure are reported through session events.
        Command::Save => session.save().await.map(|_| ()),
        Command::Cancel => session.cancel().map(|()| println!("Entry discarded.")),
        Command::List => {
            let records = session.display_order();
            if records.is_empty() {
                println!("No records saved yet.");
            }
            for record in &records {
                println!("{}", render_record(record));
            }
            Ok(())
        }
        Command::Export => session.export_session().map(|_| ()),
        Command::ExportPatient(id) => session.export_patient(&id).map(|_| ()),
        Command::Live => {
            match session.current_sample() {
                Some(sample) => {
                    for line in format_sample_lines(&sample) {
                        println!("  {line}");
                    }
                }
                None => println!("No sensor data received yet."),
            }
            Ok(())
        }
        Command::Elapsed => {
            println!("Session time: {}", session.elapsed_display());
            Ok(())
        }
        Command::Help => {
            println!("{HELP}");
            Ok(())
        }
        Command::Quit => Ok(()),
    };

    if let Err(e) = outcome {
        match failure_message(&e) {
            Some(text) => println!("{text}"),
            None => tracing::debug!(error = %e, "command failed"),
        }
    }
}

/// Text to print for a failed command, or `None` when a session event
/// already reports it (or it is not the user's to fix).
fn failure_message(e: &RecorderError) -> Option<String> {
    match e {
        RecorderError::Validation(_) | RecorderError::CaptureMissing => None,
        e if e.is_local() => Some(e.to_string()),
        _ => None,
    }
}

// ── Rendering ─────────────────────────────────────────────────────────────────

/// One-line summary of a saved record.
pub fn render_record(record: &Record) -> String {
    format!(
        "#{} {} {} ({}) BMI {}",
        record.id(),
        to_iso(record.timestamp()),
        record.full_name(),
        record.patient_id(),
        record.bmi()
    )
}

/// Text for an event, or `None` for events that only feed on-demand views.
pub fn render_event(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::SensorUpdated(_) => None,
        SessionEvent::CaptureChanged(_) => None,
        SessionEvent::LedgerChanged(records) => {
            Some(format!("Session ledger: {} record(s).", records.len()))
        }
        SessionEvent::ValidationFailed(msg) => Some(format!("Cannot save: {msg}.")),
        SessionEvent::CaptureMissing => {
            Some("Please capture sensor data before saving.".to_string())
        }
        SessionEvent::SaveCompleted {
            record_id,
            survey_url,
        } => Some(format!(
            "Record {record_id} saved. Follow-up survey: {survey_url}"
        )),
        SessionEvent::SaveFailed(msg) => Some(format!("{msg}. Your entry is kept; retry with `save`.")),
        SessionEvent::ExportCompleted(path) => Some(format!("Exported to {}", path.display())),
        SessionEvent::ExportFailed(msg) => Some(format!("Export failed: {msg}")),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
