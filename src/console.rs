//! Line-oriented front end for a wizard session
//!
//! `ensemble run` reads one command per line, from stdin or a script file:
//!
//! ```text
//! set nome=Trio Jazz
//! set aceitaContratacao=true
//! set-json integrantes=[{"nome": "Rui", "instrumento": "baixo"}]
//! attach logo=./logo.png
//! next
//! submit
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use thiserror::Error;

use crate::fields::{FieldPath, FieldValue, FileHandle};
use crate::wizard::{FieldRule, NavOutcome, SubmitOutcome, WizardPhase, WizardSession};

/// One parsed console line
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Set { path: FieldPath, value: FieldValue },
    Unset(FieldPath),
    Attach { path: FieldPath, file: PathBuf },
    Next,
    Prev,
    Submit,
    Cancel,
    Show,
    Steps,
    Help,
    Quit,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),

    #[error("'{command}' expects {expected}")]
    MissingArgument {
        command: &'static str,
        expected: &'static str,
    },

    #[error("invalid JSON for '{path}': {reason}")]
    InvalidJson { path: String, reason: String },
}

/// Whether the console loop should keep reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Finished,
}

pub const HELP: &str = "\
commands:
  set <path>=<text>        set a text field (true/false become booleans)
  set-json <path>=<json>   set any value from JSON (lists, records, numbers)
  unset <path>             remove a field
  attach <path>=<file>     attach a local file
  next | prev              move between steps
  submit                   submit from the last step
  cancel                   discard the session (the draft is kept)
  show | steps | help | quit";

/// Parse one line; `Ok(None)` for blank lines and comments
pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word {
        "set" => {
            let (path, raw) = assignment("set", rest)?;
            let value = match raw {
                "true" => FieldValue::Bool(true),
                "false" => FieldValue::Bool(false),
                other => FieldValue::text(other),
            };
            Command::Set { path, value }
        }
        "set-json" => {
            let (path, raw) = assignment("set-json", rest)?;
            let json: serde_json::Value =
                serde_json::from_str(raw).map_err(|e| CommandError::InvalidJson {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            match FieldValue::from_json(&json) {
                Some(value) => Command::Set { path, value },
                None if json.is_null() => Command::Unset(path),
                None => {
                    return Err(CommandError::InvalidJson {
                        path,
                        reason: "expected a string, number, boolean or array".to_string(),
                    })
                }
            }
        }
        "unset" => {
            if rest.is_empty() {
                return Err(CommandError::MissingArgument {
                    command: "unset",
                    expected: "a field path",
                });
            }
            Command::Unset(rest.to_string())
        }
        "attach" => {
            let (path, file) = assignment("attach", rest)?;
            Command::Attach {
                path,
                file: PathBuf::from(file),
            }
        }
        "next" => Command::Next,
        "prev" | "back" => Command::Prev,
        "submit" => Command::Submit,
        "cancel" => Command::Cancel,
        "show" => Command::Show,
        "steps" => Command::Steps,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

fn assignment<'a>(
    command: &'static str,
    rest: &'a str,
) -> Result<(FieldPath, &'a str), CommandError> {
    match rest.split_once('=') {
        Some((path, value)) if !path.trim().is_empty() => {
            Ok((path.trim().to_string(), value.trim()))
        }
        _ => Err(CommandError::MissingArgument {
            command,
            expected: "<path>=<value>",
        }),
    }
}

fn guess_mime_type(file: &std::path::Path) -> Option<String> {
    let ext = file.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        _ => return None,
    };
    Some(mime.to_string())
}

// ─── Execution ──────────────────────────────────────────────────────────────

/// Apply a command to the session and print the result
pub async fn execute(
    session: &mut WizardSession,
    command: Command,
    out: &mut dyn Write,
) -> Result<Control> {
    match command {
        Command::Set { path, value } => {
            if session.set_field(path, value) {
                report_step_change(session, out)?;
            } else {
                writeln!(out, "session is closed")?;
            }
        }
        Command::Unset(path) => {
            if session.remove_field(&path) {
                report_step_change(session, out)?;
            } else {
                writeln!(out, "session is closed")?;
            }
        }
        Command::Attach { path, file } => {
            let metadata = match std::fs::metadata(&file) {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => {
                    writeln!(out, "{} is not a file", file.display())?;
                    return Ok(Control::Continue);
                }
                Err(e) => {
                    writeln!(out, "cannot read {}: {}", file.display(), e)?;
                    return Ok(Control::Continue);
                }
            };
            let name = file
                .file_name()
                .map_or_else(|| file.display().to_string(), |n| n.to_string_lossy().to_string());
            let mut handle = FileHandle::new(name, metadata.len());
            handle.mime_type = guess_mime_type(&file);
            if session.set_field(path, FieldValue::File(handle)) {
                writeln!(out, "attached {}", file.display())?;
            } else {
                writeln!(out, "session is closed")?;
            }
        }
        Command::Next => {
            match session.next() {
                NavOutcome::Moved { .. } => render_step(session, out)?,
                NavOutcome::Blocked { errors, focus, .. } => {
                    writeln!(out, "cannot continue, fix:")?;
                    for (path, message) in &errors {
                        writeln!(out, "  {}: {}", path, message)?;
                    }
                    if let Some(focus) = focus {
                        writeln!(out, "(focus: {})", focus)?;
                    }
                }
                NavOutcome::AtBoundary => writeln!(out, "already at the last step; use 'submit'")?,
                NavOutcome::Inactive => writeln!(out, "session is closed")?,
            }
        }
        Command::Prev => match session.prev() {
            NavOutcome::Moved { .. } => render_step(session, out)?,
            NavOutcome::AtBoundary => writeln!(out, "already at the first step")?,
            _ => writeln!(out, "session is closed")?,
        },
        Command::Submit => {
            writeln!(out, "submitting...")?;
            render_submit(session.submit().await, out)?;
        }
        Command::Cancel => {
            if session.cancel() {
                writeln!(out, "cancelled; your draft is kept")?;
                return Ok(Control::Finished);
            }
            writeln!(out, "session is closed")?;
        }
        Command::Show => render_step(session, out)?,
        Command::Steps => render_steps(session, out)?,
        Command::Help => writeln!(out, "{}", HELP)?,
        Command::Quit => {
            session.unmount();
            return Ok(Control::Finished);
        }
    }

    if session.is_editing() {
        Ok(Control::Continue)
    } else {
        Ok(Control::Finished)
    }
}

fn render_submit(outcome: SubmitOutcome, out: &mut dyn Write) -> Result<()> {
    match outcome {
        SubmitOutcome::Submitted(record) => {
            writeln!(out, "saved {} '{}'", record.kind, record.id)?;
            writeln!(out, "{}", serde_json::to_string_pretty(&record.data)?)?;
        }
        SubmitOutcome::Rejected { failing, focus } => {
            writeln!(out, "cannot submit, fix:")?;
            for result in &failing {
                for (path, message) in &result.field_errors {
                    writeln!(out, "  [step {}] {}: {}", result.step_id, path, message)?;
                }
            }
            if let Some(focus) = focus {
                writeln!(out, "(focus: {})", focus)?;
            }
        }
        SubmitOutcome::Failed { message, retryable } => {
            writeln!(out, "error: {}", message)?;
            if retryable {
                writeln!(out, "run 'submit' again to retry")?;
            }
        }
        SubmitOutcome::Ignored(reason) => {
            writeln!(out, "submit ignored ({:?})", reason)?;
        }
    }
    Ok(())
}

fn report_step_change(session: &WizardSession, out: &mut dyn Write) -> Result<()> {
    if let Some(step) = session.current_step() {
        writeln!(
            out,
            "ok (step {}/{}: {})",
            session.current_index(),
            session.steps().len(),
            step.label
        )?;
    }
    Ok(())
}

/// Print the current step with its fields, values and errors
pub fn render_step(session: &WizardSession, out: &mut dyn Write) -> Result<()> {
    let Some(step) = session.current_step() else {
        return Ok(());
    };
    writeln!(
        out,
        "── Step {}/{}: {} ──",
        session.current_index(),
        session.steps().len(),
        step.label
    )?;
    for field in &step.fields {
        let marker = if field.rules.contains(&FieldRule::Required) {
            "*"
        } else {
            " "
        };
        let value = session
            .values()
            .get(&field.path)
            .map_or_else(|| "-".to_string(), ToString::to_string);
        writeln!(out, " {} {} ({}): {}", marker, field.label, field.path, value)?;
        if let Some(error) = session.errors().get(&field.path) {
            writeln!(out, "     ! {}", error)?;
        } else if session.pending_files().contains(&field.path) {
            writeln!(out, "     ! file not kept in draft, attach it again")?;
        }
    }
    if let Some(banner) = session.banner() {
        writeln!(out, "!! {}", banner)?;
    }
    Ok(())
}

/// Print the applicable steps, marking completed and current ones
pub fn render_steps(session: &WizardSession, out: &mut dyn Write) -> Result<()> {
    for (i, step) in session.steps().iter().enumerate() {
        let position = i + 1;
        let marker = if position == session.current_index() {
            ">"
        } else if session.state().completed.contains(&step.id) {
            "✓"
        } else {
            " "
        };
        writeln!(out, "{} {}. {}", marker, position, step.label)?;
    }
    Ok(())
}

/// Feed lines from `input` to the session until it finishes or input ends.
///
/// Parse errors are printed and skipped. With `echo`, each command is
/// printed before its output (used for scripts).
pub async fn run_lines<R: BufRead>(
    session: &mut WizardSession,
    input: R,
    out: &mut dyn Write,
    echo: bool,
) -> Result<WizardPhase> {
    if !session.pending_files().is_empty() {
        let paths: Vec<&str> = session.pending_files().iter().map(String::as_str).collect();
        writeln!(out, "files are not kept in drafts; attach again: {}", paths.join(", "))?;
    }
    render_step(session, out)?;
    for line in input.lines() {
        let line = line.context("Failed to read command")?;
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                writeln!(out, "{}", e)?;
                continue;
            }
        };
        if echo {
            writeln!(out, "> {}", line.trim())?;
        }
        tracing::debug!(command = ?command, "Console command");
        if execute(session, command, out).await? == Control::Finished {
            break;
        }
    }
    Ok(session.phase().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::drafts::DraftStore;
    use crate::entities::{EntityRepository, MockRepository};
    use crate::flows::FlowKind;
    use crate::wizard::SessionOptions;

    #[test]
    fn test_parse_set_text_and_bool() {
        assert_eq!(
            parse_command("set nome = Trio Jazz").unwrap(),
            Some(Command::Set {
                path: "nome".to_string(),
                value: FieldValue::text("Trio Jazz"),
            })
        );
        assert_eq!(
            parse_command("set aceitaContratacao=true").unwrap(),
            Some(Command::Set {
                path: "aceitaContratacao".to_string(),
                value: FieldValue::Bool(true),
            })
        );
    }

    #[test]
    fn test_parse_set_json_selection() {
        assert_eq!(
            parse_command(r#"set-json tipoUsuario=["musico","gestor"]"#).unwrap(),
            Some(Command::Set {
                path: "tipoUsuario".to_string(),
                value: FieldValue::selection(["musico", "gestor"]),
            })
        );
        assert_eq!(
            parse_command("set-json logo=null").unwrap(),
            Some(Command::Unset("logo".to_string()))
        );
    }

    #[test]
    fn test_parse_skips_blank_and_comments() {
        assert_eq!(parse_command("   ").unwrap(), None);
        assert_eq!(parse_command("# step one").unwrap(), None);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse_command("jump 3"),
            Err(CommandError::Unknown("jump".to_string()))
        );
        assert!(matches!(
            parse_command("set nome"),
            Err(CommandError::MissingArgument { command: "set", .. })
        ));
        assert!(matches!(
            parse_command("set-json x={oops"),
            Err(CommandError::InvalidJson { .. })
        ));
        assert!(matches!(
            parse_command(r#"set-json x={"a": 1}"#),
            Err(CommandError::InvalidJson { .. })
        ));
    }

    #[test]
    fn test_guess_mime_type() {
        assert_eq!(
            guess_mime_type(std::path::Path::new("logo.PNG")).as_deref(),
            Some("image/png")
        );
        assert_eq!(guess_mime_type(std::path::Path::new("notes")), None);
    }

    #[tokio::test]
    async fn test_run_lines_new_band_script() {
        let flow = FlowKind::NewBand.build(None).unwrap();
        let drafts = DraftStore::in_memory();
        let repo = Arc::new(MockRepository::new());
        let mut session =
            WizardSession::mount(flow, drafts.clone(), repo.clone(), SessionOptions::default())
                .await
                .unwrap();

        let script = "\
# basics
set nome=Trio Jazz
set generoMusical=jazz
set anoFormacao=2017
next
set contato.email=trio@jazz.com.br
set contato.telefone=(11) 91234-5678
next
bogus
set-json integrantes=[{\"nome\": \"Rui\", \"instrumento\": \"baixo\"}]
next
submit
";
        let mut out = Vec::new();
        let phase = run_lines(&mut session, script.as_bytes(), &mut out, true)
            .await
            .unwrap();

        let output = String::from_utf8(out).unwrap();
        assert!(matches!(phase, WizardPhase::Submitted(_)), "{}", output);
        assert!(output.contains("unknown command 'bogus'"));
        assert!(output.contains("Step 4/4: Mídia"));
        assert_eq!(repo.len().await, 1);
        assert!(drafts.load("band:new").is_none());
    }

    #[tokio::test]
    async fn test_blocked_next_lists_errors() {
        let flow = FlowKind::NewBand.build(None).unwrap();
        let mut session = WizardSession::mount(
            flow,
            DraftStore::in_memory(),
            Arc::new(MockRepository::new()),
            SessionOptions::default(),
        )
        .await
        .unwrap();

        let mut out = Vec::new();
        let control = execute(&mut session, Command::Next, &mut out).await.unwrap();

        let output = String::from_utf8(out).unwrap();
        assert_eq!(control, Control::Continue);
        assert!(output.contains("cannot continue"));
        assert!(output.contains("nome: Nome da banda is required"));
        assert!(output.contains("(focus: nome)"));
    }

    #[tokio::test]
    async fn test_resumed_draft_lists_files_to_attach() {
        let flow = FlowKind::NewBand.build(None).unwrap();
        let drafts = DraftStore::in_memory();
        let values = crate::fields::FieldValues::new().with("nome", FieldValue::text("Trio Jazz"));
        drafts
            .save(
                "band:new",
                &values,
                &std::collections::BTreeSet::new(),
                &std::collections::BTreeSet::from(["logo".to_string()]),
            )
            .unwrap();
        let mut session = WizardSession::mount(
            flow,
            drafts,
            Arc::new(MockRepository::new()),
            SessionOptions::default(),
        )
        .await
        .unwrap();

        let mut out = Vec::new();
        run_lines(&mut session, "".as_bytes(), &mut out, false)
            .await
            .unwrap();

        let output = String::from_utf8(out).unwrap();
        assert!(output.contains("attach again: logo"), "{}", output);
    }

    #[tokio::test]
    async fn test_submit_for_deleted_band_finishes() {
        let flow = FlowKind::EditBand.build(Some("banda-002")).unwrap();
        let repo = Arc::new(MockRepository::from_config(&crate::config::MockConfig {
            latency_ms: 0,
            seed_fixtures: true,
        }));
        let mut session = WizardSession::mount(
            flow,
            DraftStore::in_memory(),
            repo.clone(),
            SessionOptions::default(),
        )
        .await
        .unwrap();
        repo.delete_entity("band", "banda-002").await.unwrap();

        let mut out = Vec::new();
        let phase = run_lines(&mut session, "next\nnext\nnext\nsubmit\n".as_bytes(), &mut out, true)
            .await
            .unwrap();

        let output = String::from_utf8(out).unwrap();
        assert_eq!(phase, WizardPhase::NotFound, "{}", output);
        assert!(output.contains("no longer exists"));
        assert!(!output.contains("again to retry"));
    }

    #[tokio::test]
    async fn test_cancel_finishes() {
        let flow = FlowKind::Signup.build(None).unwrap();
        let mut session = WizardSession::mount(
            flow,
            DraftStore::in_memory(),
            Arc::new(MockRepository::new()),
            SessionOptions::default(),
        )
        .await
        .unwrap();

        let mut out = Vec::new();
        let control = execute(&mut session, Command::Cancel, &mut out).await.unwrap();

        assert_eq!(control, Control::Finished);
        assert_eq!(session.phase(), &WizardPhase::Cancelled);
    }
}
