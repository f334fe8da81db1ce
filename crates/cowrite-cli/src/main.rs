//! CoWrite Terminal Client
//!
//! Joins a room on a CoWrite sequencer and edits the shared document from
//! an interactive prompt. The shared text lives in a headless editing
//! surface driven by the sync engine; every command edits it the same way a
//! visual editor would.
//!
//! # Usage
//!
//! ```bash
//! # Join a room on the local sequencer
//! cowrite my-room
//!
//! # Remote sequencer, chosen display name
//! cowrite my-room --url ws://example.com:8080 --name ada
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use parking_lot::Mutex;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::runtime::Runtime;

use cowrite_client::{
    BufferSurface, ChangeRange, ClientCommand, ClientConfig, ClientEvent, CursorRenderer,
    EditorSurface, SyncClient,
};

/// CoWrite terminal client
#[derive(Parser, Debug)]
#[command(name = "cowrite")]
#[command(author, version, about = "CoWrite - collaborative text from the terminal")]
struct Args {
    /// Room to join
    room: String,

    /// Sequencer URL
    #[arg(short, long, default_value = "ws://127.0.0.1:8080", env = "COWRITE_URL")]
    url: String,

    /// Display name announced to other participants
    #[arg(short, long, env = "COWRITE_NAME")]
    name: Option<String>,

    /// Quiet mode (no banner)
    #[arg(short, long)]
    quiet: bool,
}

/// The shared text buffer, observed by the REPL and driven by the engine
#[derive(Clone, Default)]
struct SharedSurface(Arc<Mutex<BufferSurface>>);

impl EditorSurface for SharedSurface {
    fn content(&self) -> String {
        self.0.lock().content()
    }
    fn set_content(&mut self, text: &str) {
        self.0.lock().set_content(text)
    }
    fn apply_insert(&mut self, position: usize, text: &str) {
        self.0.lock().apply_insert(position, text)
    }
    fn apply_delete(&mut self, position: usize, span: usize) {
        self.0.lock().apply_delete(position, span)
    }
    fn caret(&self) -> usize {
        self.0.lock().caret()
    }
    fn coords_at(&self, offset: usize) -> Option<(f32, f32)> {
        self.0.lock().coords_at(offset)
    }
}

/// Terminal cursor renderer: (column, line) marks per participant,
/// `None` while hidden
#[derive(Clone, Default)]
struct TermCursors(Arc<Mutex<HashMap<String, Option<(f32, f32)>>>>);

impl CursorRenderer for TermCursors {
    type Handle = String;

    fn create(&mut self, user_id: &str) -> String {
        self.0.lock().insert(user_id.to_string(), None);
        user_id.to_string()
    }
    fn place(&mut self, handle: &mut String, x: f32, y: f32) {
        self.0.lock().insert(handle.clone(), Some((x, y)));
    }
    fn hide(&mut self, handle: &mut String) {
        self.0.lock().insert(handle.clone(), None);
    }
    fn remove(&mut self, handle: String) {
        self.0.lock().remove(&handle);
    }
    fn is_attached(&self, handle: &String) -> bool {
        self.0.lock().contains_key(handle)
    }
    fn attach(&mut self, handle: &mut String) {
        self.0.lock().entry(handle.clone()).or_insert(None);
    }
}

#[derive(Default)]
struct Status {
    client_id: String,
    version: u64,
    connected: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let rt = Runtime::new()?;

    let surface = SharedSurface::default();
    let cursors = TermCursors::default();
    let status = Arc::new(Mutex::new(Status::default()));

    let mut config = ClientConfig::new(args.url.clone(), args.room.clone());
    config.display_name = args.name.clone();

    let mut client = rt
        .block_on(SyncClient::connect(
            config,
            surface.clone(),
            cursors.clone(),
        ))
        .with_context(|| format!("Failed to connect to {}", args.url))?;
    let commands = client.commands();

    // Drain engine events in the background; the prompt reads the status
    let events = client.take_events().expect("events taken once");
    let event_status = status.clone();
    rt.spawn(drain_events(events, event_status));

    if !args.quiet {
        println!(
            "{}",
            format!(
                r#"
  ╔═╗╔═╗╦ ╦╦═╗╦╔╦╗╔═╗  Terminal Client
  ║  ║ ║║║║╠╦╝║ ║ ║╣   Room "{}" on {}
  ╚═╝╚═╝╚╩╝╩╚═╩ ╩ ╚═╝  Type 'help' for commands, 'quit' to leave
"#,
                args.room, args.url
            )
            .cyan()
        );
    }

    let mut rl = DefaultEditor::new()?;
    let history_path = home_dir()
        .map(|p| p.join(".cowrite_history"))
        .unwrap_or_default();
    let _ = rl.load_history(&history_path);

    loop {
        let lost = {
            let s = status.lock();
            !s.connected && !s.client_id.is_empty()
        };
        if lost {
            eprintln!("{}", "Connection lost.".red());
            break;
        }

        let prompt = format!("{}> ", "cowrite".green());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                match run_command(line, &rt, &commands, &surface, &cursors, &status) {
                    Ok(true) => break, // quit
                    Ok(false) => {}
                    Err(e) => eprintln!("{} {}", "Error:".red(), e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);
    rt.block_on(client.disconnect());
    Ok(())
}

async fn drain_events(
    mut events: tokio::sync::mpsc::Receiver<ClientEvent>,
    status: Arc<Mutex<Status>>,
) {
    while let Some(event) = events.recv().await {
        match event {
            ClientEvent::Connected { client_id } => {
                let mut s = status.lock();
                s.connected = true;
                s.client_id = client_id.clone();
                drop(s);
                println!("{}", format!("Connected as {}", client_id).green());
            }
            ClientEvent::Updated { version } => {
                status.lock().version = version;
            }
            ClientEvent::Disconnected => {
                status.lock().connected = false;
            }
        }
    }
}

/// Execute one REPL command; returns true to quit
fn run_command(
    line: &str,
    rt: &Runtime,
    commands: &tokio::sync::mpsc::Sender<ClientCommand>,
    surface: &SharedSurface,
    cursors: &TermCursors,
    status: &Arc<Mutex<Status>>,
) -> Result<bool> {
    let mut parts = line.splitn(2, char::is_whitespace);
    let cmd = parts.next().unwrap_or("").to_lowercase();
    let rest = parts.next().unwrap_or("").to_string();

    match cmd.as_str() {
        "quit" | "exit" => return Ok(true),
        "help" => print_help(),
        "clear" => print!("\x1B[2J\x1B[1;1H"),
        "show" => {
            let content = surface.content();
            let status = status.lock();
            if content.is_empty() {
                println!("{}", "(empty document)".dimmed());
            } else {
                for (i, line) in content.split('\n').enumerate() {
                    println!("{} {}", format!("{:>3} |", i + 1).dimmed(), line);
                }
            }
            println!(
                "{}",
                format!(
                    "-- version {}, {} chars",
                    status.version,
                    content.chars().count()
                )
                .dimmed()
            );
        }
        "insert" => {
            let (position, text) = parse_position_and_text(&rest)?;
            let position = position.min(surface.content().chars().count());
            surface.0.lock().insert_local(position, &text);
            send(rt, commands, ClientCommand::Changes(vec![ChangeRange::insertion(position, text)]))?;
        }
        "type" => {
            if rest.is_empty() {
                anyhow::bail!("usage: type <text>");
            }
            let position = surface.caret();
            surface.0.lock().insert_local(position, &rest);
            send(rt, commands, ClientCommand::Changes(vec![ChangeRange::insertion(position, rest)]))?;
        }
        "delete" => {
            let (position, span) = parse_position_and_span(&rest)?;
            let len = surface.content().chars().count();
            let position = position.min(len);
            let span = span.min(len - position);
            if span == 0 {
                anyhow::bail!("nothing to delete at {}", position);
            }
            surface.0.lock().delete_local(position, span);
            send(rt, commands, ClientCommand::Changes(vec![ChangeRange::deletion(position, span)]))?;
        }
        "cursor" => {
            let position: usize = rest
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("usage: cursor <offset>"))?;
            surface.0.lock().set_caret(position);
            send(rt, commands, ClientCommand::Caret(surface.caret()))?;
        }
        "name" => {
            if rest.is_empty() {
                anyhow::bail!("usage: name <alias>");
            }
            send(rt, commands, ClientCommand::Rename(rest))?;
        }
        "peers" => {
            let marks = cursors.0.lock();
            if marks.is_empty() {
                println!("{}", "(no other participants seen)".dimmed());
            }
            for (user, mark) in marks.iter() {
                match mark {
                    Some((col, line)) => {
                        println!("{} at line {}, column {}", user.yellow(), *line as usize + 1, *col as usize)
                    }
                    None => println!("{} {}", user.yellow(), "(cursor hidden)".dimmed()),
                }
            }
        }
        "status" => {
            let s = status.lock();
            let state = if s.connected {
                "connected".green()
            } else {
                "disconnected".red()
            };
            println!("{} as {}, version {}", state, s.client_id.yellow(), s.version);
        }
        _ => anyhow::bail!("unknown command '{}', try 'help'", cmd),
    }

    Ok(false)
}

fn send(
    rt: &Runtime,
    commands: &tokio::sync::mpsc::Sender<ClientCommand>,
    command: ClientCommand,
) -> Result<()> {
    rt.block_on(commands.send(command))
        .map_err(|_| anyhow::anyhow!("engine is gone"))
}

fn parse_position_and_text(rest: &str) -> Result<(usize, String)> {
    let mut parts = rest.splitn(2, char::is_whitespace);
    let position = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| anyhow::anyhow!("usage: insert <offset> <text>"))?;
    let text = parts
        .next()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| anyhow::anyhow!("usage: insert <offset> <text>"))?;
    Ok((position, text.to_string()))
}

fn parse_position_and_span(rest: &str) -> Result<(usize, usize)> {
    let mut parts = rest.split_whitespace();
    let position = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| anyhow::anyhow!("usage: delete <offset> <chars>"))?;
    let span = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| anyhow::anyhow!("usage: delete <offset> <chars>"))?;
    Ok((position, span))
}

fn print_help() {
    println!(
        r#"
{}

{}
  show                      Print the shared document
  insert <offset> <text>    Insert text at a character offset
  type <text>               Insert text at your caret
  delete <offset> <chars>   Delete a span of characters
  cursor <offset>           Move your caret (announced to peers)

{}
  peers                     Show other participants' cursors
  name <alias>              Rename yourself
  status                    Connection state and document version

{}
  help                      Show this help
  clear                     Clear screen
  quit/exit                 Leave the room
"#,
        "CoWrite Commands".cyan().bold(),
        "Editing".yellow().bold(),
        "Presence".yellow().bold(),
        "Local".yellow().bold(),
    );
}

fn home_dir() -> Option<std::path::PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(std::path::PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_position_and_text() {
        assert_eq!(
            parse_position_and_text("3 hello world").unwrap(),
            (3, "hello world".to_string())
        );
        assert!(parse_position_and_text("nope").is_err());
        assert!(parse_position_and_text("3").is_err());
    }

    #[test]
    fn test_parse_position_and_span() {
        assert_eq!(parse_position_and_span("4 2").unwrap(), (4, 2));
        assert!(parse_position_and_span("4").is_err());
        assert!(parse_position_and_span("a b").is_err());
    }
}
