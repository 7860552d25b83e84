//! Terminal Interface
//!
//! Line-oriented foreground actor: turns stdin lines into session commands and
//! renders session events as timestamped chat lines. It never touches the
//! socket; everything goes through the command/event bridge.

use std::io::Write;

use chrono::{Local, TimeZone};
use gichat_core::{
    channel::{CommandSender, EventReceiver},
    Command, Cue, Event, ImageSource, Timestamp,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

use crate::error::Result;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const HELP_TEXT: &str = "\
commands:
  <text>               send a chat message
  /connect             connect to the server
  /disconnect [reason] close the connection
  /reconnect           disconnect, then connect again
  /history             request the message history
  /users               request the online user list
  /send <path>         send a file inline
  /upload <path>       upload a file and send its link
  /fetch <url>         download an uploaded attachment
  /ping                measure the server host's response time
  /help                show this help
  /quit                disconnect and exit";

// ----------------------------------------------------------------------------
// Input Parsing
// ----------------------------------------------------------------------------

/// What one line of user input asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    Submit(Command),
    Help,
    Quit,
    Empty,
    Invalid(String),
}

/// Parse one line of user input
pub fn parse_input(line: &str) -> InputAction {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return InputAction::Empty;
    }
    if !line.starts_with('/') {
        return InputAction::Submit(Command::SendText(line.to_string()));
    }

    let (name, argument) = match line.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (line, ""),
    };

    let require = |usage: &str, build: fn(String) -> Command| {
        if argument.is_empty() {
            InputAction::Invalid(format!("usage: {}", usage))
        } else {
            InputAction::Submit(build(argument.to_string()))
        }
    };

    match name {
        "/connect" => InputAction::Submit(Command::Connect),
        "/disconnect" => {
            let reason = if argument.is_empty() {
                "Client Disconnect"
            } else {
                argument
            };
            InputAction::Submit(Command::Disconnect(reason.to_string()))
        }
        "/reconnect" => InputAction::Submit(Command::Reconnect),
        "/history" => InputAction::Submit(Command::RequestHistory),
        "/users" => InputAction::Submit(Command::RequestUserList),
        "/send" => require("/send <path>", Command::send_file),
        "/upload" => require("/upload <path>", Command::upload_file),
        "/fetch" => require("/fetch <url>", Command::FetchMedia),
        "/ping" => InputAction::Submit(Command::Ping),
        "/help" => InputAction::Help,
        "/quit" | "/exit" => InputAction::Quit,
        other => InputAction::Invalid(format!("unknown command {} (try /help)", other)),
    }
}

// ----------------------------------------------------------------------------
// Event Rendering
// ----------------------------------------------------------------------------

fn format_time(timestamp: Timestamp) -> String {
    match Local.timestamp_millis_opt(timestamp.as_millis() as i64).single() {
        Some(time) => time.format(TIME_FORMAT).to_string(),
        None => timestamp.to_string(),
    }
}

fn now() -> String {
    format_time(Timestamp::now())
}

/// Render an event as display lines; `me` is this client's username
pub fn render_event(event: &Event, me: &str) -> Vec<String> {
    match event {
        Event::Connected { server_name } => vec![format!("[{}] * connected to {}", now(), server_name)],
        Event::Disconnected { reason } => vec![format!("[{}] * disconnected ({})", now(), reason)],
        Event::TextReceived {
            username,
            text,
            timestamp,
        } => vec![format!("[{}] <{}> {}", format_time(*timestamp), username, text)],
        Event::ImageReceived {
            username,
            image,
            timestamp,
        } => {
            let what = match image {
                ImageSource::Url(url) => url.clone(),
                ImageSource::Inline { filename, bytes } => {
                    format!("{} ({} bytes)", filename, bytes.len())
                }
            };
            vec![format!("[{}] <{}> [image] {}", format_time(*timestamp), username, what)]
        }
        Event::FileLinkReceived {
            username,
            url,
            timestamp,
        } => vec![format!("[{}] <{}> [file] {}", format_time(*timestamp), username, url)],
        Event::SystemNotice { text, .. } => vec![format!("[{}] * {}", now(), text)],
        Event::HistoryReset => vec![format!("[{}] * message history cleared", now())],
        // Server timestamps are shown as the server sent them
        Event::HistoryBatch { entries } => entries
            .iter()
            .map(|entry| format!("[{}] <{}> {}", entry.timestamp, entry.username, entry.text))
            .collect(),
        Event::UserListUpdated { users } => vec![format!(
            "[{}] * online ({}): {}",
            now(),
            users.len(),
            users.join(", ")
        )],
        Event::MessageSent { text, timestamp } => {
            vec![format!("[{}] <{}> {}", format_time(*timestamp), me, text)]
        }
        Event::AttachmentSent {
            filename,
            mode,
            timestamp,
        } => vec![format!(
            "[{}] <{}> [sent {} {}]",
            format_time(*timestamp),
            me,
            mode,
            filename
        )],
        Event::MediaFetched { url, bytes } => {
            vec![format!("[{}] * fetched {} ({} bytes)", now(), url, bytes.len())]
        }
        Event::PingResult { rtt: Some(rtt) } => vec![format!(
            "[{}] * ping: response time {:.2}ms",
            now(),
            rtt.as_secs_f64() * 1000.0
        )],
        Event::PingResult { rtt: None } => vec![format!("[{}] ! ping failed: host unreachable", now())],
        Event::Error { scope, message } => vec![format!("[{}] ! {} error: {}", now(), scope, message)],
    }
}

// ----------------------------------------------------------------------------
// Terminal Interface Task
// ----------------------------------------------------------------------------

/// Foreground actor driving one session from a line-oriented terminal
pub struct TerminalInterface {
    username: String,
    commands: CommandSender,
    events: EventReceiver,
    bell: bool,
}

impl TerminalInterface {
    pub fn new(username: String, commands: CommandSender, events: EventReceiver) -> Self {
        Self {
            username,
            commands,
            events,
            bell: false,
        }
    }

    pub fn with_bell(mut self, bell: bool) -> Self {
        self.bell = bell;
        self
    }

    /// Run until the session's event stream ends.
    ///
    /// `/quit` or end of input submits Shutdown; the loop keeps rendering
    /// until the runner has emitted its final events and dropped the stream.
    pub async fn run<R, W>(mut self, input: R, output: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut lines = input.lines();
        let mut input_open = true;

        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.show(&event, output)?,
                    None => {
                        debug!("Event stream closed");
                        break;
                    }
                },
                line = lines.next_line(), if input_open => match line? {
                    Some(line) => {
                        if !self.handle_line(&line, output)? {
                            input_open = false;
                        }
                    }
                    None => {
                        debug!("Input closed; shutting down");
                        input_open = false;
                        self.submit(Command::Shutdown);
                    }
                },
            }
        }
        Ok(())
    }

    /// Returns `false` once the user asked to quit
    fn handle_line<W: Write>(&self, line: &str, output: &mut W) -> Result<bool> {
        match parse_input(line) {
            InputAction::Submit(command) => self.submit(command),
            InputAction::Help => writeln!(output, "{}", HELP_TEXT)?,
            InputAction::Quit => {
                self.submit(Command::Shutdown);
                return Ok(false);
            }
            InputAction::Empty => {}
            InputAction::Invalid(message) => writeln!(output, "{}", message)?,
        }
        Ok(true)
    }

    fn submit(&self, command: Command) {
        // Only fails once the runner is gone, and then the event stream ends too
        if let Err(e) = self.commands.submit(command) {
            warn!("Command dropped: {}", e);
        }
    }

    fn show<W: Write>(&self, event: &Event, output: &mut W) -> Result<()> {
        for line in render_event(event, &self.username) {
            writeln!(output, "{}", line)?;
        }
        if self.bell && event.cue().is_some_and(|cue| cue != Cue::Send) {
            write!(output, "\x07")?;
        }
        output.flush()?;
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use gichat_core::{
        create_command_channel, create_event_channel, AttachmentMode, ChannelConfig,
        DisconnectReason, ErrorScope, HistoryEntry, ReceivedCommand,
    };
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn test_parse_plain_text() {
        assert_eq!(
            parse_input("hello there\n"),
            InputAction::Submit(Command::SendText("hello there".into()))
        );
        assert_eq!(parse_input("   "), InputAction::Empty);
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_input("/connect"), InputAction::Submit(Command::Connect));
        assert_eq!(
            parse_input("/disconnect"),
            InputAction::Submit(Command::Disconnect("Client Disconnect".into()))
        );
        assert_eq!(
            parse_input("/disconnect gone fishing"),
            InputAction::Submit(Command::Disconnect("gone fishing".into()))
        );
        assert_eq!(parse_input("/users"), InputAction::Submit(Command::RequestUserList));
        assert_eq!(parse_input("/history"), InputAction::Submit(Command::RequestHistory));
        assert_eq!(
            parse_input("/upload /tmp/cat.png"),
            InputAction::Submit(Command::SendFile {
                path: PathBuf::from("/tmp/cat.png"),
                mode: AttachmentMode::Upload,
            })
        );
        assert_eq!(
            parse_input("/send ./notes.txt"),
            InputAction::Submit(Command::send_file("./notes.txt"))
        );
        assert_eq!(parse_input("/ping"), InputAction::Submit(Command::Ping));
        assert_eq!(parse_input("/quit"), InputAction::Quit);
    }

    #[test]
    fn test_parse_invalid_commands() {
        assert!(matches!(parse_input("/send"), InputAction::Invalid(_)));
        assert!(matches!(parse_input("/fetch   "), InputAction::Invalid(_)));
        assert!(matches!(parse_input("/dance"), InputAction::Invalid(_)));
    }

    #[test]
    fn test_render_text_line() {
        let timestamp = Timestamp::new(1_700_000_000_000);
        let lines = render_event(
            &Event::TextReceived {
                username: "bob".into(),
                text: "hi".into(),
                timestamp,
            },
            "alice",
        );
        assert_eq!(
            lines,
            vec![format!("[{}] <bob> hi", format_time(timestamp))]
        );
        // [YYYY-mm-dd HH:MM:SS]
        assert_eq!(format_time(timestamp).len(), 19);
    }

    #[test]
    fn test_render_history_batch() {
        let lines = render_event(
            &Event::HistoryBatch {
                entries: vec![
                    HistoryEntry {
                        username: "bob".into(),
                        text: "first".into(),
                        timestamp: "2024-01-01 10:00:00".into(),
                    },
                    HistoryEntry {
                        username: "carol".into(),
                        text: "second".into(),
                        timestamp: "2024-01-01 10:05:00".into(),
                    },
                ],
            },
            "alice",
        );
        assert_eq!(
            lines,
            vec![
                "[2024-01-01 10:00:00] <bob> first".to_string(),
                "[2024-01-01 10:05:00] <carol> second".to_string(),
            ]
        );
    }

    #[test]
    fn test_render_sent_message_uses_own_name() {
        let lines = render_event(
            &Event::MessageSent {
                text: "yo".into(),
                timestamp: Timestamp::new(0),
            },
            "alice",
        );
        assert!(lines[0].ends_with("<alice> yo"));
    }

    #[test]
    fn test_render_error_and_disconnect() {
        let error = render_event(&Event::error(ErrorScope::Protocol, "invalid frame: x"), "a");
        assert!(error[0].ends_with("! protocol error: invalid frame: x"));

        let kicked = render_event(
            &Event::Disconnected {
                reason: DisconnectReason::Kick,
            },
            "a",
        );
        assert!(kicked[0].ends_with("* disconnected (kick)"));
    }

    #[test]
    fn test_render_ping_result() {
        let answered = render_event(
            &Event::PingResult {
                rtt: Some(Duration::from_micros(12_500)),
            },
            "a",
        );
        assert!(answered[0].ends_with("* ping: response time 12.50ms"), "{}", answered[0]);

        let unreachable = render_event(&Event::PingResult { rtt: None }, "a");
        assert!(unreachable[0].ends_with("! ping failed: host unreachable"));
    }

    #[tokio::test]
    async fn test_run_submits_commands_and_renders_events() {
        let (command_sender, mut command_receiver) =
            create_command_channel(&ChannelConfig::testing());
        let (event_sender, event_receiver) = create_event_channel();

        // Stand-in runner: echo sends, stop on Shutdown
        let runner = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(ReceivedCommand::Command(command)) = command_receiver.recv().await {
                seen.push(command.clone());
                match command {
                    Command::SendText(text) => {
                        event_sender
                            .emit(Event::MessageSent {
                                text,
                                timestamp: Timestamp::now(),
                            })
                            .unwrap();
                    }
                    Command::Shutdown => break,
                    _ => {}
                }
            }
            seen
        });

        let input: &[u8] = b"hello\n/bogus\n/users\n/quit\nnot sent\n";
        let mut output = Vec::new();
        TerminalInterface::new("alice".into(), command_sender, event_receiver)
            .run(input, &mut output)
            .await
            .unwrap();

        let seen = runner.await.unwrap();
        assert_eq!(
            seen,
            vec![
                Command::SendText("hello".into()),
                Command::RequestUserList,
                Command::Shutdown,
            ]
        );
        let output = String::from_utf8(output).unwrap();
        assert!(output.contains("<alice> hello"));
        assert!(output.contains("unknown command /bogus"));
    }

    #[tokio::test]
    async fn test_end_of_input_shuts_down() {
        let (command_sender, mut command_receiver) =
            create_command_channel(&ChannelConfig::testing());
        let (event_sender, event_receiver) = create_event_channel();

        let runner = tokio::spawn(async move {
            let received = command_receiver.recv().await;
            event_sender
                .emit(Event::Disconnected {
                    reason: DisconnectReason::Client("Client Disconnect".into()),
                })
                .unwrap();
            received
        });

        let mut output = Vec::new();
        TerminalInterface::new("alice".into(), command_sender, event_receiver)
            .with_bell(true)
            .run(&b""[..], &mut output)
            .await
            .unwrap();

        assert_eq!(
            runner.await.unwrap(),
            Some(ReceivedCommand::Command(Command::Shutdown))
        );
        let output = String::from_utf8(output).unwrap();
        assert!(output.contains("disconnected (Client Disconnect)"));
        assert!(output.ends_with('\x07'));
    }
}
