//! Line-oriented console front end
//!
//! Render updates are queued on an unbounded channel and written by a single
//! renderer task, so delivery handlers never touch stdout. Input lines are
//! either slash commands or text posted to the current view.

use super::{PostEntry, RenderUpdate, Ui};
use crate::bus::MessageBus;
use crate::coordinator::Coordinator;
use crate::directory::View;
use futures::{Stream, StreamExt};
use std::io::{self, BufRead};
use std::sync::{Arc, RwLock};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::warn;

const HELP: &str = "\
Commands:
  /join <channel>   switch to a channel, joining it if needed
  /dm <name>        direct messages with a user
  /users            list known users
  /channels         list channels
  /help             show this help
  /quit             leave
Anything else is posted to the current conversation.";

pub struct ConsoleUi {
    updates: mpsc::UnboundedSender<RenderUpdate>,
    view: RwLock<Option<View>>,
}

impl ConsoleUi {
    /// Returns the UI handle and the queue the renderer drains.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<RenderUpdate>) {
        let (updates, receiver) = mpsc::unbounded_channel();
        let ui = Arc::new(Self {
            updates,
            view: RwLock::new(None),
        });
        (ui, receiver)
    }

    pub fn set_view(&self, view: Option<View>) {
        *self.view.write().unwrap_or_else(|e| e.into_inner()) = view;
    }

    pub fn notice(&self, text: impl Into<String>) {
        self.request_render(RenderUpdate::Notice(text.into()));
    }
}

impl Ui for ConsoleUi {
    fn request_render(&self, update: RenderUpdate) {
        // The renderer only goes away at shutdown.
        let _ = self.updates.send(update);
    }

    fn current_view(&self) -> Option<View> {
        self.view.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Text lines for one update.
pub fn render_lines(update: &RenderUpdate) -> Vec<String> {
    match update {
        RenderUpdate::UserJoined { name, .. } => vec![format!("* {} is online", name)],
        RenderUpdate::AppendPost(entry) => vec![render_entry(entry)],
        RenderUpdate::ShowConversation { title, entries } => {
            let mut lines = vec![format!("--- {} ---", title)];
            if entries.is_empty() {
                lines.push("(no messages yet)".to_string());
            }
            lines.extend(entries.iter().map(render_entry));
            lines
        }
        RenderUpdate::Notice(text) => text.lines().map(|line| format!("* {}", line)).collect(),
    }
}

fn render_entry(entry: &PostEntry) -> String {
    format!(
        "[{}] <{}> {}",
        format_time(entry.timestamp),
        entry.author,
        entry.body
    )
}

/// `HH:MM:SS` in UTC.
fn format_time(unix_secs: i64) -> String {
    let secs = unix_secs.rem_euclid(86_400);
    format!("{:02}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
}

/// Write updates until every `ConsoleUi` handle is dropped.
pub async fn render_loop<W>(
    mut updates: mpsc::UnboundedReceiver<RenderUpdate>,
    mut out: W,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(update) = updates.recv().await {
        for line in render_lines(&update) {
            out.write_all(line.as_bytes()).await?;
            out.write_all(b"\n").await?;
        }
        out.flush().await?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join(String),
    Dm(String),
    Users,
    Channels,
    Help,
    Quit,
    Say(String),
    Empty,
    Unknown(String),
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Command::Say(line.to_string());
    };

    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };
    match name.to_ascii_lowercase().as_str() {
        "join" => Command::Join(arg.trim_start_matches('#').to_string()),
        "dm" | "msg" => Command::Dm(arg.trim_start_matches('@').to_string()),
        "users" | "who" => Command::Users,
        "channels" => Command::Channels,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ => Command::Unknown(name.to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Apply one command.
pub async fn execute_command<B: MessageBus>(
    coordinator: &Coordinator<B, ConsoleUi>,
    ui: &ConsoleUi,
    command: Command,
) -> Flow {
    match command {
        Command::Join(channel) => {
            if coordinator.join_channel(&channel) {
                let view = View::Channel(channel);
                ui.set_view(Some(view.clone()));
                coordinator.show(&view);
            } else {
                ui.notice(format!("'{}' is not a valid channel name", channel));
            }
        }
        Command::Dm(name) => match coordinator.find_user(&name) {
            Some(user) => {
                let view = View::Direct(user.subject);
                ui.set_view(Some(view.clone()));
                coordinator.show(&view);
            }
            None => ui.notice(format!("No user named '{}'", name)),
        },
        Command::Users => {
            let users: Vec<String> = coordinator
                .users()
                .into_iter()
                .map(|user| {
                    let status = if user.online { "online" } else { "away" };
                    format!("{} ({})", user.name, status)
                })
                .collect();
            ui.notice(format!("Users: {}", users.join(", ")));
        }
        Command::Channels => {
            let current = ui.current_view();
            let channels: Vec<String> = coordinator
                .channels()
                .into_iter()
                .map(|name| {
                    let marker = if current == Some(View::Channel(name.clone())) {
                        "*"
                    } else {
                        ""
                    };
                    format!("{}#{}", marker, name)
                })
                .collect();
            ui.notice(format!("Channels: {}", channels.join(" ")));
        }
        Command::Help => ui.notice(HELP),
        Command::Quit => return Flow::Quit,
        Command::Say(body) => match coordinator.send_post(&body).await {
            Ok(Some(_)) => {}
            Ok(None) => ui.notice("Pick a conversation first: /join <channel> or /dm <name>"),
            Err(e) => {
                warn!("Could not send post: {}", e);
                ui.notice(format!("Could not send: {}", e));
            }
        },
        Command::Empty => {}
        Command::Unknown(name) => ui.notice(format!("Unknown command /{}, try /help", name)),
    }
    Flow::Continue
}

/// Apply input lines until `/quit` or the end of input.
pub async fn run_input<B, S>(coordinator: &Coordinator<B, ConsoleUi>, ui: &ConsoleUi, mut lines: S)
where
    B: MessageBus,
    S: Stream<Item = String> + Unpin,
{
    while let Some(line) = lines.next().await {
        if execute_command(coordinator, ui, parse_command(&line)).await == Flow::Quit {
            break;
        }
    }
}

/// Stdin lines, read on a dedicated thread.
///
/// Blocking reads stay off the runtime so shutdown never waits for a
/// pending line.
pub fn stdin_lines() -> UnboundedReceiverStream<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || forward_lines(io::stdin().lock(), tx));
    UnboundedReceiverStream::new(rx)
}

/// Send each line of `reader` until it ends, fails, or nobody is listening.
fn forward_lines<R: BufRead>(reader: R, tx: mpsc::UnboundedSender<String>) {
    for line in reader.lines() {
        match line {
            Ok(line) => {
                if tx.send(line).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("Could not read input: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryBus;
    use crate::identity::test_identity;
    use crate::session::{Session, SessionConfig};

    fn console() -> (
        Coordinator<MemoryBus, ConsoleUi>,
        Arc<ConsoleUi>,
        mpsc::UnboundedReceiver<RenderUpdate>,
        MemoryBus,
    ) {
        let bus = MemoryBus::new();
        let session = Arc::new(Session::new(
            test_identity(),
            "me",
            bus.clone(),
            SessionConfig::default(),
        ));
        let (ui, updates) = ConsoleUi::new();
        (Coordinator::new(session, ui.clone()), ui, updates, bus)
    }

    fn drain(updates: &mut mpsc::UnboundedReceiver<RenderUpdate>) -> Vec<RenderUpdate> {
        let mut drained = Vec::new();
        while let Ok(update) = updates.try_recv() {
            drained.push(update);
        }
        drained
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("/join #rust"), Command::Join("rust".to_string()));
        assert_eq!(parse_command("  /JOIN   rust "), Command::Join("rust".to_string()));
        assert_eq!(parse_command("/dm @bob"), Command::Dm("bob".to_string()));
        assert_eq!(parse_command("/users"), Command::Users);
        assert_eq!(parse_command("/channels"), Command::Channels);
        assert_eq!(parse_command("/help"), Command::Help);
        assert_eq!(parse_command("/quit"), Command::Quit);
        assert_eq!(parse_command("hello there"), Command::Say("hello there".to_string()));
        assert_eq!(parse_command("   "), Command::Empty);
        assert_eq!(parse_command("/dance"), Command::Unknown("dance".to_string()));
    }

    #[test]
    fn test_render_lines() {
        let entry = PostEntry {
            author: "bob".to_string(),
            body: "hi".to_string(),
            timestamp: 3_600 + 2 * 60 + 3,
        };
        assert_eq!(
            render_lines(&RenderUpdate::AppendPost(entry.clone())),
            vec!["[01:02:03] <bob> hi"]
        );
        assert_eq!(
            render_lines(&RenderUpdate::ShowConversation {
                title: "#general".to_string(),
                entries: Vec::new(),
            }),
            vec!["--- #general ---", "(no messages yet)"]
        );
        assert_eq!(
            render_lines(&RenderUpdate::Notice("a\nb".to_string())),
            vec!["* a", "* b"]
        );
    }

    #[tokio::test]
    async fn test_render_loop_writes_lines() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(RenderUpdate::Notice("hello".to_string())).unwrap();
        drop(tx);

        let mut out = Vec::new();
        render_loop(rx, &mut out).await.unwrap();
        assert_eq!(out, b"* hello\n");
    }

    #[tokio::test]
    async fn test_join_switches_view_and_shows_history() {
        let (coordinator, ui, mut updates, _bus) = console();

        execute_command(&coordinator, &ui, parse_command("/join rust")).await;

        assert_eq!(ui.current_view(), Some(View::Channel("rust".to_string())));
        assert!(drain(&mut updates).iter().any(|u| matches!(
            u,
            RenderUpdate::ShowConversation { title, .. } if title == "#rust"
        )));
    }

    #[tokio::test]
    async fn test_dm_to_unknown_user_keeps_view() {
        let (coordinator, ui, mut updates, _bus) = console();
        ui.set_view(Some(View::Channel("general".to_string())));

        execute_command(&coordinator, &ui, parse_command("/dm nobody")).await;

        assert_eq!(ui.current_view(), Some(View::Channel("general".to_string())));
        assert_eq!(
            drain(&mut updates),
            vec![RenderUpdate::Notice("No user named 'nobody'".to_string())]
        );
    }

    #[tokio::test]
    async fn test_dm_to_self_by_name() {
        let (coordinator, ui, _updates, _bus) = console();
        let me = coordinator.session().subject().to_string();

        execute_command(&coordinator, &ui, parse_command("/dm me")).await;
        assert_eq!(ui.current_view(), Some(View::Direct(me)));
    }

    #[tokio::test]
    async fn test_say_without_view_prompts() {
        let (coordinator, ui, mut updates, bus) = console();

        execute_command(&coordinator, &ui, Command::Say("hi".to_string())).await;

        assert!(bus.published().is_empty());
        assert!(matches!(drain(&mut updates)[..], [RenderUpdate::Notice(_)]));
    }

    #[tokio::test]
    async fn test_run_input_posts_until_quit() {
        let (coordinator, ui, _updates, bus) = console();
        let input = ["/join general", "hello", "/quit", "never sent"].map(String::from);

        run_input(&coordinator, &ui, futures::stream::iter(input)).await;

        let posts = bus.published_to("chat.demo.posts.general");
        assert_eq!(posts.len(), 1);
    }

    #[tokio::test]
    async fn test_forward_lines_sends_each_line() {
        let (tx, rx) = mpsc::unbounded_channel();
        forward_lines(&b"hello\n/join random\n"[..], tx);

        let lines: Vec<String> = UnboundedReceiverStream::new(rx).collect().await;
        assert_eq!(lines, ["hello", "/join random"]);
    }

    #[test]
    fn test_forward_lines_stops_when_receiver_is_gone() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        forward_lines(&b"one\ntwo\n"[..], tx);
    }
}
