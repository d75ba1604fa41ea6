//! Line-oriented console standing in for the chat layer

use std::fmt::Write as _;
use std::str::FromStr;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tunecatalog::format_duration;
use tuneconfig::Config;
use tuneplayer::{ChannelId, Jukebox, QueueSnapshot, RoomId};

use crate::logs::{self, LevelHandle};

/// Number of upcoming tracks listed by `queue`
const QUEUE_DISPLAY_LIMIT: usize = 10;

const HELP: &str = "\
commands:
  play <query|url>   queue a track or a playlist
  skip               skip the current track
  stop               clear the queue and stop
  queue              show what is playing and up next
  join <channel>     join a voice channel
  leave              leave the voice channel, keep the queue
  room <id>          switch to another room
  log <level>        change the log level
  quit               exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Play(String),
    Skip,
    Stop,
    Queue,
    Join(ChannelId),
    Leave,
    Room(RoomId),
    Log(String),
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (name, arg) = match line.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (line, ""),
        };

        let number = |what: &str| -> Result<u64, String> {
            arg.parse()
                .map_err(|_| format!("{name} expects a {what} id, got \"{arg}\""))
        };

        match name.to_lowercase().as_str() {
            "play" | "p" if !arg.is_empty() => Ok(Command::Play(arg.to_string())),
            "play" | "p" => Err("play expects a query or a URL".to_string()),
            "skip" | "s" => Ok(Command::Skip),
            "stop" => Ok(Command::Stop),
            "queue" | "q" => Ok(Command::Queue),
            "join" => number("channel").map(Command::Join),
            "leave" => Ok(Command::Leave),
            "room" => number("room").map(Command::Room),
            "log" if !arg.is_empty() => Ok(Command::Log(arg.to_string())),
            "log" => Err("log expects a level".to_string()),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(format!("unknown command \"{other}\", try help")),
        }
    }
}

/// Text shown for the `queue` command
pub fn render_queue(snapshot: &QueueSnapshot) -> String {
    let mut out = String::new();

    match &snapshot.now_playing {
        Some(track) => {
            let _ = writeln!(out, "Now playing: {track} ({})", snapshot.state);
        }
        None => {
            let _ = writeln!(out, "Nothing playing ({})", snapshot.state);
        }
    }

    if snapshot.upcoming.is_empty() {
        out.push_str("Queue is empty");
    } else {
        let _ = writeln!(
            out,
            "Up next ({} tracks, {}):",
            snapshot.upcoming.len(),
            format_duration(snapshot.upcoming_duration_secs())
        );
        for (i, track) in snapshot.upcoming.iter().take(QUEUE_DISPLAY_LIMIT).enumerate() {
            let _ = writeln!(out, "  {}. {track}", i + 1);
        }
        if snapshot.upcoming.len() > QUEUE_DISPLAY_LIMIT {
            let _ = writeln!(out, "  ... and {} more", snapshot.upcoming.len() - QUEUE_DISPLAY_LIMIT);
        }
        out.truncate(out.trim_end().len());
    }

    if let Some(error) = &snapshot.last_error {
        let _ = write!(out, "\nLast error: {error}");
    }
    out
}

pub struct Console<'a> {
    jukebox: &'a Jukebox,
    config: &'a Config,
    log_handle: LevelHandle,
    room: RoomId,
    channel: ChannelId,
}

impl<'a> Console<'a> {
    pub fn new(jukebox: &'a Jukebox, config: &'a Config, log_handle: LevelHandle) -> Self {
        Self {
            jukebox,
            config,
            log_handle,
            room: 1,
            channel: 1,
        }
    }

    /// Reads commands from stdin until `quit` or end of input
    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        println!("{HELP}");

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<Command>() {
                Ok(Command::Quit) => break,
                Ok(command) => println!("{}", self.execute(command).await),
                Err(message) => println!("{message}"),
            }
        }

        info!("Console closed");
        Ok(())
    }

    async fn execute(&mut self, command: Command) -> String {
        let jukebox = self.jukebox;
        match command {
            Command::Play(query) => match jukebox.play(self.room, self.channel, &query).await {
                Ok(queued) => queued.to_string(),
                Err(e) => e.to_string(),
            },
            Command::Skip => match jukebox.skip(self.room).await {
                Ok(remaining) => format!("Skipped, {remaining} track(s) left"),
                Err(e) => e.to_string(),
            },
            Command::Stop => match jukebox.stop(self.room).await {
                Ok(dropped) => format!("Stopped, {dropped} track(s) removed"),
                Err(e) => e.to_string(),
            },
            Command::Queue => match jukebox.queue(self.room).await {
                Ok(snapshot) => render_queue(&snapshot),
                Err(e) => e.to_string(),
            },
            Command::Join(channel) => match jukebox.try_connect(self.room, channel).await {
                Ok(()) => {
                    self.channel = channel;
                    format!("Joined channel {channel}")
                }
                Err(e) => e.to_string(),
            },
            Command::Leave => {
                if jukebox.disconnect(self.room).await {
                    "Left the voice channel".to_string()
                } else {
                    "Not connected".to_string()
                }
            }
            Command::Room(room) => {
                self.room = room;
                format!("Now in room {room}")
            }
            Command::Log(level) => match logs::set_level(&self.log_handle, self.config, &level) {
                Ok(level) => format!("Log level set to {level}"),
                Err(e) => e.to_string(),
            },
            Command::Help => HELP.to_string(),
            Command::Quit => String::new(),
        }
    }
}
