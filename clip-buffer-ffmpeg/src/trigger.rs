//! Line-based trigger channel for the recorder.
//!
//! Each line read from the controlling input maps to one command:
//!
//! | input           | command               |
//! |-----------------|-----------------------|
//! | `c`, empty line | clip configured span  |
//! | `c <secs>`      | clip the last `secs`  |
//! | `d <secs>`      | set clip duration     |
//! | `s`             | status                |
//! | `q`, EOF        | stop and save         |

use std::io::BufRead;
use std::sync::mpsc::Sender;
use std::thread;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerCommand {
    Clip,
    ClipLast(u32),
    SetDuration(u32),
    Status,
    Stop,
}

impl TriggerCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut parts = line.split_whitespace();
        let Some(verb) = parts.next() else {
            return Ok(Self::Clip);
        };
        let seconds = match parts.next() {
            Some(arg) => Some(
                arg.parse::<u32>()
                    .ok()
                    .filter(|&s| s > 0)
                    .ok_or_else(|| format!("expected a positive number of seconds, got {:?}", arg))?,
            ),
            None => None,
        };
        if parts.next().is_some() {
            return Err(format!("too many arguments: {:?}", line.trim()));
        }

        match (verb, seconds) {
            ("c" | "clip", None) => Ok(Self::Clip),
            ("c" | "clip", Some(s)) => Ok(Self::ClipLast(s)),
            ("d" | "duration", Some(s)) => Ok(Self::SetDuration(s)),
            ("d" | "duration", None) => Err("duration needs a number of seconds".into()),
            ("s" | "status", None) => Ok(Self::Status),
            ("q" | "quit" | "stop", None) => Ok(Self::Stop),
            _ => Err(format!("unknown command {:?}", line.trim())),
        }
    }
}

/// Events fed into the recorder loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerEvent {
    Command(TriggerCommand),
    Invalid(String),
    /// The session ended on its own (device failure).
    SessionEnded,
}

/// Read commands from `input` on a background thread until EOF or `Stop`.
///
/// EOF is delivered as `Stop`.
pub fn spawn_line_reader(
    input: impl BufRead + Send + 'static,
    events: Sender<TriggerEvent>,
) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new().name("trigger-input".into()).spawn(move || {
        for line in input.lines() {
            let Ok(line) = line else {
                break;
            };
            let event = match TriggerCommand::parse(&line) {
                Ok(command) => TriggerEvent::Command(command),
                Err(msg) => TriggerEvent::Invalid(msg),
            };
            let stop = event == TriggerEvent::Command(TriggerCommand::Stop);
            if events.send(event).is_err() || stop {
                return;
            }
        }
        let _ = events.send(TriggerEvent::Command(TriggerCommand::Stop));
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::mpsc;

    #[test]
    fn parses_commands() {
        assert_eq!(TriggerCommand::parse(""), Ok(TriggerCommand::Clip));
        assert_eq!(TriggerCommand::parse("c"), Ok(TriggerCommand::Clip));
        assert_eq!(TriggerCommand::parse("clip 30"), Ok(TriggerCommand::ClipLast(30)));
        assert_eq!(TriggerCommand::parse(" d 45 "), Ok(TriggerCommand::SetDuration(45)));
        assert_eq!(TriggerCommand::parse("s"), Ok(TriggerCommand::Status));
        assert_eq!(TriggerCommand::parse("q"), Ok(TriggerCommand::Stop));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(TriggerCommand::parse("d").is_err());
        assert!(TriggerCommand::parse("d 0").is_err());
        assert!(TriggerCommand::parse("c -5").is_err());
        assert!(TriggerCommand::parse("c 5 6").is_err());
        assert!(TriggerCommand::parse("x").is_err());
    }

    #[test]
    fn reader_ends_with_stop_on_eof() {
        let (tx, rx) = mpsc::channel();
        let input = Cursor::new("c\nbogus\nd 20\n");

        spawn_line_reader(input, tx).unwrap().join().unwrap();

        let events: Vec<_> = rx.iter().collect();
        assert_eq!(events.len(), 4);
        assert_eq!(events[0], TriggerEvent::Command(TriggerCommand::Clip));
        assert!(matches!(events[1], TriggerEvent::Invalid(_)));
        assert_eq!(events[2], TriggerEvent::Command(TriggerCommand::SetDuration(20)));
        assert_eq!(events[3], TriggerEvent::Command(TriggerCommand::Stop));
    }

    #[test]
    fn reader_stops_at_quit() {
        let (tx, rx) = mpsc::channel();
        let input = Cursor::new("q\nc\n");

        spawn_line_reader(input, tx).unwrap().join().unwrap();

        let events: Vec<_> = rx.iter().collect();
        assert_eq!(events, vec![TriggerEvent::Command(TriggerCommand::Stop)]);
    }
}
