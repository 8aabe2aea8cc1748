//! Operator commands read from stdin.
//!
//! Each line is parsed into a [`Command`] and executed against
//! [`AppState`]; results are printed, failures logged.

use tagger_core::{ipc::events::top_predictions, SettingsRequest};
use tracing::{info, warn};

use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Switch to live capture, optionally with another predictor.
    Live { predictor_id: Option<u32> },
    /// Switch to file playback; `None` reuses the last file.
    File {
        source_id: Option<u32>,
        predictor_id: Option<u32>,
    },
    /// Swap the predictor, keeping the current source.
    Predictor(u32),
    List,
    Status,
    Top(usize),
    Diagnostics,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  live [predictor]          switch to live capture
  file [source] [predictor] switch to file playback
  predictor <id>            swap the predictor
  list                      show predictors and sources
  status                    coordinator status and active settings
  top [k]                   current top-k prediction (default 5)
  diag                      pipeline counters and latencies
  quit                      stop and exit";

pub fn parse(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Err("empty command".into());
    };
    let args: Vec<&str> = words.collect();
    let id = |i: usize| -> Result<Option<u32>, String> {
        args.get(i)
            .map(|raw| raw.parse::<u32>().map_err(|_| format!("'{raw}' is not an id")))
            .transpose()
    };
    let max_args = |n: usize| -> Result<(), String> {
        if args.len() > n {
            Err(format!("'{head}' takes at most {n} argument(s)"))
        } else {
            Ok(())
        }
    };

    match head.to_ascii_lowercase().as_str() {
        "live" => {
            max_args(1)?;
            Ok(Command::Live {
                predictor_id: id(0)?,
            })
        }
        "file" => {
            max_args(2)?;
            Ok(Command::File {
                source_id: id(0)?,
                predictor_id: id(1)?,
            })
        }
        "predictor" => {
            max_args(1)?;
            id(0)?
                .map(Command::Predictor)
                .ok_or_else(|| "'predictor' needs an id".to_string())
        }
        "list" | "ls" => Ok(Command::List),
        "status" => Ok(Command::Status),
        "top" => {
            max_args(1)?;
            let k = match args.first() {
                Some(raw) => raw
                    .parse::<usize>()
                    .map_err(|_| format!("'{raw}' is not a count"))?,
                None => 5,
            };
            Ok(Command::Top(k))
        }
        "diag" | "diagnostics" => Ok(Command::Diagnostics),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        other => Err(format!("unknown command '{other}' (try 'help')")),
    }
}

/// Translate a reconfiguration command into a request. `None` for commands
/// that only read state.
pub fn settings_request(command: &Command, state: &AppState) -> Option<SettingsRequest> {
    match *command {
        Command::Live { predictor_id } => Some(SettingsRequest::live(predictor_id)),
        Command::File {
            source_id,
            predictor_id,
        } => Some(SettingsRequest {
            is_live: false,
            source_id,
            predictor_id,
        }),
        Command::Predictor(id) => {
            let is_live = state
                .coordinator
                .active_settings()
                .map_or(true, |active| active.is_live);
            Some(SettingsRequest {
                is_live,
                source_id: None,
                predictor_id: Some(id),
            })
        }
        _ => None,
    }
}

/// Run one command. Returns `false` when the host should exit.
pub fn execute(command: Command, state: &AppState) -> bool {
    if let Some(request) = settings_request(&command, state) {
        match state.apply(request) {
            Ok(()) => info!(?request, "settings applied"),
            Err(e) => warn!(?request, "settings rejected: {e}"),
        }
        return true;
    }

    match command {
        Command::List => {
            println!("predictors:");
            for p in state.coordinator.list_predictors() {
                println!("  {:>3}  {} ({} classes) {}", p.id, p.display_name, p.num_classes, p.description);
            }
            println!("sources:");
            for s in state.coordinator.list_sources() {
                println!("  {:>3}  {}", s.id, s.display_name);
            }
        }
        Command::Status => {
            let active = state.coordinator.active_settings();
            println!(
                "status: {:?}  active: {}  producer exit: {:?}",
                state.coordinator.status(),
                active
                    .and_then(|a| serde_json::to_string(&a).ok())
                    .unwrap_or_else(|| "none".into()),
                state.coordinator.producer_exit()
            );
        }
        Command::Top(k) => {
            for entry in top_predictions(&state.coordinator.get_live_prediction(), k) {
                println!("  {:<28} {:.3}", entry.label, entry.probability);
            }
        }
        Command::Diagnostics => match serde_json::to_string_pretty(&state.perf_snapshot()) {
            Ok(json) => println!("{json}"),
            Err(e) => warn!("failed to render diagnostics: {e}"),
        },
        Command::Help => println!("{HELP}"),
        Command::Quit => return false,
        Command::Live { .. } | Command::File { .. } | Command::Predictor(_) => {}
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reconfiguration_commands() {
        assert_eq!(parse("live").unwrap(), Command::Live { predictor_id: None });
        assert_eq!(parse("LIVE 2").unwrap(), Command::Live { predictor_id: Some(2) });
        assert_eq!(
            parse("file 3 1").unwrap(),
            Command::File {
                source_id: Some(3),
                predictor_id: Some(1)
            }
        );
        assert_eq!(
            parse("  file  ").unwrap(),
            Command::File {
                source_id: None,
                predictor_id: None
            }
        );
        assert_eq!(parse("predictor 4").unwrap(), Command::Predictor(4));
    }

    #[test]
    fn parses_read_only_commands() {
        assert_eq!(parse("top").unwrap(), Command::Top(5));
        assert_eq!(parse("top 10").unwrap(), Command::Top(10));
        assert_eq!(parse("ls").unwrap(), Command::List);
        assert_eq!(parse("diag").unwrap(), Command::Diagnostics);
        assert_eq!(parse("exit").unwrap(), Command::Quit);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse("").is_err());
        assert!(parse("predictor").is_err());
        assert!(parse("predictor x").unwrap_err().contains("not an id"));
        assert!(parse("live 1 2").is_err());
        assert!(parse("top -1").is_err());
        assert!(parse("rewind").unwrap_err().contains("unknown command"));
    }
}
