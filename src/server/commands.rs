//! Server command parser and executor.
//!
//! Handles host commands like `ask`, `stop`, `open`, etc.

use super::state::Game;

/// Result of executing a command.
#[derive(Debug, PartialEq, Eq)]
pub enum CommandResult {
    /// Command executed successfully with optional message.
    Ok(Option<String>),
    /// Command failed with an error message.
    Error(String),
    /// Server should quit.
    Quit,
}

/// A parsed host command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ask {
        number_of_variants: u32,
        correct_answers: Vec<u32>,
    },
    Stop,
    Open,
    Close,
    List,
    Help,
    Quit,
}

/// Parse one input line. Empty input yields `Ok(None)`.
pub fn parse_command(input: &str) -> Result<Option<Command>, String> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }

    let parts: Vec<&str> = input.split_whitespace().collect();
    let command = parts[0].to_lowercase();
    let args = &parts[1..];

    let parsed = match command.as_str() {
        "ask" => parse_ask(args)?,
        "stop" => Command::Stop,
        "open" => Command::Open,
        "close" => Command::Close,
        "players" | "list" => Command::List,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ => {
            return Err(format!(
                "Unknown command: {}. Type 'help' for available commands.",
                command
            ));
        }
    };

    Ok(Some(parsed))
}

fn parse_ask(args: &[&str]) -> Result<Command, String> {
    const USAGE: &str = "Usage: ask <variants> <correct>[,<correct>...]";

    let [variants, correct] = args else {
        return Err(USAGE.to_string());
    };

    let number_of_variants: u32 = variants
        .parse()
        .map_err(|_| format!("Invalid number of variants: {}", variants))?;
    if number_of_variants == 0 {
        return Err("A question needs at least one variant.".to_string());
    }

    let correct_answers = correct
        .split(',')
        .map(|answer| {
            let index: u32 = answer
                .trim()
                .parse()
                .map_err(|_| format!("Invalid answer index: {}", answer))?;
            if index >= number_of_variants {
                return Err(format!(
                    "Answer index {} is out of range (0..{})",
                    index, number_of_variants
                ));
            }
            Ok(index)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Command::Ask {
        number_of_variants,
        correct_answers,
    })
}

/// Parse and execute a command.
pub async fn execute_command(game: &Game, input: &str) -> CommandResult {
    match parse_command(input) {
        Ok(Some(command)) => execute(game, command).await,
        Ok(None) => CommandResult::Ok(None),
        Err(msg) => CommandResult::Error(msg),
    }
}

async fn execute(game: &Game, command: Command) -> CommandResult {
    match command {
        Command::Ask {
            number_of_variants,
            correct_answers,
        } => {
            let delivered = game.ask_a_question(number_of_variants, correct_answers).await;
            CommandResult::Ok(Some(format!(
                "Question with {} variants sent to {} players.",
                number_of_variants, delivered
            )))
        }
        Command::Stop => {
            if game.finish_question().await {
                CommandResult::Ok(Some("Question finished.".to_string()))
            } else {
                CommandResult::Error("No question is being asked.".to_string())
            }
        }
        Command::Open => {
            game.set_accepting_new_players(true).await;
            CommandResult::Ok(Some("Registration is open.".to_string()))
        }
        Command::Close => {
            game.set_accepting_new_players(false).await;
            CommandResult::Ok(Some("Registration is closed.".to_string()))
        }
        Command::List => cmd_list(game).await,
        Command::Help => cmd_help(),
        Command::Quit => CommandResult::Quit,
    }
}

/// List players with their scores.
async fn cmd_list(game: &Game) -> CommandResult {
    let players = game.players().await;
    if players.is_empty() {
        return CommandResult::Ok(Some("No players registered.".to_string()));
    }

    let entries: Vec<String> = players
        .iter()
        .map(|p| format!("{} ({})", p.name, p.score))
        .collect();
    CommandResult::Ok(Some(format!(
        "Players({}): {}",
        players.len(),
        entries.join(", ")
    )))
}

/// Show help.
fn cmd_help() -> CommandResult {
    let help = r#"Available commands:
  ask <n> <c,...> - Ask a question with n variants and correct indices
  stop            - End the current question
  open            - Accept new players
  close           - Stop accepting new players
  players/list    - List registered players and scores
  quit/exit       - Shutdown server
  help/?          - Show this help"#;
    CommandResult::Ok(Some(help.to_string()))
}
