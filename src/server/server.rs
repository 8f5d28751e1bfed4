//! WebSocket server implementation.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::config::ServerSettings;
use crate::error::QuizError;

use super::commands::{CommandResult, execute_command};
use super::connection::Connection;
use super::state::{Game, Outbound, OutboundReceiver};

type WsSender = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Reason given to clients when the host shuts the server down.
pub const SHUTDOWN_REASON: &str = "server is shutting down";

/// Run the quiz server until the host quits.
pub async fn run(settings: &ServerSettings, game: Arc<Game>) -> Result<(), QuizError> {
    let addr = format!("{}:{}", settings.bind_address, settings.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    let acceptor = tokio::spawn(accept_loop(listener, Arc::clone(&game)));

    let stdin = BufReader::new(tokio::io::stdin());
    if run_console(&game, stdin).await? == ConsoleExit::EndOfInput {
        // Without a terminal (service managers, detached containers) stdin is
        // empty from the start; keep serving until interrupted.
        info!("Console input closed, serving until interrupted");
        tokio::signal::ctrl_c().await?;
    }

    game.close_all(SHUTDOWN_REASON).await;
    acceptor.abort();
    info!("Server stopped");
    Ok(())
}

async fn accept_loop(listener: TcpListener, game: Arc<Game>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tokio::spawn(handle_connection(stream, addr, Arc::clone(&game)));
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

/// Handle a single WebSocket connection.
async fn handle_connection(stream: TcpStream, addr: SocketAddr, game: Arc<Game>) {
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };

    let (ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, rx) = mpsc::unbounded_channel::<Outbound>();
    let send_task = tokio::spawn(forward_outbound(rx, ws_sender));

    let connection = Connection::open(game, addr.ip(), tx).await;

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => connection.handle_text(text.as_str()).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                error!(connection = %connection.id(), "Received an error message: {}", e);
                break;
            }
        }
    }

    debug!(connection = %connection.id(), "Channel closed");
    connection.disconnected().await;
    // The writer ends once every sender, including the game's copy, is gone.
    drop(send_task);
}

/// Drain a connection's queue into its socket.
async fn forward_outbound(mut rx: OutboundReceiver, mut ws_sender: WsSender) {
    while let Some(item) = rx.recv().await {
        let result = match item {
            Outbound::Event(event) => match event.encode() {
                Ok(text) => ws_sender.send(Message::Text(text.into())).await,
                Err(e) => {
                    warn!(event_type = %event.event_type, "Failed to encode an event: {}", e);
                    continue;
                }
            },
            Outbound::Close => {
                let _ = ws_sender.send(Message::Close(None)).await;
                break;
            }
        };

        if let Err(e) = result {
            warn!("Failed to send an event: {}", e);
            break;
        }
    }
}

/// How the host console stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsoleExit {
    Quit,
    EndOfInput,
}

/// Read host commands line by line until `quit` or end of input.
async fn run_console<R>(game: &Game, input: R) -> Result<ConsoleExit, QuizError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    info!("Type 'help' for available commands");

    while let Some(line) = lines.next_line().await? {
        match execute_command(game, &line).await {
            CommandResult::Ok(Some(msg)) => println!("{}", msg),
            CommandResult::Ok(None) => {}
            CommandResult::Error(msg) => println!("Error: {}", msg),
            CommandResult::Quit => return Ok(ConsoleExit::Quit),
        }
    }

    Ok(ConsoleExit::EndOfInput)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::GameConfig;

    #[tokio::test]
    async fn test_console_stops_on_quit() {
        let game = Game::new(GameConfig::default());
        let input: &[u8] = b"open\nquit\nclose\n";

        assert_eq!(run_console(&game, input).await.unwrap(), ConsoleExit::Quit);
        assert!(game.accepting_new_players().await);
    }

    #[tokio::test]
    async fn test_console_reports_end_of_input() {
        let game = Game::new(GameConfig::default());

        let empty: &[u8] = b"";
        assert_eq!(run_console(&game, empty).await.unwrap(), ConsoleExit::EndOfInput);

        let input: &[u8] = b"open\nask 2 1\n";
        assert_eq!(run_console(&game, input).await.unwrap(), ConsoleExit::EndOfInput);
        assert!(game.is_question_active().await);
    }
}
