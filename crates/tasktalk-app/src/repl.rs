//! Line-oriented chat loop on stdin/stdout.

use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use uuid::Uuid;

use tasktalk_chat::{ConversationOrchestrator, ModerationFilter};

const HELP: &str = "Commands: /help, /state, /reset, /quit. Anything else is sent to the assistant.";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Help,
    State,
    Reset,
    Quit,
    Unknown(String),
    Message(String),
    Empty,
}

fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    match line {
        "/help" => Command::Help,
        "/state" => Command::State,
        "/reset" => Command::Reset,
        "/quit" | "/exit" => Command::Quit,
        other if other.starts_with('/') => Command::Unknown(other.to_string()),
        other => Command::Message(other.to_string()),
    }
}

pub struct Repl {
    orchestrator: Arc<ConversationOrchestrator>,
    moderation: Arc<dyn ModerationFilter>,
    user_id: String,
    conversation_id: String,
}

impl Repl {
    pub fn new(
        orchestrator: Arc<ConversationOrchestrator>,
        moderation: Arc<dyn ModerationFilter>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            orchestrator,
            moderation,
            user_id: user_id.into(),
            conversation_id: Uuid::new_v4().to_string(),
        }
    }

    /// Runs until `/quit` or end of input.
    pub async fn run(&mut self) -> std::io::Result<()> {
        println!("{}", HELP);
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("> ");
            std::io::stdout().flush()?;
            let Some(line) = lines.next_line().await? else {
                break;
            };
            match parse_command(&line) {
                Command::Empty => {}
                Command::Help => println!("{}", HELP),
                Command::Quit => break,
                Command::Unknown(cmd) => println!("Unknown command {}. {}", cmd, HELP),
                Command::Reset => self.reset(),
                Command::State => self.print_state(),
                Command::Message(text) => self.send(&text).await,
            }
        }
        info!(conversation_id = %self.conversation_id, "Session ended");
        Ok(())
    }

    async fn send(&self, text: &str) {
        let verdict = self.moderation.check(text).await;
        if !verdict.safe {
            debug!(reason = verdict.reason.as_deref().unwrap_or("-"), "Message blocked");
            println!("Sorry, I can't help with that message.");
            return;
        }
        let reply = self
            .orchestrator
            .handle_message(&self.conversation_id, &self.user_id, text)
            .await;
        println!("{}", reply.reply);
    }

    fn reset(&mut self) {
        self.orchestrator.state_store().clear(&self.conversation_id);
        self.orchestrator.confirmations().cancel(&self.conversation_id);
        self.conversation_id = Uuid::new_v4().to_string();
        println!("Started a new conversation.");
    }

    fn print_state(&self) {
        match self.orchestrator.active_state(&self.conversation_id) {
            Some(state) => match serde_json::to_string_pretty(&state) {
                Ok(json) => println!("{}", json),
                Err(e) => println!("State unavailable: {}", e),
            },
            None if self.orchestrator.confirmations().is_pending(&self.conversation_id) => {
                println!("Waiting for you to confirm a task.")
            }
            None => println!("No task in progress."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("  "), Command::Empty);
        assert_eq!(parse_command("/quit"), Command::Quit);
        assert_eq!(parse_command("/exit"), Command::Quit);
        assert_eq!(parse_command("/state"), Command::State);
        assert_eq!(parse_command("/bogus"), Command::Unknown("/bogus".to_string()));
        assert_eq!(
            parse_command(" create task write report "),
            Command::Message("create task write report".to_string())
        );
    }
}
