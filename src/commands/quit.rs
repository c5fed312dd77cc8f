use async_trait::async_trait;

use super::{Command, CommandResult, SessionInfo};

pub struct QuitCommand;

#[async_trait]
impl Command for QuitCommand {
    fn name(&self) -> &str {
        "/quit"
    }

    fn aliases(&self) -> &[&str] {
        &["/q", "/exit", "exit"]
    }

    fn description(&self) -> &str {
        "save preferences, stop the engine and exit"
    }

    async fn execute(&self, _args: &str, info: &SessionInfo<'_>) -> CommandResult {
        let pending = info.bridge().pending_count();
        if pending > 0 {
            println!("  … abandoning {pending} unanswered engine call(s)");
        }
        CommandResult::Quit
    }
}
