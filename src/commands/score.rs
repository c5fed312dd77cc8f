use async_trait::async_trait;

use super::{Command, CommandResult, SessionInfo};
use crate::consts::format_number;
use crate::view::LoadPhase;

pub struct LoadCommand;

#[async_trait]
impl Command for LoadCommand {
    fn name(&self) -> &str {
        "/load"
    }

    fn aliases(&self) -> &[&str] {
        &["/open"]
    }

    fn usage(&self) -> &str {
        "<path>"
    }

    fn description(&self) -> &str {
        "load a MusicXML file and render it"
    }

    async fn execute(&self, args: &str, info: &SessionInfo<'_>) -> CommandResult {
        if args.is_empty() {
            eprintln!("  ✗ usage: /load <path>");
            return CommandResult::Handled;
        }
        let content = match tokio::fs::read_to_string(args).await {
            Ok(content) => content,
            Err(e) => {
                eprintln!("  ✗ cannot read {args}: {e}");
                return CommandResult::Handled;
            }
        };
        if content.trim().is_empty() {
            eprintln!("  ✗ {args} is empty");
            return CommandResult::Handled;
        }

        let bytes = content.len() as u64;
        info.view.set_content(content).await;
        match info.view.phase() {
            LoadPhase::Loaded => println!("  ✓ loaded {args} ({} bytes)", format_number(bytes)),
            LoadPhase::Requested => println!("  … {args} will load once the engine is ready"),
            // Failures were already reported by the view.
            _ => {}
        }
        CommandResult::Handled
    }
}

pub struct RenderCommand;

#[async_trait]
impl Command for RenderCommand {
    fn name(&self) -> &str {
        "/render"
    }

    fn description(&self) -> &str {
        "re-render the current score"
    }

    async fn execute(&self, _args: &str, info: &SessionInfo<'_>) -> CommandResult {
        match info.bridge().render().await {
            Ok(()) => println!("  ✓ rendered"),
            Err(e) => eprintln!("  ✗ {e}"),
        }
        CommandResult::Handled
    }
}

pub struct LayoutCommand;

#[async_trait]
impl Command for LayoutCommand {
    fn name(&self) -> &str {
        "/layout"
    }

    fn description(&self) -> &str {
        "show layout dimensions reported by the engine"
    }

    async fn execute(&self, _args: &str, info: &SessionInfo<'_>) -> CommandResult {
        match info.bridge().query_layout().await {
            Ok(layout) => match serde_json::to_string_pretty(&layout) {
                Ok(text) => println!("{text}"),
                Err(e) => eprintln!("  ✗ {e}"),
            },
            Err(e) => eprintln!("  ✗ {e}"),
        }
        CommandResult::Handled
    }
}
