use async_trait::async_trait;

use super::{Command, CommandResult, SessionInfo};
use crate::bridge::DisplayOption;
use crate::consts::format_number;
use crate::view::LoadPhase;

pub struct StatusCommand;

#[async_trait]
impl Command for StatusCommand {
    fn name(&self) -> &str {
        "/status"
    }

    fn aliases(&self) -> &[&str] {
        &["/s"]
    }

    fn description(&self) -> &str {
        "show engine, view and call state"
    }

    async fn execute(&self, _args: &str, info: &SessionInfo<'_>) -> CommandResult {
        let bridge = info.bridge();
        let props = info.view.props();
        let stats = bridge.stats();

        let phase = match info.view.phase() {
            LoadPhase::Idle => "no content".to_string(),
            LoadPhase::Requested => "waiting for engine".to_string(),
            LoadPhase::Loading => "loading".to_string(),
            LoadPhase::Loaded => format!("loaded ({} bytes)", format_number(props.content.len() as u64)),
            LoadPhase::Failed(e) => format!("failed: {e}"),
        };
        let hidden: Vec<&str> = DisplayOption::ALL
            .into_iter()
            .filter(|o| !props.display.get(*o))
            .map(DisplayOption::name)
            .collect();

        println!("  engine     {}", info.engine);
        println!("  ready      {}", if bridge.is_ready() { "yes" } else { "no" });
        println!("  busy       {}", if bridge.is_operation_in_flight() { "yes" } else { "no" });
        println!("  pending    {}", bridge.pending_count());
        println!("  score      {phase}");
        println!("  zoom       {}", props.zoom);
        println!("  transpose  {:+}", props.transpose);
        if let Some(size) = props.size {
            println!("  size       {size}");
        }
        println!(
            "  margins    {} {} {} {}",
            props.margins.top, props.margins.right, props.margins.bottom, props.margins.left
        );
        if !hidden.is_empty() {
            println!("  hidden     {}", hidden.join(", "));
        }
        println!(
            "  calls      {} issued, {} ok, {} failed, {} timed out",
            format_number(stats.issued),
            format_number(stats.succeeded),
            format_number(stats.failed),
            format_number(stats.timed_out),
        );
        if let Some(failure) = bridge.last_failure() {
            println!("  last error {failure}");
        }
        CommandResult::Handled
    }
}
