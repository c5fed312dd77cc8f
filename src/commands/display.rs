//! Commands that change view state. Each one goes through the view so
//! change-gating and persistence see the same values.

use async_trait::async_trait;

use super::{Command, CommandResult, SessionInfo};
use crate::bridge::params::parse_switch;
use crate::bridge::{DisplayOption, Parameter};

/// Validate and push a parameter through the view.
async fn apply(info: &SessionInfo<'_>, parameter: Parameter) {
    if let Err(e) = parameter.validate() {
        eprintln!("  ✗ {e}");
        return;
    }
    let view = info.view;
    match parameter {
        Parameter::Zoom(zoom) => view.set_zoom(zoom).await,
        Parameter::Transpose(semitones) => view.set_transpose(semitones).await,
        Parameter::Display(option, enabled) => view.set_display_option(option, enabled).await,
        Parameter::Margins(margins) => view.set_margins(margins).await,
        Parameter::ContainerSize(size) => view.set_container_size(size),
    }
    if !info.bridge().is_ready() {
        println!("  … saved; applied once the engine is ready");
    }
}

/// Parse `args` as the value of `name` and apply it.
async fn parse_and_apply(name: &str, args: &str, info: &SessionInfo<'_>) {
    match Parameter::parse(name, args) {
        Ok(parameter) => apply(info, parameter).await,
        Err(e) => eprintln!("  ✗ {e}"),
    }
}

pub struct ZoomCommand;

#[async_trait]
impl Command for ZoomCommand {
    fn name(&self) -> &str {
        "/zoom"
    }

    fn usage(&self) -> &str {
        "<factor>"
    }

    fn description(&self) -> &str {
        "set the zoom factor (0.1 to 5.0)"
    }

    async fn execute(&self, args: &str, info: &SessionInfo<'_>) -> CommandResult {
        parse_and_apply("zoom", args, info).await;
        CommandResult::Handled
    }
}

pub struct TransposeCommand;

#[async_trait]
impl Command for TransposeCommand {
    fn name(&self) -> &str {
        "/transpose"
    }

    fn usage(&self) -> &str {
        "<semitones>"
    }

    fn description(&self) -> &str {
        "transpose the score by semitones"
    }

    async fn execute(&self, args: &str, info: &SessionInfo<'_>) -> CommandResult {
        parse_and_apply("transpose", args, info).await;
        CommandResult::Handled
    }
}

pub struct ToggleCommand;

#[async_trait]
impl Command for ToggleCommand {
    fn name(&self) -> &str {
        "/toggle"
    }

    fn usage(&self) -> &str {
        "<option> [on|off]"
    }

    fn description(&self) -> &str {
        "show or hide title, subtitle, composer, lyricist, part-names, measure-numbers"
    }

    async fn execute(&self, args: &str, info: &SessionInfo<'_>) -> CommandResult {
        let mut parts = args.split_whitespace();
        let Some(name) = parts.next() else {
            eprintln!("  ✗ usage: /toggle <option> [on|off]");
            return CommandResult::Handled;
        };
        let option: DisplayOption = match name.parse() {
            Ok(option) => option,
            Err(e) => {
                eprintln!("  ✗ {e}");
                return CommandResult::Handled;
            }
        };
        let enabled = match parts.next() {
            None => !info.view.props().display.get(option),
            Some(value) => match parse_switch(value) {
                Some(enabled) => enabled,
                None => {
                    eprintln!("  ✗ expected on or off, got {value}");
                    return CommandResult::Handled;
                }
            },
        };
        apply(info, Parameter::Display(option, enabled)).await;
        CommandResult::Handled
    }
}

pub struct MarginsCommand;

#[async_trait]
impl Command for MarginsCommand {
    fn name(&self) -> &str {
        "/margins"
    }

    fn usage(&self) -> &str {
        "<all> | <top> <right> <bottom> <left>"
    }

    fn description(&self) -> &str {
        "set page margins"
    }

    async fn execute(&self, args: &str, info: &SessionInfo<'_>) -> CommandResult {
        parse_and_apply("margins", args, info).await;
        CommandResult::Handled
    }
}

pub struct ResizeCommand;

#[async_trait]
impl Command for ResizeCommand {
    fn name(&self) -> &str {
        "/resize"
    }

    fn usage(&self) -> &str {
        "<width> <height>"
    }

    fn description(&self) -> &str {
        "set the container size the score is laid out into"
    }

    async fn execute(&self, args: &str, info: &SessionInfo<'_>) -> CommandResult {
        parse_and_apply("size", args, info).await;
        CommandResult::Handled
    }
}

pub struct SetCommand;

#[async_trait]
impl Command for SetCommand {
    fn name(&self) -> &str {
        "/set"
    }

    fn usage(&self) -> &str {
        "<name> <value>"
    }

    fn description(&self) -> &str {
        "set any parameter by name"
    }

    async fn execute(&self, args: &str, info: &SessionInfo<'_>) -> CommandResult {
        match args.split_once(char::is_whitespace) {
            Some((name, value)) => parse_and_apply(name, value.trim(), info).await,
            None => eprintln!("  ✗ usage: /set <name> <value>"),
        }
        CommandResult::Handled
    }
}
