//! Line-based control console on stdin

use std::io::{self, BufRead};
use std::thread;

use anyhow::{anyhow, bail, Context};
use crossbeam_channel::{unbounded, Receiver};
use strand_audio::PipelineCommand;
use strand_config::EffectKind;

pub const HELP: &str = "commands: effect <energy|scroll|spectrum>, freq <min> <max>, bands <n>, \
pixels <n>, threshold <level>, device <n|default>, status, help, quit";

/// A parsed console line
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Pipeline(PipelineCommand),
    Device(Option<usize>),
    Status,
    Help,
    Quit,
}

/// Parse one console line; blank lines yield `None`
pub fn parse_line(line: &str) -> anyhow::Result<Option<ConsoleCommand>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let expect_args = |n: usize| -> anyhow::Result<()> {
        if args.len() != n {
            bail!("'{}' takes {} argument(s), got {}", verb, n, args.len());
        }
        Ok(())
    };

    let cmd = match verb.to_ascii_lowercase().as_str() {
        "effect" => {
            expect_args(1)?;
            let kind: EffectKind = args[0].parse()?;
            ConsoleCommand::Pipeline(PipelineCommand::SelectEffect(kind))
        }
        "freq" => {
            expect_args(2)?;
            let min = parse_number(args[0], "min frequency")?;
            let max = parse_number(args[1], "max frequency")?;
            ConsoleCommand::Pipeline(PipelineCommand::SetFrequencyRange { min, max })
        }
        "bands" => {
            expect_args(1)?;
            ConsoleCommand::Pipeline(PipelineCommand::SetNumBands(parse_number(args[0], "band count")?))
        }
        "pixels" => {
            expect_args(1)?;
            ConsoleCommand::Pipeline(PipelineCommand::SetNumPixels(parse_number(args[0], "pixel count")?))
        }
        "threshold" => {
            expect_args(1)?;
            ConsoleCommand::Pipeline(PipelineCommand::SetVolumeThreshold(parse_number(
                args[0],
                "threshold",
            )?))
        }
        "device" => {
            expect_args(1)?;
            if args[0].eq_ignore_ascii_case("default") {
                ConsoleCommand::Device(None)
            } else {
                ConsoleCommand::Device(Some(parse_number(args[0], "device index")?))
            }
        }
        "status" => ConsoleCommand::Status,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "q" | "exit" => ConsoleCommand::Quit,
        other => return Err(anyhow!("unknown command '{}'", other)),
    };
    Ok(Some(cmd))
}

fn parse_number<T>(value: &str, what: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .with_context(|| format!("invalid {} '{}'", what, value))
}

/// Read stdin on a background thread, forwarding parsed commands.
///
/// Bad lines are logged and skipped. The channel closes at end of input.
pub fn spawn() -> io::Result<Receiver<ConsoleCommand>> {
    let (tx, rx) = unbounded();
    thread::Builder::new()
        .name("strand-console".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                match parse_line(&line) {
                    Ok(Some(cmd)) => {
                        if tx.send(cmd).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!("{:#}", e),
                }
            }
            tracing::debug!("Console input closed");
        })?;
    Ok(rx)
}
