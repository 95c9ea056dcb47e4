//! Line-oriented command console.

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use tokio::sync::{broadcast, Mutex};

use probewire_core::{DataType, WatchEntry, WatchRegistry};
use probewire_engine::{DebugEvent, DebuggerService, Submission};

pub(crate) const HELP: &str = "\
commands:
  reset | status | crc | breakpoints | quit
  break <addr> <thread>      unbreak <addr> <thread>
  continue [thread]          stop [thread]          step <thread>
  watch <name> <addr> <type> [size]                 unwatch <name>
  read <name>                write <name> <value>   poll on|off";

/// One parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ConsoleCommand {
    Reset,
    Status,
    Crc,
    Break { address: u32, thread: u32 },
    Unbreak { address: u32, thread: u32 },
    Continue(Option<u32>),
    Stop(Option<u32>),
    Step(u32),
    Watch {
        name: String,
        address: u32,
        data_type: DataType,
        size: Option<u8>,
    },
    Unwatch(String),
    Read(String),
    Write { name: String, value: String },
    Poll(bool),
    Breakpoints,
    Help,
    Quit,
}

/// What the loop does after a command.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Outcome {
    Print(String),
    Quit,
}

/// Parse one input line. Blank lines yield `None`.
pub(crate) fn parse_line(line: &str) -> Result<Option<ConsoleCommand>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match (verb, args.as_slice()) {
        ("reset", []) => ConsoleCommand::Reset,
        ("status", []) => ConsoleCommand::Status,
        ("crc", []) => ConsoleCommand::Crc,
        ("break", [addr, thread]) => ConsoleCommand::Break {
            address: parse_u32(addr)?,
            thread: parse_u32(thread)?,
        },
        ("unbreak", [addr, thread]) => ConsoleCommand::Unbreak {
            address: parse_u32(addr)?,
            thread: parse_u32(thread)?,
        },
        ("continue", []) => ConsoleCommand::Continue(None),
        ("continue", [thread]) => ConsoleCommand::Continue(Some(parse_u32(thread)?)),
        ("stop", []) => ConsoleCommand::Stop(None),
        ("stop", [thread]) => ConsoleCommand::Stop(Some(parse_u32(thread)?)),
        ("step", [thread]) => ConsoleCommand::Step(parse_u32(thread)?),
        ("watch", [name, addr, ty, rest @ ..]) if rest.len() <= 1 => ConsoleCommand::Watch {
            name: (*name).to_string(),
            address: parse_u32(addr)?,
            data_type: ty.parse().map_err(|e: String| anyhow!(e))?,
            size: match rest.first() {
                Some(size) => Some(
                    u8::try_from(parse_u32(size)?).context("size must fit in one byte")?,
                ),
                None => None,
            },
        },
        ("unwatch", [name]) => ConsoleCommand::Unwatch((*name).to_string()),
        ("read", [name]) => ConsoleCommand::Read((*name).to_string()),
        ("write", [name, value]) => ConsoleCommand::Write {
            name: (*name).to_string(),
            value: (*value).to_string(),
        },
        ("poll", ["on"]) => ConsoleCommand::Poll(true),
        ("poll", ["off"]) => ConsoleCommand::Poll(false),
        ("breakpoints", []) => ConsoleCommand::Breakpoints,
        ("help" | "?", []) => ConsoleCommand::Help,
        ("quit" | "exit", []) => ConsoleCommand::Quit,
        _ => bail!("unrecognized command '{}', try 'help'", line.trim()),
    };
    Ok(Some(command))
}

/// Parse a decimal or `0x`-prefixed hex number.
pub(crate) fn parse_u32(text: &str) -> Result<u32> {
    let parsed = match text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.with_context(|| format!("invalid number '{text}'"))
}

/// Render an engine event for the terminal.
pub(crate) fn format_event(event: &DebugEvent) -> String {
    match event {
        DebugEvent::Halted(statuses) if statuses.is_empty() => "halted".to_string(),
        DebugEvent::Halted(statuses) => {
            let tasks: Vec<String> = statuses.iter().map(i32::to_string).collect();
            format!("halted: tasks {}", tasks.join(", "))
        }
        DebugEvent::WatchUpdated { entry, .. } => {
            format!("{} = {}", entry.name, entry.value)
        }
    }
}

/// Print events until the service goes away.
pub(crate) async fn print_events(mut events: broadcast::Receiver<DebugEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => println!("{}", format_event(&event)),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "event printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Executes parsed commands against one service.
pub(crate) struct Console {
    service: Arc<DebuggerService>,
    registry: Arc<Mutex<WatchRegistry>>,
}

impl Console {
    pub(crate) fn new(service: Arc<DebuggerService>, registry: Arc<Mutex<WatchRegistry>>) -> Self {
        Self { service, registry }
    }

    pub(crate) async fn execute(&self, command: ConsoleCommand) -> Result<Outcome> {
        let service = &self.service;
        let text = match command {
            ConsoleCommand::Reset => verdict(service.reset().await?),
            ConsoleCommand::Status => match service.query_task_status().await? {
                Some(status) => format!("task status: {status}"),
                None => "task status unavailable".to_string(),
            },
            ConsoleCommand::Crc => {
                if service.check_code_crc().await? {
                    "code CRC matches".to_string()
                } else {
                    "code CRC does not match".to_string()
                }
            }
            ConsoleCommand::Break { address, thread } => {
                verdict(service.set_breakpoint(address, thread).await?)
            }
            ConsoleCommand::Unbreak { address, thread } => {
                verdict(service.remove_breakpoint(address, thread).await?)
            }
            ConsoleCommand::Continue(None) => verdict(service.continue_all().await?),
            ConsoleCommand::Continue(Some(thread)) => verdict(service.continue_task(thread).await?),
            ConsoleCommand::Stop(None) => verdict(service.stop_all().await?),
            ConsoleCommand::Stop(Some(thread)) => verdict(service.stop_task(thread).await?),
            ConsoleCommand::Step(thread) => verdict(service.step_task(thread).await?),
            ConsoleCommand::Watch {
                name,
                address,
                data_type,
                size,
            } => {
                let mut registry = self.registry.lock().await;
                if registry.find_by_name(&name).is_some() {
                    bail!("'{name}' is already watched");
                }
                let mut entry = WatchEntry::new(name.as_str(), address, data_type);
                if let Some(size) = size {
                    entry = entry.with_size(size);
                }
                registry.add(entry);
                format!("watching {name} at 0x{address:X} ({data_type})")
            }
            ConsoleCommand::Unwatch(name) => {
                let mut registry = self.registry.lock().await;
                let id = registry
                    .find_by_name(&name)
                    .ok_or_else(|| anyhow!("'{name}' is not watched"))?;
                registry.remove(id);
                format!("removed {name}")
            }
            ConsoleCommand::Read(name) => {
                let entry = self.entry(&name).await?;
                let value = service.read_memory(&entry, Submission::Queued).await?;
                format!("{name} = {value}")
            }
            ConsoleCommand::Write { name, value } => {
                let mut entry = self.entry(&name).await?;
                entry.new_value = Some(value);
                verdict(service.write_memory(&entry).await?)
            }
            ConsoleCommand::Poll(enabled) => {
                service.set_background_poll_enabled(enabled);
                format!("polling {}", if enabled { "on" } else { "off" })
            }
            ConsoleCommand::Breakpoints => {
                let lines: Vec<String> = service
                    .breakpoints()
                    .iter()
                    .map(|bp| {
                        let hit = if bp.hit { " (hit)" } else { "" };
                        format!("0x{:X} task {}{hit}", bp.address, bp.thread)
                    })
                    .collect();
                if lines.is_empty() {
                    "no breakpoints".to_string()
                } else {
                    lines.join("\n")
                }
            }
            ConsoleCommand::Help => HELP.to_string(),
            ConsoleCommand::Quit => return Ok(Outcome::Quit),
        };
        Ok(Outcome::Print(text))
    }

    async fn entry(&self, name: &str) -> Result<WatchEntry> {
        let registry = self.registry.lock().await;
        registry
            .find_by_name(name)
            .and_then(|id| registry.get(id))
            .cloned()
            .ok_or_else(|| anyhow!("'{name}' is not watched"))
    }
}

fn verdict(accepted: bool) -> String {
    let text = if accepted { "ok" } else { "not accepted" };
    text.to_string()
}
