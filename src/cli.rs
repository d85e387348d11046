//! Command-line interface and REPL
//!
//! The REPL runs on its own thread (rustyline owns the terminal) and drives
//! the bridge through its handle.

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::debug;

use crate::bridge::{BridgeHandle, BridgeStatus};
use crate::config::AppConfig;
use crate::discovery;

/// A parsed REPL line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// `start [serial] [midi...]`; missing ports are resolved from config
    Start {
        serial: Option<String>,
        midi: Option<String>,
    },
    Stop,
    Toggle,
    Status,
    Ports,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCommandError(String);

impl fmt::Display for ParseCommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown command '{}' (type 'help')", self.0)
    }
}

impl std::error::Error for ParseCommandError {}

impl FromStr for ControlCommand {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(ParseCommandError(String::new()));
        };

        let command = match verb.to_lowercase().as_str() {
            "start" => {
                let serial = words.next().map(str::to_string);
                // MIDI port names often contain spaces
                let rest: Vec<&str> = words.collect();
                let midi = (!rest.is_empty()).then(|| rest.join(" "));
                ControlCommand::Start { serial, midi }
            }
            "stop" => ControlCommand::Stop,
            "toggle" | "t" => ControlCommand::Toggle,
            "status" | "s" => ControlCommand::Status,
            "ports" | "list" => ControlCommand::Ports,
            "help" | "?" => ControlCommand::Help,
            "quit" | "exit" | "q" => ControlCommand::Quit,
            _ => return Err(ParseCommandError(verb.to_string())),
        };
        Ok(command)
    }
}

/// Ports given on the command line; they win over config for every start
#[derive(Debug, Clone, Default)]
pub struct PortOverrides {
    pub serial: Option<String>,
    pub midi: Option<String>,
}

/// Run the interactive prompt until `quit`, Ctrl-C or Ctrl-D
///
/// Blocking; run it on its own thread with a handle to the runtime the bridge
/// lives on.
pub fn run_repl(
    runtime: Handle,
    bridge: BridgeHandle,
    config: watch::Receiver<AppConfig>,
    overrides: PortOverrides,
) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    print_help();

    loop {
        let line = match rl.readline("bridge> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        if line.trim().is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(line.as_str());

        let command = match line.parse::<ControlCommand>() {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e.to_string().yellow());
                continue;
            }
        };
        debug!("REPL command: {:?}", command);

        match command {
            ControlCommand::Quit => break,
            ControlCommand::Help => print_help(),
            ControlCommand::Ports => {
                let config = config.borrow().clone();
                discovery::print_ports(&config.serial.auto_select, &config.midi.auto_select);
            }
            ControlCommand::Status => report(runtime.block_on(bridge.status())),
            ControlCommand::Stop => report(runtime.block_on(bridge.stop())),
            ControlCommand::Start { serial, midi } => {
                let (serial, midi) = pick_ports(&config, &overrides, serial, midi);
                report(runtime.block_on(bridge.start(serial, midi)));
            }
            ControlCommand::Toggle => {
                let result = if bridge.run_state().is_running() {
                    runtime.block_on(bridge.stop())
                } else {
                    let (serial, midi) = pick_ports(&config, &overrides, None, None);
                    runtime.block_on(bridge.toggle(serial, midi))
                };
                report(result);
            }
        }
    }

    Ok(())
}

fn pick_ports(
    config: &watch::Receiver<AppConfig>,
    overrides: &PortOverrides,
    serial: Option<String>,
    midi: Option<String>,
) -> (String, String) {
    let config = config.borrow().clone();
    let serial = serial.or_else(|| overrides.serial.clone());
    let midi = midi.or_else(|| overrides.midi.clone());
    discovery::resolve_ports(serial.as_deref(), midi.as_deref(), &config)
}

fn report(result: Result<BridgeStatus, crate::error::BridgeError>) {
    match result {
        Ok(status) => println!("{}", format_status(&status)),
        Err(e) if e.is_configuration() => println!("{}", e.to_string().yellow()),
        Err(e) => println!("{}", e.to_string().red()),
    }
}

/// One-line status summary
pub fn format_status(status: &BridgeStatus) -> String {
    match &status.ports {
        Some(ports) => format!(
            "{}: {} @ {} baud -> {}",
            status.state, ports.serial, ports.baud_rate, ports.midi
        ),
        None => match &status.last_error {
            Some(e) => format!("{} (last run ended: {})", status.state, e),
            None => status.state.to_string(),
        },
    }
}

fn print_help() {
    println!("{}", "Commands:".bold());
    println!("  start [serial] [midi]  open the ports and start relaying");
    println!("  stop                   stop relaying and close the ports");
    println!("  toggle                 start or stop");
    println!("  status                 show the bridge state");
    println!("  ports                  list serial ports and MIDI outputs");
    println!("  help                   show this help");
    println!("  quit                   stop and exit");
}
