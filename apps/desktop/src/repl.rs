//! Line-oriented front end over the form controller.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use client_core::{FormController, FormField, SubmitOutcome};
use tokio::io::{self, AsyncBufReadExt, BufReader};

use crate::{describe_status, print_notifications};

const HELP: &str = "commands: set <field> <value> | submit | reset | status | help | quit
fields:   fuel_type (X, Z, E, D, N), cylinders, engine_size";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Set { field: FormField, value: String },
    Submit,
    Reset,
    Status,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Option<ReplCommand>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let command = match verb.to_ascii_lowercase().as_str() {
        "set" => {
            let rest = rest.trim();
            let (name, value) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            if name.is_empty() {
                return Err(anyhow!("usage: set <field> <value>"));
            }
            ReplCommand::Set {
                field: name.parse()?,
                value: value.trim().to_string(),
            }
        }
        "submit" | "predict" => ReplCommand::Submit,
        "reset" | "clear" => ReplCommand::Reset,
        "status" | "show" => ReplCommand::Status,
        "help" | "?" => ReplCommand::Help,
        "quit" | "exit" => ReplCommand::Quit,
        other => return Err(anyhow!("unknown command '{other}' (try 'help')")),
    };
    Ok(Some(command))
}

pub async fn run(controller: Arc<FormController>) -> Result<()> {
    let mut notifications = controller.subscribe_notifications();
    let mut lines = BufReader::new(io::stdin()).lines();

    println!("{HELP}");
    while let Some(line) = lines.next_line().await? {
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                eprintln!("{err}");
                continue;
            }
        };

        match command {
            ReplCommand::Set { field, value } => controller.set_field(field, value),
            ReplCommand::Submit => match controller.submit().await {
                Ok(SubmitOutcome::Applied(status)) => println!("{}", describe_status(&status)),
                Ok(SubmitOutcome::Superseded) => {}
                Err(invalid) => {
                    for err in &invalid.errors {
                        eprintln!("  {err}");
                    }
                }
            },
            ReplCommand::Reset => {
                controller.reset();
                println!("form cleared");
            }
            ReplCommand::Status => {
                let input = controller.input();
                for field in FormField::ALL {
                    println!("{field:<12} {}", input.get(field));
                }
                println!("{}", describe_status(&controller.status()));
            }
            ReplCommand::Help => println!("{HELP}"),
            ReplCommand::Quit => break,
        }

        print_notifications(&mut notifications);
    }

    Ok(())
}
