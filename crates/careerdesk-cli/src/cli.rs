//! Command-line argument parsing.

use anyhow::{bail, Result};

pub const USAGE: &str = "\
Usage: careerdesk <command> [options]

Commands:
  login [--email EMAIL] [--remember] [--callback PATH]
                      Sign in. Without --remember the user record lasts only
                      as long as this process, like a browser tab.
  status              Show the current session
  logout              Sign out and clear every stored trace of the session
  guard <PATH|URL>    Show what the route guard does with a request
  get <API-PATH>      Fetch an API resource with the session's token
  watch               Keep the session open, re-checking expiry every minute
  help                Show this message

Environment:
  CAREERDESK_API_URL   API base URL (default http://localhost:8000)
  CAREERDESK_EMAIL     Email for login
  CAREERDESK_PASSWORD  Password for login (prompted otherwise)
  RUST_LOG             Log filter (default warn)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login {
        email: Option<String>,
        remember: bool,
        callback: Option<String>,
    },
    Status,
    Logout,
    Guard {
        target: String,
    },
    Get {
        path: String,
    },
    Watch,
    Help,
}

impl Command {
    pub fn parse(args: &[String]) -> Result<Self> {
        let Some(name) = args.first() else {
            return Ok(Command::Help);
        };
        let rest = &args[1..];

        match name.as_str() {
            "login" => parse_login(rest),
            "status" => no_args(rest, Command::Status),
            "logout" => no_args(rest, Command::Logout),
            "guard" => Ok(Command::Guard {
                target: single_arg(rest, "guard")?,
            }),
            "get" => Ok(Command::Get {
                path: single_arg(rest, "get")?,
            }),
            "watch" => no_args(rest, Command::Watch),
            "help" | "--help" | "-h" => Ok(Command::Help),
            other => bail!("Unknown command: {}", other),
        }
    }

    /// Only `watch` keeps running long enough to want a log file
    pub fn is_long_running(&self) -> bool {
        matches!(self, Command::Watch)
    }
}

fn parse_login(args: &[String]) -> Result<Command> {
    let mut email = None;
    let mut remember = false;
    let mut callback = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--remember" => remember = true,
            "--email" => email = Some(value_for(&mut iter, "--email")?),
            "--callback" => callback = Some(value_for(&mut iter, "--callback")?),
            other => bail!("Unexpected login argument: {}", other),
        }
    }

    Ok(Command::Login {
        email,
        remember,
        callback,
    })
}

fn value_for<'a>(iter: &mut impl Iterator<Item = &'a String>, flag: &str) -> Result<String> {
    match iter.next() {
        Some(value) if !value.starts_with("--") => Ok(value.clone()),
        _ => bail!("{} needs a value", flag),
    }
}

fn single_arg(args: &[String], command: &str) -> Result<String> {
    match args {
        [one] => Ok(one.clone()),
        _ => bail!("{} takes exactly one argument", command),
    }
}

fn no_args(args: &[String], command: Command) -> Result<Command> {
    if let Some(extra) = args.first() {
        bail!("Unexpected argument: {}", extra);
    }
    Ok(command)
}
