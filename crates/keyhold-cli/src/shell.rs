//! Subcommand: `keyhold shell`: interactive register/login prompt.
//!
//! Input is read asynchronously; each request goes through the
//! [`AuthGateway`] so the prompt loop never blocks on the database.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

use crate::form::{Credentials, FormError};
use crate::gateway::{AuthGateway, AuthRequest};
use crate::messages;

/// A parsed shell line.
#[derive(Debug, PartialEq, Eq)]
pub enum ShellCommand {
    Register { identifier: String, secret: String },
    Login { identifier: String, secret: String },
    Help,
    Quit,
    Unknown(String),
}

/// Parse one line of input.
///
/// Runs of spaces before the identifier are skipped. The secret is the exact
/// text after the single space that ends the identifier, so it may itself
/// contain spaces.
pub fn parse_line(line: &str) -> Option<ShellCommand> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }

    let line = line.trim_start();
    let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim_start_matches(' ');
    let (identifier, secret) = rest.split_once(' ').unwrap_or((rest, ""));
    let identifier = identifier.to_string();
    let secret = secret.to_string();

    let command = match verb {
        "register" => ShellCommand::Register { identifier, secret },
        "login" => ShellCommand::Login { identifier, secret },
        "help" | "?" => ShellCommand::Help,
        "quit" | "exit" => ShellCommand::Quit,
        other => ShellCommand::Unknown(other.to_string()),
    };
    Some(command)
}

/// Turn a parsed command into a gateway request.
fn to_request(command: ShellCommand) -> Option<Result<AuthRequest, FormError>> {
    match command {
        ShellCommand::Register { identifier, secret } => {
            Some(Credentials::new(identifier, secret).map(AuthRequest::Register))
        }
        ShellCommand::Login { identifier, secret } => {
            Some(Credentials::new(identifier, secret).map(AuthRequest::Login))
        }
        _ => None,
    }
}

const HELP: &str = "\
  register <email> <password>   create an account
  login <email> <password>      check credentials
  help                          show this help
  quit                          leave the shell";

/// Run the prompt loop until `quit` or end of input.
pub async fn run(gateway: &mut AuthGateway) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let banner = format!(
        "  keyhold v{}\n  Type 'help' for commands.\n\n",
        env!("CARGO_PKG_VERSION")
    );
    stdout.write_all(banner.as_bytes()).await?;

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await.context("failed to read input")? else {
            break;
        };
        let Some(command) = parse_line(&line) else {
            continue;
        };

        let reply = match command {
            ShellCommand::Quit => {
                info!("user requested exit");
                break;
            }
            ShellCommand::Help => HELP.to_string(),
            ShellCommand::Unknown(verb) => format!("  Unknown command '{verb}'. Type 'help'."),
            command => match to_request(command) {
                Some(Ok(request)) => {
                    gateway.submit(request);
                    match gateway.next().await {
                        Some(event) => format!("  {}", messages::outcome_message(&event.outcome)),
                        None => format!("  {}", messages::STORAGE_UNAVAILABLE),
                    }
                }
                Some(Err(e)) => format!("  {}", messages::form_message(e)),
                None => continue,
            },
        };

        stdout.write_all(reply.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_register_and_login() {
        assert_eq!(
            parse_line("register a@x.com p"),
            Some(ShellCommand::Register {
                identifier: "a@x.com".into(),
                secret: "p".into()
            })
        );
        assert_eq!(
            parse_line("login a@x.com p\n"),
            Some(ShellCommand::Login {
                identifier: "a@x.com".into(),
                secret: "p".into()
            })
        );
    }

    #[test]
    fn secret_keeps_inner_and_trailing_spaces() {
        assert_eq!(
            parse_line("login a@x.com correct horse "),
            Some(ShellCommand::Login {
                identifier: "a@x.com".into(),
                secret: "correct horse ".into()
            })
        );
    }

    #[test]
    fn extra_spaces_before_identifier_are_skipped() {
        assert_eq!(
            parse_line("login  a@x.com p"),
            Some(ShellCommand::Login {
                identifier: "a@x.com".into(),
                secret: "p".into()
            })
        );
        assert_eq!(
            parse_line("  register \t"),
            Some(ShellCommand::Register {
                identifier: "\t".into(),
                secret: String::new()
            })
        );
    }

    #[test]
    fn secret_is_exact_text_after_identifier() {
        assert_eq!(
            parse_line("login a@x.com  lead"),
            Some(ShellCommand::Login {
                identifier: "a@x.com".into(),
                secret: " lead".into()
            })
        );
    }

    #[test]
    fn missing_fields_parse_as_empty() {
        let command = parse_line("register a@x.com").unwrap();
        assert_eq!(
            to_request(command).unwrap().unwrap_err(),
            FormError::EmptySecret
        );

        let command = parse_line("login").unwrap();
        assert_eq!(
            to_request(command).unwrap().unwrap_err(),
            FormError::EmptyIdentifier
        );
    }

    #[test]
    fn blank_lines_are_skipped() {
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("   \r\n"), None);
    }

    #[test]
    fn control_words() {
        assert_eq!(parse_line("quit"), Some(ShellCommand::Quit));
        assert_eq!(parse_line("exit"), Some(ShellCommand::Quit));
        assert_eq!(parse_line("?"), Some(ShellCommand::Help));
        assert_eq!(
            parse_line("delete a@x.com"),
            Some(ShellCommand::Unknown("delete".into()))
        );
    }

    #[test]
    fn non_request_commands_map_to_nothing() {
        assert!(to_request(ShellCommand::Help).is_none());
        assert!(to_request(ShellCommand::Quit).is_none());
    }
}
