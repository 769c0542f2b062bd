use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use log::LevelFilter;

mod command_keys;
mod command_tally;
mod command_vote;
mod error;
mod rest;

use command_keys::*;
use command_tally::*;
use command_vote::*;
pub use error::CliError;

const DEFAULT_URI: &str = "http://localhost:8000";

#[derive(PartialEq, Copy, Clone, Debug)]
enum Verbosity {
    Warn,
    Info,
    Debug,
}

impl From<Verbosity> for LevelFilter {
    fn from(verbosity: Verbosity) -> Self {
        match verbosity {
            Verbosity::Warn => LevelFilter::Warn,
            Verbosity::Info => LevelFilter::Info,
            Verbosity::Debug => LevelFilter::Debug,
        }
    }
}

fn label_arg() -> Arg<'static, 'static> {
    Arg::with_name("label")
        .long("label")
        .takes_value(true)
        .help("Election key label, defaults to the server's default label")
}

fn app() -> App<'static, 'static> {
    App::new("Ballotbox CLI")
        .version("0.1.0")
        .about("Casts encrypted votes and drives a ballotbox server")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("uri")
                .help("Set the ballotbox uri - can also be set with BALLOTBOX_URI")
                .long("uri")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .help("Sets the level of verbosity"),
        )
        .subcommand(
            SubCommand::with_name("keys")
                .about("Manage election keys")
                .setting(AppSettings::SubcommandRequiredElseHelp)
                .subcommand(
                    SubCommand::with_name("generate")
                        .about("Generate and activate a new election key pair")
                        .arg(
                            Arg::with_name("admin")
                                .long("admin")
                                .takes_value(true)
                                .required(true)
                                .help("Admin wallet address"),
                        )
                        .arg(label_arg()),
                )
                .subcommand(
                    SubCommand::with_name("public")
                        .about("Print the active public key")
                        .arg(label_arg()),
                )
                .subcommand(
                    SubCommand::with_name("history")
                        .about("List every key pair stored for a label")
                        .arg(label_arg()),
                ),
        )
        .subcommand(
            SubCommand::with_name("vote")
                .about("Encrypt a vote locally and submit it")
                .arg(
                    Arg::with_name("POLL-ID")
                        .index(1)
                        .required(true)
                        .help("Poll id"),
                )
                .arg(
                    Arg::with_name("CONTESTANT-ID")
                        .index(2)
                        .required(true)
                        .help("Contestant id"),
                )
                .arg(
                    Arg::with_name("voter")
                        .long("voter")
                        .takes_value(true)
                        .required(true)
                        .help("Voter wallet address"),
                )
                .arg(label_arg())
                .arg(
                    Arg::with_name("dry-run")
                        .long("dry-run")
                        .help("Print the encrypted payload instead of submitting it"),
                ),
        )
        .subcommand(
            SubCommand::with_name("transaction")
                .about("Record the on-chain transaction of a vote")
                .arg(Arg::with_name("POLL-ID").index(1).required(true))
                .arg(Arg::with_name("TX-HASH").index(2).required(true))
                .arg(
                    Arg::with_name("voter")
                        .long("voter")
                        .takes_value(true)
                        .required(true),
                )
                .arg(Arg::with_name("from").long("from").takes_value(true))
                .arg(Arg::with_name("to").long("to").takes_value(true)),
        )
        .subcommand(
            SubCommand::with_name("transactions")
                .about("List recorded vote transactions of a poll")
                .arg(Arg::with_name("POLL-ID").index(1).required(true))
                .arg(
                    Arg::with_name("voter")
                        .long("voter")
                        .takes_value(true)
                        .help("Only this voter's transactions"),
                ),
        )
        .subcommand(
            SubCommand::with_name("tally")
                .about("Decrypt and count the votes of a poll (admin only)")
                .arg(Arg::with_name("POLL-ID").index(1).required(true))
                .arg(
                    Arg::with_name("admin")
                        .long("admin")
                        .takes_value(true)
                        .required(true)
                        .help("Admin wallet address"),
                )
                .arg(label_arg())
                .arg(
                    Arg::with_name("json")
                        .long("json")
                        .help("Print the full tally report as JSON"),
                ),
        )
}

fn main() {
    let matches = app().get_matches();

    let verbosity = match matches.occurrences_of("v") {
        0 => Verbosity::Warn,
        1 => Verbosity::Info,
        _ => Verbosity::Debug,
    };
    env_logger::Builder::new()
        .filter_level(verbosity.into())
        .init();

    let env_var = std::env::var("BALLOTBOX_URI");
    let uri = resolve_uri(&matches, env_var.as_deref().ok());
    log::info!("URI: {}", uri);

    let (name, result) = match matches.subcommand() {
        ("keys", Some(matches)) => ("keys", command_keys(matches, uri)),
        ("vote", Some(matches)) => ("vote", command_vote(matches, uri)),
        ("transaction", Some(matches)) => ("transaction", command_transaction(matches, uri)),
        ("transactions", Some(matches)) => ("transactions", command_transactions(matches, uri)),
        ("tally", Some(matches)) => ("tally", command_tally(matches, uri)),
        _ => unreachable!(),
    };

    if let Err(e) = result {
        eprintln!("ballotbox {}: {}", name, e);
        std::process::exit(1);
    }
}

/// `--uri` wins over `BALLOTBOX_URI`
fn resolve_uri<'a>(matches: &'a ArgMatches, env_uri: Option<&'a str>) -> &'a str {
    matches
        .value_of("uri")
        .or(env_uri)
        .unwrap_or(DEFAULT_URI)
}

pub(crate) fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str, CliError> {
    matches
        .value_of(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CliError::InvalidArgument(format!("{} is required", name)))
}

/// Poll and contestant ids are positive integers
pub(crate) fn id_arg(matches: &ArgMatches, name: &str) -> Result<i64, CliError> {
    let value = required(matches, name)?;
    match value.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(CliError::InvalidArgument(format!(
            "{} must be a positive integer, got \"{}\"",
            name, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ArgMatches<'static> {
        app().get_matches_from_safe(args).unwrap()
    }

    #[test]
    fn test_vote_args() {
        let matches = parse(&["ballotbox", "-v", "vote", "1", "3", "--voter", "0xABC"]);
        assert_eq!(matches.occurrences_of("v"), 1);

        let (name, vote) = matches.subcommand();
        assert_eq!(name, "vote");
        let vote = vote.unwrap();
        assert_eq!(id_arg(vote, "POLL-ID").unwrap(), 1);
        assert_eq!(id_arg(vote, "CONTESTANT-ID").unwrap(), 3);
        assert_eq!(required(vote, "voter").unwrap(), "0xABC");
        assert!(!vote.is_present("dry-run"));
    }

    #[test]
    fn test_invalid_ids() {
        let matches = parse(&["ballotbox", "tally", "0", "--admin", "0xabc"]);
        let tally = matches.subcommand_matches("tally").unwrap();
        assert!(matches!(
            id_arg(tally, "POLL-ID"),
            Err(CliError::InvalidArgument(_))
        ));

        let matches = parse(&["ballotbox", "transactions", "abc"]);
        let transactions = matches.subcommand_matches("transactions").unwrap();
        assert!(id_arg(transactions, "POLL-ID").is_err());
    }

    #[test]
    fn test_required_args() {
        assert!(app()
            .get_matches_from_safe(&["ballotbox", "tally", "1"])
            .is_err());
        assert!(app()
            .get_matches_from_safe(&["ballotbox", "keys", "generate"])
            .is_err());
        assert!(app().get_matches_from_safe(&["ballotbox"]).is_err());
    }

    #[test]
    fn test_resolve_uri() {
        let matches = parse(&["ballotbox", "keys", "public"]);
        assert_eq!(resolve_uri(&matches, None), DEFAULT_URI);
        assert_eq!(
            resolve_uri(&matches, Some("http://env:1")),
            "http://env:1"
        );

        let matches = parse(&["ballotbox", "--uri", "http://flag:2", "keys", "public"]);
        assert_eq!(
            resolve_uri(&matches, Some("http://env:1")),
            "http://flag:2"
        );
    }
}
