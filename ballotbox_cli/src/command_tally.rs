use crate::rest::Rest;
use crate::CliError;

pub fn command_tally(matches: &clap::ArgMatches, uri: &str) -> Result<(), CliError> {
    let poll_id = crate::id_arg(matches, "POLL-ID")?;
    let admin = crate::required(matches, "admin")?;

    let (report, message) = Rest::new(uri).tally(poll_id, admin, matches.value_of("label"))?;

    if matches.is_present("json") {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", message);
    for (contestant_id, count) in &report.tally {
        println!("contestant {}: {}", contestant_id, count);
    }
    for vote in report.decrypted_votes.iter().filter(|v| !v.is_success()) {
        eprintln!(
            "vote {} from {}: {}",
            vote.id,
            vote.voter_address,
            vote.decryption_error.as_deref().unwrap_or_default()
        );
    }

    Ok(())
}
