use crate::rest::{Rest, TransactionReceipt};
use crate::CliError;
use ballotbox::{encrypt_vote, normalize_address, VoteIntent, VoteSubmission};

/// Encrypt a vote locally and submit only the ciphertext
pub fn command_vote(matches: &clap::ArgMatches, uri: &str) -> Result<(), CliError> {
    let poll_id = crate::id_arg(matches, "POLL-ID")?;
    let contestant_id = crate::id_arg(matches, "CONTESTANT-ID")?;
    let voter = normalize_address(crate::required(matches, "voter")?);

    let rest = Rest::new(uri);
    let key = rest.public_key(matches.value_of("label"))?;
    log::info!("encrypting for key \"{}\"", key.label);

    let intent = VoteIntent {
        poll_id,
        contestant_id,
        voter: voter.clone(),
    };
    let payload = encrypt_vote(&intent, &key.public_key_pem)?;

    if matches.is_present("dry-run") {
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    let submitted = rest.submit_vote(&VoteSubmission::new(
        poll_id,
        contestant_id,
        &voter,
        payload,
    ))?;
    println!("{} (id {})", submitted.message, submitted.id);

    Ok(())
}

/// Record the on-chain transaction that accompanied a vote
pub fn command_transaction(matches: &clap::ArgMatches, uri: &str) -> Result<(), CliError> {
    let receipt = TransactionReceipt {
        poll_id: crate::id_arg(matches, "POLL-ID")?,
        transaction_hash: crate::required(matches, "TX-HASH")?.to_owned(),
        voter_address: crate::required(matches, "voter")?.to_owned(),
        from_address: matches.value_of("from").map(str::to_owned),
        to_address: matches.value_of("to").map(str::to_owned),
    };

    let message = Rest::new(uri).store_transaction(&receipt)?;
    println!("{}", message);

    Ok(())
}

pub fn command_transactions(matches: &clap::ArgMatches, uri: &str) -> Result<(), CliError> {
    let poll_id = crate::id_arg(matches, "POLL-ID")?;
    let transactions = Rest::new(uri).transactions(poll_id, matches.value_of("voter"))?;

    for tx in transactions {
        let when = tx.transaction_timestamp.unwrap_or(tx.created_at);
        println!(
            "{}\t{}\t{}",
            when.to_rfc3339(),
            tx.voter_address,
            tx.transaction_hash
        );
    }

    Ok(())
}
