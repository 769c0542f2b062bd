use crate::rest::Rest;
use crate::CliError;

pub fn command_keys(matches: &clap::ArgMatches, uri: &str) -> Result<(), CliError> {
    let rest = Rest::new(uri);

    match matches.subcommand() {
        ("generate", Some(matches)) => {
            let admin = crate::required(matches, "admin")?;
            let key = rest.generate_keys(admin, matches.value_of("label"))?;
            log::info!("generated key pair for \"{}\"", key.label);
            println!("{}", key.public_key_pem.trim_end());
        }
        ("public", Some(matches)) => {
            let key = rest.public_key(matches.value_of("label"))?;
            println!("{}", key.public_key_pem.trim_end());
        }
        ("history", Some(matches)) => {
            let history = rest.key_history(matches.value_of("label"))?;
            if history.keys.is_empty() {
                println!("no key pairs for \"{}\"", history.label);
            }
            for key in history.keys {
                println!(
                    "{}\t{}\t{}",
                    key.id,
                    key.created_at.to_rfc3339(),
                    if key.is_active { "active" } else { "inactive" }
                );
            }
        }
        _ => {
            return Err(CliError::InvalidArgument(
                "expected one of generate, public, history".to_owned(),
            ))
        }
    }

    Ok(())
}
