use ballotbox::{StaticAdmins, WrappingSecret, DEFAULT_LABEL};
use std::env::var;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_TALLY_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("BALLOTBOX_KEY_ENCRYPTION_SECRET environment variable must be set")]
    MissingSecret,

    #[error("BALLOTBOX_LEDGER_RPC_URL and BALLOTBOX_LEDGER_CONTRACT must be set together")]
    PartialLedger,

    #[error("invalid ledger contract address: {0}")]
    InvalidContract(String),

    #[error("no admin source configured: set BALLOTBOX_LEDGER_RPC_URL and BALLOTBOX_LEDGER_CONTRACT, or BALLOTBOX_ADMINS")]
    NoAdminSource,

    #[error("BALLOTBOX_TALLY_TIMEOUT_SECS must be a positive number of seconds, got \"{0}\"")]
    InvalidTimeout(String),
}

/// Where admin status comes from
#[derive(Debug, Clone)]
pub enum AdminSource {
    Ledger { rpc_url: String, contract: String },
    Static(StaticAdmins),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub secret: WrappingSecret,
    pub db_path: String,
    pub default_label: String,
    pub admin_source: AdminSource,
    pub tally_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let secret = get("BALLOTBOX_KEY_ENCRYPTION_SECRET")
            .and_then(|s| WrappingSecret::new(s).ok())
            .ok_or(ConfigError::MissingSecret)?;

        let db_path = get("BALLOTBOX_DB_PATH").unwrap_or_else(|| "./ballotbox.db".to_owned());

        let default_label = get("BALLOTBOX_DEFAULT_LABEL")
            .map(|l| l.trim().to_owned())
            .unwrap_or_else(|| DEFAULT_LABEL.to_owned());

        let admin_source = match (
            get("BALLOTBOX_LEDGER_RPC_URL"),
            get("BALLOTBOX_LEDGER_CONTRACT"),
        ) {
            (Some(rpc_url), Some(contract)) => AdminSource::Ledger {
                rpc_url: rpc_url.trim().to_owned(),
                contract: parse_contract(&contract)?,
            },
            (None, None) => {
                let admins = get("BALLOTBOX_ADMINS")
                    .map(|list| StaticAdmins::from_list(&list))
                    .unwrap_or_default();
                if admins.is_empty() {
                    return Err(ConfigError::NoAdminSource);
                }
                AdminSource::Static(admins)
            }
            _ => return Err(ConfigError::PartialLedger),
        };

        let tally_timeout = match get("BALLOTBOX_TALLY_TIMEOUT_SECS") {
            Some(val) => match val.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => return Err(ConfigError::InvalidTimeout(val)),
            },
            None => Duration::from_secs(DEFAULT_TALLY_TIMEOUT_SECS),
        };

        Ok(Config {
            secret,
            db_path,
            default_label,
            admin_source,
            tally_timeout,
        })
    }
}

/// A contract address is 20 bytes of hex with a 0x prefix
fn parse_contract(contract: &str) -> Result<String, ConfigError> {
    let contract = contract.trim().to_lowercase();
    let valid = contract
        .strip_prefix("0x")
        .map_or(false, |h| h.len() == 40 && hex::decode(h).is_ok());
    if !valid {
        return Err(ConfigError::InvalidContract(contract));
    }
    Ok(contract)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const CONTRACT: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[
            ("BALLOTBOX_KEY_ENCRYPTION_SECRET", "s3cret"),
            ("BALLOTBOX_ADMINS", "0xAAA"),
        ])
        .unwrap();
        assert_eq!(config.db_path, "./ballotbox.db");
        assert_eq!(config.default_label, "default_election");
        assert_eq!(config.tally_timeout, Duration::from_secs(60));
        assert!(matches!(config.admin_source, AdminSource::Static(_)));
    }

    #[test]
    fn test_missing_secret_is_fatal() {
        let res = config(&[("BALLOTBOX_ADMINS", "0xaaa")]);
        assert!(matches!(res, Err(ConfigError::MissingSecret)));

        let res = config(&[
            ("BALLOTBOX_KEY_ENCRYPTION_SECRET", "  "),
            ("BALLOTBOX_ADMINS", "0xaaa"),
        ]);
        assert!(matches!(res, Err(ConfigError::MissingSecret)));
    }

    #[test]
    fn test_admin_sources() {
        let res = config(&[("BALLOTBOX_KEY_ENCRYPTION_SECRET", "s")]);
        assert!(matches!(res, Err(ConfigError::NoAdminSource)));

        let res = config(&[
            ("BALLOTBOX_KEY_ENCRYPTION_SECRET", "s"),
            ("BALLOTBOX_LEDGER_RPC_URL", "http://127.0.0.1:8545"),
        ]);
        assert!(matches!(res, Err(ConfigError::PartialLedger)));

        let res = config(&[
            ("BALLOTBOX_KEY_ENCRYPTION_SECRET", "s"),
            ("BALLOTBOX_LEDGER_RPC_URL", "http://127.0.0.1:8545"),
            ("BALLOTBOX_LEDGER_CONTRACT", "0x1234"),
        ]);
        assert!(matches!(res, Err(ConfigError::InvalidContract(_))));

        let config = config(&[
            ("BALLOTBOX_KEY_ENCRYPTION_SECRET", "s"),
            ("BALLOTBOX_LEDGER_RPC_URL", "http://127.0.0.1:8545"),
            ("BALLOTBOX_LEDGER_CONTRACT", CONTRACT),
            ("BALLOTBOX_ADMINS", "0xaaa"),
        ])
        .unwrap();
        match config.admin_source {
            AdminSource::Ledger { contract, .. } => assert_eq!(contract, CONTRACT.to_lowercase()),
            other => panic!("unexpected admin source {:?}", other),
        }
    }

    #[test]
    fn test_tally_timeout() {
        let res = config(&[
            ("BALLOTBOX_KEY_ENCRYPTION_SECRET", "s"),
            ("BALLOTBOX_ADMINS", "0xaaa"),
            ("BALLOTBOX_TALLY_TIMEOUT_SECS", "0"),
        ]);
        assert!(matches!(res, Err(ConfigError::InvalidTimeout(_))));

        let config = config(&[
            ("BALLOTBOX_KEY_ENCRYPTION_SECRET", "s"),
            ("BALLOTBOX_ADMINS", "0xaaa"),
            ("BALLOTBOX_TALLY_TIMEOUT_SECS", "5"),
        ])
        .unwrap();
        assert_eq!(config.tally_timeout, Duration::from_secs(5));
    }
}
