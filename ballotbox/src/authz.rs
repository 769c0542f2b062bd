use crate::*;
use std::collections::HashSet;
use std::future::Future;

/// Answers whether an address holds the admin role
pub trait AuthorizationGate {
    fn is_admin(&self, address: &str) -> impl Future<Output = Result<bool, LedgerError>> + Send;
}

/// Check the requester against the gate, returning the normalized address
pub async fn authorize<G: AuthorizationGate>(
    gate: &G,
    address: Option<&str>,
) -> Result<String, AuthorizationError> {
    let address = match address.map(normalize_address) {
        Some(address) if !address.is_empty() => address,
        _ => return Err(AuthorizationError::MissingAddress),
    };

    match gate.is_admin(&address).await {
        Ok(true) => Ok(address),
        Ok(false) => {
            log::warn!("rejected non-admin address {}", address);
            Err(AuthorizationError::Unauthorized(address))
        }
        Err(e) => {
            log::error!("admin check for {} failed: {}", address, e);
            Err(AuthorizationError::CheckFailed(e))
        }
    }
}

/// A fixed allow-list of admin addresses
#[derive(Debug, Clone, Default)]
pub struct StaticAdmins {
    admins: HashSet<String>,
}

impl StaticAdmins {
    pub fn new<I, A>(admins: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<str>,
    {
        StaticAdmins {
            admins: admins
                .into_iter()
                .map(|a| normalize_address(a.as_ref()))
                .filter(|a| !a.is_empty())
                .collect(),
        }
    }

    /// Parse a comma separated list
    pub fn from_list(list: &str) -> Self {
        StaticAdmins::new(list.split(','))
    }

    pub fn is_empty(&self) -> bool {
        self.admins.is_empty()
    }
}

impl AuthorizationGate for StaticAdmins {
    async fn is_admin(&self, address: &str) -> Result<bool, LedgerError> {
        Ok(self.admins.contains(&normalize_address(address)))
    }
}
