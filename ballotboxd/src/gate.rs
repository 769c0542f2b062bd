use crate::config::AdminSource;
use ballotbox::{AuthorizationGate, LedgerError, StaticAdmins};
use serde_json::{json, Value};

/// `bytes4(keccak256("isAdmin(address)"))`
const IS_ADMIN_SELECTOR: &str = "24d7806c";

/// Reads the admin role from the voting contract over JSON-RPC
#[derive(Debug, Clone)]
pub struct EthereumAdminGate {
    client: reqwest::Client,
    rpc_url: String,
    contract: String,
}

impl EthereumAdminGate {
    pub fn new(rpc_url: String, contract: String) -> Self {
        EthereumAdminGate {
            client: reqwest::Client::new(),
            rpc_url,
            contract,
        }
    }

    async fn eth_call(&self, data: String) -> Result<String, LedgerError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [{ "to": self.contract, "data": data }, "latest"],
        });

        let response: Value = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| LedgerError::Transport(Box::new(e)))?
            .json()
            .await
            .map_err(|e| LedgerError::Transport(Box::new(e)))?;

        if let Some(error) = response.get("error") {
            return Err(LedgerError::Rpc {
                code: error["code"].as_i64().unwrap_or_default(),
                message: error["message"].as_str().unwrap_or_default().to_owned(),
            });
        }

        response["result"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| LedgerError::MalformedResult(response.to_string()))
    }
}

impl AuthorizationGate for EthereumAdminGate {
    async fn is_admin(&self, address: &str) -> Result<bool, LedgerError> {
        let data = match encode_is_admin(address) {
            Some(data) => data,
            // Not an account address, so it cannot hold the role
            None => return Ok(false),
        };

        let result = self.eth_call(data).await?;
        decode_bool(&result)
    }
}

/// ABI encode `isAdmin(address)` call data
fn encode_is_admin(address: &str) -> Option<String> {
    let hex_address = address.trim().strip_prefix("0x")?;
    if hex_address.len() != 40 || hex::decode(hex_address).is_err() {
        return None;
    }
    Some(format!(
        "0x{}{:0>64}",
        IS_ADMIN_SELECTOR,
        hex_address.to_lowercase()
    ))
}

/// Decode an ABI encoded `bool` return word
fn decode_bool(result: &str) -> Result<bool, LedgerError> {
    let word = result
        .strip_prefix("0x")
        .and_then(|h| hex::decode(h).ok())
        .filter(|bytes| bytes.len() == 32)
        .ok_or_else(|| LedgerError::MalformedResult(result.to_owned()))?;

    Ok(word.iter().any(|b| *b != 0))
}

/// The admin gate chosen by configuration
#[derive(Debug, Clone)]
pub enum AdminGate {
    Static(StaticAdmins),
    Ethereum(EthereumAdminGate),
}

impl From<AdminSource> for AdminGate {
    fn from(source: AdminSource) -> Self {
        match source {
            AdminSource::Static(admins) => AdminGate::Static(admins),
            AdminSource::Ledger { rpc_url, contract } => {
                AdminGate::Ethereum(EthereumAdminGate::new(rpc_url, contract))
            }
        }
    }
}

impl AuthorizationGate for AdminGate {
    async fn is_admin(&self, address: &str) -> Result<bool, LedgerError> {
        match self {
            AdminGate::Static(admins) => admins.is_admin(address).await,
            AdminGate::Ethereum(gate) => gate.is_admin(address).await,
        }
    }
}
