use crate::CliError;
use ballotbox::{KeyPairSummary, TallyReport, VoteSubmission, VoteTransaction};
use reqwest::blocking::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PublicKey {
    pub label: String,
    pub public_key_pem: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct KeyHistory {
    pub label: String,
    pub keys: Vec<KeyPairSummary>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SubmittedVote {
    pub id: i64,
    pub message: String,
}

#[derive(Deserialize, Debug, Clone)]
struct Transactions {
    transactions: Vec<VoteTransaction>,
}

#[derive(Deserialize, Debug)]
struct Message {
    message: String,
}

#[derive(Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub poll_id: i64,
    pub voter_address: String,
    pub transaction_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_address: Option<String>,
}

/// Blocking client for a ballotbox daemon
pub struct Rest {
    base_uri: String,
    client: Client,
}

impl Rest {
    pub fn new(base_uri: &str) -> Self {
        Rest {
            base_uri: base_uri.trim_end_matches('/').to_owned(),
            client: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_uri, path)
    }

    pub fn public_key(&self, label: Option<&str>) -> Result<PublicKey, CliError> {
        let request = self.client.get(self.url("/keys/public-key"));
        send(with_label(request, label))
    }

    pub fn key_history(&self, label: Option<&str>) -> Result<KeyHistory, CliError> {
        let request = self.client.get(self.url("/keys/history"));
        send(with_label(request, label))
    }

    /// Returns the new public key
    pub fn generate_keys(&self, admin: &str, label: Option<&str>) -> Result<PublicKey, CliError> {
        let body = json!({ "adminAddress": admin, "label": label });
        send(self.client.post(self.url("/keys/generate")).json(&body))
    }

    pub fn submit_vote(&self, submission: &VoteSubmission) -> Result<SubmittedVote, CliError> {
        send(self.client.post(self.url("/votes/submit")).json(submission))
    }

    pub fn store_transaction(&self, receipt: &TransactionReceipt) -> Result<String, CliError> {
        let message: Message =
            send(self.client.post(self.url("/votes/transaction")).json(receipt))?;
        Ok(message.message)
    }

    pub fn transactions(
        &self,
        poll_id: i64,
        voter: Option<&str>,
    ) -> Result<Vec<VoteTransaction>, CliError> {
        let mut request = self
            .client
            .get(self.url("/votes/transactions"))
            .query(&[("pollId", poll_id.to_string())]);
        if let Some(voter) = voter {
            request = request.query(&[("voterAddress", voter)]);
        }
        let transactions: Transactions = send(request)?;
        Ok(transactions.transactions)
    }

    /// Returns the report together with the server's summary message
    pub fn tally(
        &self,
        poll_id: i64,
        admin: &str,
        label: Option<&str>,
    ) -> Result<(TallyReport, String), CliError> {
        let body = json!({ "pollId": poll_id, "adminAddress": admin, "label": label });
        let value: Value = send(self.client.post(self.url("/tally")).json(&body))?;

        let message = value["message"].as_str().unwrap_or_default().to_owned();
        let report = serde_json::from_value(value)?;
        Ok((report, message))
    }
}

fn with_label(request: RequestBuilder, label: Option<&str>) -> RequestBuilder {
    match label {
        Some(label) => request.query(&[("label", label)]),
        None => request,
    }
}

fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, CliError> {
    let response = request.send()?;
    let status = response.status();
    let body = response.text()?;
    log::debug!("{} {}", status, body);

    if !status.is_success() {
        return Err(CliError::Server {
            status: status.as_u16(),
            message: error_message(&body),
        });
    }
    Ok(serde_json::from_str(&body)?)
}

/// Pull `message` out of an error body, falling back to the raw text
fn error_message(body: &str) -> String {
    serde_json::from_str::<Message>(body)
        .map(|m| m.message)
        .unwrap_or_else(|_| body.trim().to_owned())
}
