use crate::*;
use chrono::{DateTime, Utc};

/// Payload fields of a vote submission
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct PayloadSubmission {
    pub ciphertext: Option<String>,
    pub iv: Option<String>,
    pub wrapped_key: Option<String>,
}

/// A vote submission as received from a client
///
/// Everything is optional so that absent fields surface as validation errors
/// rather than as deserialization failures.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct VoteSubmission {
    pub poll_id: Option<i64>,
    pub contestant_id: Option<i64>,
    pub voter_address: Option<String>,
    pub payload: Option<PayloadSubmission>,
}

impl VoteSubmission {
    pub fn new(
        poll_id: i64,
        contestant_id: i64,
        voter_address: &str,
        payload: EncryptedVotePayload,
    ) -> Self {
        VoteSubmission {
            poll_id: Some(poll_id),
            contestant_id: Some(contestant_id),
            voter_address: Some(voter_address.to_owned()),
            payload: Some(PayloadSubmission {
                ciphertext: Some(payload.ciphertext),
                iv: Some(payload.iv),
                wrapped_key: Some(payload.wrapped_key),
            }),
        }
    }

    /// Check presence of every required field and normalize the voter address
    pub fn validate(self) -> Result<NewEncryptedVote, ValidationError> {
        let poll_id = required_id("pollId", self.poll_id)?;
        let contestant_id = required_id("contestantId", self.contestant_id)?;
        let voter_address =
            non_blank(self.voter_address).ok_or(ValidationError::MissingField("voterAddress"))?;
        let payload = self.payload.ok_or(ValidationError::MissingField("payload"))?;

        let (ciphertext, iv, wrapped_key) = match (
            non_blank(payload.ciphertext),
            non_blank(payload.iv),
            non_blank(payload.wrapped_key),
        ) {
            (Some(ciphertext), Some(iv), Some(wrapped_key)) => (ciphertext, iv, wrapped_key),
            _ => return Err(ValidationError::IncompletePayload),
        };

        Ok(NewEncryptedVote {
            poll_id,
            contestant_id,
            voter_address: normalize_address(&voter_address),
            ciphertext_b64: ciphertext,
            iv_b64: iv,
            wrapped_key_b64: wrapped_key,
        })
    }
}

/// On-chain transaction details reported by a client after casting
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSubmission {
    pub poll_id: Option<i64>,
    pub voter_address: Option<String>,
    pub transaction_hash: Option<String>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl TransactionSubmission {
    pub fn validate(self) -> Result<NewVoteTransaction, ValidationError> {
        let poll_id = required_id("pollId", self.poll_id)?;
        let voter_address =
            non_blank(self.voter_address).ok_or(ValidationError::MissingField("voterAddress"))?;
        let transaction_hash = non_blank(self.transaction_hash)
            .ok_or(ValidationError::MissingField("transactionHash"))?;

        Ok(NewVoteTransaction {
            poll_id,
            voter_address: normalize_address(&voter_address),
            transaction_hash: transaction_hash.trim().to_owned(),
            from_address: non_blank(self.from_address).map(|a| normalize_address(&a)),
            to_address: non_blank(self.to_address).map(|a| normalize_address(&a)),
            transaction_timestamp: self.timestamp,
        })
    }
}

/// Poll, contestant and record identifiers are positive
pub fn required_id(field: &'static str, id: Option<i64>) -> Result<i64, ValidationError> {
    match id {
        None => Err(ValidationError::MissingField(field)),
        Some(id) if id <= 0 => Err(ValidationError::InvalidIdentifier(field)),
        Some(id) => Ok(id),
    }
}

/// Append-only writer for encrypted votes
///
/// Pure persistence: no decryption, no on-chain check, no deduplication.
pub struct VoteLedger<'a, S> {
    store: &'a S,
}

impl<'a, S: VoteStore> VoteLedger<'a, S> {
    pub fn new(store: &'a S) -> Self {
        VoteLedger { store }
    }

    pub async fn submit(&self, submission: VoteSubmission) -> Result<EncryptedVote, Error> {
        let vote = submission.validate()?;
        self.store.append_vote(vote).await
    }

    pub async fn record_transaction(
        &self,
        submission: TransactionSubmission,
    ) -> Result<VoteTransaction, Error> {
        let receipt = submission.validate()?;
        self.store.record_transaction(receipt).await
    }

    pub async fn transactions(
        &self,
        poll_id: i64,
        voter_address: Option<&str>,
    ) -> Result<Vec<VoteTransaction>, Error> {
        let voter_address = voter_address
            .filter(|a| !a.trim().is_empty())
            .map(normalize_address);
        self.store
            .transactions_for_poll(poll_id, voter_address.as_deref())
            .await
    }
}
