use crate::*;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Per-row outcome of a tally run
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DecryptedVote {
    pub id: i64,
    pub contestant_id: i64,
    pub voter_address: String,
    pub vote_data: Option<VoteData>,
    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub decryption_error: Option<String>,
}

impl DecryptedVote {
    pub fn is_success(&self) -> bool {
        self.decryption_error.is_none()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TallyReport {
    pub poll_id: i64,
    pub total_votes: usize,
    pub successful_decryptions: usize,
    pub failed_decryptions: usize,
    pub decrypted_votes: Vec<DecryptedVote>,

    /// contestantId -> number of successfully decrypted votes
    pub tally: BTreeMap<i64, u64>,
}

impl TallyReport {
    pub fn empty(poll_id: i64) -> Self {
        TallyReport {
            poll_id,
            total_votes: 0,
            successful_decryptions: 0,
            failed_decryptions: 0,
            decrypted_votes: vec![],
            tally: BTreeMap::new(),
        }
    }

    /// True when every stored vote was decrypted
    pub fn is_complete(&self) -> bool {
        self.failed_decryptions == 0
    }

    /// Human readable summary for operators
    pub fn message(&self) -> String {
        if self.total_votes == 0 {
            return format!("No votes found for poll {}", self.poll_id);
        }
        if self.is_complete() {
            format!(
                "Tallied {} votes for poll {}",
                self.successful_decryptions, self.poll_id
            )
        } else {
            format!(
                "Tallied {} of {} votes for poll {}; {} could not be decrypted",
                self.successful_decryptions, self.total_votes, self.poll_id, self.failed_decryptions
            )
        }
    }
}

/// Decrypt and count a batch of votes
///
/// A row that fails to decrypt is reported with its error and never counted.
pub fn tally_votes(decryptor: &VoteDecryptor, poll_id: i64, votes: &[EncryptedVote]) -> TallyReport {
    let mut report = TallyReport::empty(poll_id);

    for vote in votes {
        report.total_votes += 1;

        match decryptor.decrypt(&vote.payload()) {
            Ok(vote_data) => {
                let contestant_id = vote_data.contestant_id.unwrap_or(vote.contestant_id);
                *report.tally.entry(contestant_id).or_insert(0) += 1;
                report.successful_decryptions += 1;
                report.decrypted_votes.push(DecryptedVote {
                    id: vote.id,
                    contestant_id,
                    voter_address: vote.voter_address.clone(),
                    vote_data: Some(vote_data),
                    created_at: vote.created_at,
                    decryption_error: None,
                });
            }
            Err(e) => {
                log::warn!(
                    "poll {}: failed to decrypt vote {}: {}",
                    poll_id,
                    vote.id,
                    e
                );
                report.failed_decryptions += 1;
                report.decrypted_votes.push(DecryptedVote {
                    id: vote.id,
                    contestant_id: vote.contestant_id,
                    voter_address: vote.voter_address.clone(),
                    vote_data: None,
                    created_at: vote.created_at,
                    decryption_error: Some(e.to_string()),
                });
            }
        }
    }

    report
}

/// Runs authorized tallies against a store
pub struct TallyEngine<'a, S> {
    store: &'a S,
    secret: &'a WrappingSecret,
}

impl<'a, S: KeyStore + VoteStore> TallyEngine<'a, S> {
    pub fn new(store: &'a S, secret: &'a WrappingSecret) -> Self {
        TallyEngine { store, secret }
    }

    /// Tally a poll with the active key of the label
    ///
    /// Fails outright when no usable key exists, even if the poll has no votes.
    pub async fn run(&self, poll_id: i64, label: &str) -> Result<TallyReport, Error> {
        Ok(self.prepare(poll_id, label).await?.tally())
    }

    /// Load the key and the votes of a poll, leaving the decryption to
    /// [`PreparedTally::tally`]
    pub async fn prepare(&self, poll_id: i64, label: &str) -> Result<PreparedTally, Error> {
        let key_pair = KeyCustodian::new(self.store, self.secret)
            .active_key_pair_for_decryption(label)
            .await?
            .ok_or_else(|| Error::NoActiveKey(label.to_owned()))?;

        let private_key_pem = key_pair
            .private_key_pem
            .ok_or_else(|| Error::NoDecryptionKey(label.to_owned()))?;

        let decryptor = VoteDecryptor::from_pkcs8_pem(&private_key_pem).map_err(|e| {
            log::error!("active private key for \"{}\" is unusable: {}", label, e);
            Error::NoDecryptionKey(label.to_owned())
        })?;

        let votes = self.store.votes_for_poll(poll_id).await?;

        Ok(PreparedTally {
            poll_id,
            decryptor,
            votes,
        })
    }
}

/// A poll's votes together with the key that opens them
///
/// Owns everything it needs so the CPU bound part can run off the async
/// executor.
pub struct PreparedTally {
    poll_id: i64,
    decryptor: VoteDecryptor,
    votes: Vec<EncryptedVote>,
}

impl PreparedTally {
    /// Number of encrypted votes waiting to be opened
    pub fn vote_count(&self) -> usize {
        self.votes.len()
    }

    pub fn tally(self) -> TallyReport {
        if self.votes.is_empty() {
            return TallyReport::empty(self.poll_id);
        }

        let report = tally_votes(&self.decryptor, self.poll_id, &self.votes);
        log::info!(
            "tallied poll {}: {} votes, {} failed",
            self.poll_id,
            report.total_votes,
            report.failed_decryptions
        );
        report
    }
}
