use crate::*;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Key pair awaiting activation
#[derive(Debug, Clone)]
pub struct NewKeyPair {
    pub label: String,
    pub public_key_pem: String,
    pub sealed: SealedPrivateKey,
}

/// Stored election key pair, private half sealed under the wrapping key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPairRecord {
    pub id: i64,
    pub label: String,
    pub public_key_pem: String,
    pub private_key_ciphertext: Vec<u8>,
    pub iv: Vec<u8>,
    pub auth_tag: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

impl KeyPairRecord {
    pub fn sealed_private_key(&self) -> SealedPrivateKey {
        SealedPrivateKey {
            ciphertext: self.private_key_ciphertext.clone(),
            iv: self.iv.clone(),
            tag: self.auth_tag.clone(),
        }
    }
}

/// Encrypted vote awaiting append
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEncryptedVote {
    pub poll_id: i64,
    pub contestant_id: i64,
    pub voter_address: String,
    pub ciphertext_b64: String,
    pub iv_b64: String,
    pub wrapped_key_b64: String,
}

/// A row of the encrypted vote ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedVote {
    pub id: i64,
    pub poll_id: i64,
    pub contestant_id: i64,
    pub voter_address: String,
    pub ciphertext_b64: String,
    pub iv_b64: String,
    pub wrapped_key_b64: String,
    pub created_at: DateTime<Utc>,
}

impl EncryptedVote {
    pub fn payload(&self) -> EncryptedVotePayload {
        EncryptedVotePayload {
            ciphertext: self.ciphertext_b64.clone(),
            iv: self.iv_b64.clone(),
            wrapped_key: self.wrapped_key_b64.clone(),
        }
    }
}

/// On-chain transaction receipt awaiting storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVoteTransaction {
    pub poll_id: i64,
    pub voter_address: String,
    pub transaction_hash: String,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub transaction_timestamp: Option<DateTime<Utc>>,
}

/// The on-chain transaction that accompanied a vote cast
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VoteTransaction {
    pub id: i64,
    pub poll_id: i64,
    pub voter_address: String,
    pub transaction_hash: String,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub transaction_timestamp: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Custodial storage for election key pairs
pub trait KeyStore {
    /// Deactivate every active key pair for the label and insert this one as
    /// the active one, atomically.
    fn activate_key_pair(
        &self,
        key_pair: NewKeyPair,
    ) -> impl Future<Output = Result<KeyPairRecord, Error>> + Send;

    /// The active key pair for a label, if any
    fn active_key_pair(
        &self,
        label: &str,
    ) -> impl Future<Output = Result<Option<KeyPairRecord>, Error>> + Send;

    /// Every key pair ever stored for a label, newest first
    fn key_pairs(
        &self,
        label: &str,
    ) -> impl Future<Output = Result<Vec<KeyPairRecord>, Error>> + Send;
}

/// Append-only storage for encrypted votes
pub trait VoteStore {
    fn append_vote(
        &self,
        vote: NewEncryptedVote,
    ) -> impl Future<Output = Result<EncryptedVote, Error>> + Send;

    /// All votes for a poll, oldest first
    fn votes_for_poll(
        &self,
        poll_id: i64,
    ) -> impl Future<Output = Result<Vec<EncryptedVote>, Error>> + Send;

    /// Insert a receipt, or refresh the optional fields of an existing one
    /// with the same poll, voter and transaction hash.
    fn record_transaction(
        &self,
        receipt: NewVoteTransaction,
    ) -> impl Future<Output = Result<VoteTransaction, Error>> + Send;

    /// Receipts for a poll, newest first
    fn transactions_for_poll(
        &self,
        poll_id: i64,
        voter_address: Option<&str>,
    ) -> impl Future<Output = Result<Vec<VoteTransaction>, Error>> + Send;
}

/// A simple store that keeps everything in memory
#[derive(Default)]
pub struct MemStore {
    inner: Mutex<MemStoreInner>,
}

#[derive(Default)]
struct MemStoreInner {
    keys: BTreeMap<i64, KeyPairRecord>,
    votes: BTreeMap<i64, EncryptedVote>,
    transactions: BTreeMap<i64, VoteTransaction>,
    next_id: i64,
}

impl MemStoreInner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

impl MemStore {
    fn lock(&self) -> MutexGuard<'_, MemStoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of votes held, across all polls
    #[cfg(test)]
    pub(crate) fn vote_count(&self) -> usize {
        self.lock().votes.len()
    }

}

impl KeyStore for MemStore {
    async fn activate_key_pair(&self, key_pair: NewKeyPair) -> Result<KeyPairRecord, Error> {
        let mut inner = self.lock();

        for record in inner.keys.values_mut() {
            if record.label == key_pair.label {
                record.is_active = false;
            }
        }

        let record = KeyPairRecord {
            id: inner.next_id(),
            label: key_pair.label,
            public_key_pem: key_pair.public_key_pem,
            private_key_ciphertext: key_pair.sealed.ciphertext,
            iv: key_pair.sealed.iv,
            auth_tag: key_pair.sealed.tag,
            created_at: Utc::now(),
            is_active: true,
        };
        inner.keys.insert(record.id, record.clone());

        Ok(record)
    }

    async fn active_key_pair(&self, label: &str) -> Result<Option<KeyPairRecord>, Error> {
        Ok(self
            .lock()
            .keys
            .values()
            .rev()
            .find(|record| record.label == label && record.is_active)
            .cloned())
    }

    async fn key_pairs(&self, label: &str) -> Result<Vec<KeyPairRecord>, Error> {
        Ok(self
            .lock()
            .keys
            .values()
            .rev()
            .filter(|record| record.label == label)
            .cloned()
            .collect())
    }
}

impl VoteStore for MemStore {
    async fn append_vote(&self, vote: NewEncryptedVote) -> Result<EncryptedVote, Error> {
        let mut inner = self.lock();
        let record = EncryptedVote {
            id: inner.next_id(),
            poll_id: vote.poll_id,
            contestant_id: vote.contestant_id,
            voter_address: vote.voter_address,
            ciphertext_b64: vote.ciphertext_b64,
            iv_b64: vote.iv_b64,
            wrapped_key_b64: vote.wrapped_key_b64,
            created_at: Utc::now(),
        };
        inner.votes.insert(record.id, record.clone());

        Ok(record)
    }

    async fn votes_for_poll(&self, poll_id: i64) -> Result<Vec<EncryptedVote>, Error> {
        let mut votes: Vec<EncryptedVote> = self
            .lock()
            .votes
            .values()
            .filter(|vote| vote.poll_id == poll_id)
            .cloned()
            .collect();
        votes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        Ok(votes)
    }

    async fn record_transaction(
        &self,
        receipt: NewVoteTransaction,
    ) -> Result<VoteTransaction, Error> {
        let mut inner = self.lock();

        let existing = inner.transactions.values_mut().find(|tx| {
            tx.poll_id == receipt.poll_id
                && tx.voter_address == receipt.voter_address
                && tx.transaction_hash == receipt.transaction_hash
        });
        if let Some(tx) = existing {
            tx.from_address = receipt.from_address;
            tx.to_address = receipt.to_address;
            tx.transaction_timestamp = receipt.transaction_timestamp;
            return Ok(tx.clone());
        }

        let tx = VoteTransaction {
            id: inner.next_id(),
            poll_id: receipt.poll_id,
            voter_address: receipt.voter_address,
            transaction_hash: receipt.transaction_hash,
            from_address: receipt.from_address,
            to_address: receipt.to_address,
            transaction_timestamp: receipt.transaction_timestamp,
            created_at: Utc::now(),
        };
        inner.transactions.insert(tx.id, tx.clone());

        Ok(tx)
    }

    async fn transactions_for_poll(
        &self,
        poll_id: i64,
        voter_address: Option<&str>,
    ) -> Result<Vec<VoteTransaction>, Error> {
        let mut txs: Vec<VoteTransaction> = self
            .lock()
            .transactions
            .values()
            .filter(|tx| tx.poll_id == poll_id)
            .filter(|tx| voter_address.map_or(true, |voter| tx.voter_address == voter))
            .cloned()
            .collect();
        txs.sort_by(|a, b| {
            let a_time = a.transaction_timestamp.unwrap_or(a.created_at);
            let b_time = b.transaction_timestamp.unwrap_or(b.created_at);
            b_time.cmp(&a_time).then(b.id.cmp(&a.id))
        });

        Ok(txs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sealed() -> SealedPrivateKey {
        SealedPrivateKey {
            ciphertext: vec![1, 2, 3],
            iv: vec![0; IV_LEN],
            tag: vec![0; TAG_LEN],
        }
    }

    fn new_vote(poll_id: i64) -> NewEncryptedVote {
        NewEncryptedVote {
            poll_id,
            contestant_id: 1,
            voter_address: "0xabc".to_owned(),
            ciphertext_b64: "Y3Q=".to_owned(),
            iv_b64: "aXY=".to_owned(),
            wrapped_key_b64: "d2s=".to_owned(),
        }
    }

    #[tokio::test]
    async fn test_activation_is_per_label() {
        let store = MemStore::default();
        for label in &["a", "b", "a"] {
            store
                .activate_key_pair(NewKeyPair {
                    label: label.to_string(),
                    public_key_pem: format!("pem-{}", label),
                    sealed: sealed(),
                })
                .await
                .unwrap();
        }

        let a = store.key_pairs("a").await.unwrap();
        assert_eq!(a.len(), 2);
        assert!(a[0].is_active);
        assert!(!a[1].is_active);

        let b = store.active_key_pair("b").await.unwrap().unwrap();
        assert!(b.is_active);
        assert!(store.active_key_pair("c").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_votes_are_scoped_to_poll() {
        let store = MemStore::default();
        store.append_vote(new_vote(1)).await.unwrap();
        store.append_vote(new_vote(2)).await.unwrap();
        store.append_vote(new_vote(1)).await.unwrap();

        let votes = store.votes_for_poll(1).await.unwrap();
        assert_eq!(votes.len(), 2);
        assert!(votes[0].id < votes[1].id);
        assert_eq!(store.vote_count(), 3);
    }

    #[tokio::test]
    async fn test_transaction_upsert() {
        let store = MemStore::default();
        let receipt = NewVoteTransaction {
            poll_id: 1,
            voter_address: "0xabc".to_owned(),
            transaction_hash: "0xhash".to_owned(),
            from_address: None,
            to_address: None,
            transaction_timestamp: None,
        };
        let first = store.record_transaction(receipt.clone()).await.unwrap();

        let mut updated = receipt.clone();
        updated.to_address = Some("0xcontract".to_owned());
        let second = store.record_transaction(updated).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.to_address.as_deref(), Some("0xcontract"));
        assert_eq!(store.transactions_for_poll(1, None).await.unwrap().len(), 1);
        assert!(store
            .transactions_for_poll(1, Some("0xdef"))
            .await
            .unwrap()
            .is_empty());
    }
}
