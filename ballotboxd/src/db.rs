use ballotbox::*;
use chrono::{DateTime, Utc};
use rocket::fairing::{self, AdHoc};
use rocket::{Build, Rocket};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{ConnectOptions, FromRow};

pub type Db = SqlitePool;

/// SQLite backed key and vote storage
#[derive(Clone)]
pub struct SqliteStore {
    pool: Db,
}

#[derive(FromRow)]
struct KeyRow {
    id: i64,
    label: String,
    public_key: String,
    private_key_ciphertext: Vec<u8>,
    iv: Vec<u8>,
    auth_tag: Vec<u8>,
    created_at: DateTime<Utc>,
    is_active: bool,
}

impl From<KeyRow> for KeyPairRecord {
    fn from(row: KeyRow) -> Self {
        KeyPairRecord {
            id: row.id,
            label: row.label,
            public_key_pem: row.public_key,
            private_key_ciphertext: row.private_key_ciphertext,
            iv: row.iv,
            auth_tag: row.auth_tag,
            created_at: row.created_at,
            is_active: row.is_active,
        }
    }
}

#[derive(FromRow)]
struct VoteRow {
    id: i64,
    poll_id: i64,
    contestant_id: i64,
    voter_address: String,
    ciphertext_base64: String,
    iv_base64: String,
    wrapped_key_base64: String,
    created_at: DateTime<Utc>,
}

impl From<VoteRow> for EncryptedVote {
    fn from(row: VoteRow) -> Self {
        EncryptedVote {
            id: row.id,
            poll_id: row.poll_id,
            contestant_id: row.contestant_id,
            voter_address: row.voter_address,
            ciphertext_b64: row.ciphertext_base64,
            iv_b64: row.iv_base64,
            wrapped_key_b64: row.wrapped_key_base64,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct TransactionRow {
    id: i64,
    poll_id: i64,
    voter_address: String,
    transaction_hash: String,
    from_address: Option<String>,
    to_address: Option<String>,
    transaction_timestamp: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<TransactionRow> for VoteTransaction {
    fn from(row: TransactionRow) -> Self {
        VoteTransaction {
            id: row.id,
            poll_id: row.poll_id,
            voter_address: row.voter_address,
            transaction_hash: row.transaction_hash,
            from_address: row.from_address,
            to_address: row.to_address,
            transaction_timestamp: row.transaction_timestamp,
            created_at: row.created_at,
        }
    }
}

const KEY_COLUMNS: &str =
    "id, label, public_key, private_key_ciphertext, iv, auth_tag, created_at, is_active";
const VOTE_COLUMNS: &str = "id, poll_id, contestant_id, voter_address, ciphertext_base64, iv_base64, wrapped_key_base64, created_at";
const TRANSACTION_COLUMNS: &str = "id, poll_id, voter_address, transaction_hash, from_address, to_address, transaction_timestamp, created_at";

impl SqliteStore {
    pub fn new(pool: Db) -> Self {
        SqliteStore { pool }
    }

    /// Open (creating if needed) the database file and run migrations
    pub async fn connect(db_path: &str) -> Result<Self, sqlx::Error> {
        let opts = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new().connect_with(opts).await?;
        Self::migrate(pool).await
    }

    /// A private in-memory database
    ///
    /// Every connection to `:memory:` is its own database, so the pool is
    /// pinned to a single connection that is never recycled.
    pub async fn connect_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::migrate(pool).await
    }

    async fn migrate(pool: Db) -> Result<Self, sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| sqlx::Error::Migrate(Box::new(e)))?;
        Ok(SqliteStore::new(pool))
    }
}

impl KeyStore for SqliteStore {
    async fn activate_key_pair(&self, key_pair: NewKeyPair) -> Result<KeyPairRecord, Error> {
        // Rolled back on drop if anything below fails
        let mut tx = self.pool.begin().await.map_err(Error::storage)?;

        sqlx::query("UPDATE encryption_keys SET is_active = 0 WHERE label = ? AND is_active = 1")
            .bind(&key_pair.label)
            .execute(&mut *tx)
            .await
            .map_err(Error::storage)?;

        let row: KeyRow = sqlx::query_as(&format!(
            "INSERT INTO encryption_keys
                (label, public_key, private_key_ciphertext, iv, auth_tag, created_at, is_active)
             VALUES (?, ?, ?, ?, ?, ?, 1)
             RETURNING {}",
            KEY_COLUMNS
        ))
        .bind(&key_pair.label)
        .bind(&key_pair.public_key_pem)
        .bind(&key_pair.sealed.ciphertext)
        .bind(&key_pair.sealed.iv)
        .bind(&key_pair.sealed.tag)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::storage)?;

        tx.commit().await.map_err(Error::storage)?;

        Ok(row.into())
    }

    async fn active_key_pair(&self, label: &str) -> Result<Option<KeyPairRecord>, Error> {
        let row: Option<KeyRow> = sqlx::query_as(&format!(
            "SELECT {} FROM encryption_keys
             WHERE label = ? AND is_active = 1
             ORDER BY created_at DESC, id DESC
             LIMIT 1",
            KEY_COLUMNS
        ))
        .bind(label)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::storage)?;

        Ok(row.map(KeyPairRecord::from))
    }

    async fn key_pairs(&self, label: &str) -> Result<Vec<KeyPairRecord>, Error> {
        let rows: Vec<KeyRow> = sqlx::query_as(&format!(
            "SELECT {} FROM encryption_keys WHERE label = ? ORDER BY created_at DESC, id DESC",
            KEY_COLUMNS
        ))
        .bind(label)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::storage)?;

        Ok(rows.into_iter().map(KeyPairRecord::from).collect())
    }
}

impl VoteStore for SqliteStore {
    async fn append_vote(&self, vote: NewEncryptedVote) -> Result<EncryptedVote, Error> {
        let row: VoteRow = sqlx::query_as(&format!(
            "INSERT INTO encrypted_votes
                (poll_id, contestant_id, voter_address, ciphertext_base64, iv_base64, wrapped_key_base64, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING {}",
            VOTE_COLUMNS
        ))
        .bind(vote.poll_id)
        .bind(vote.contestant_id)
        .bind(&vote.voter_address)
        .bind(&vote.ciphertext_b64)
        .bind(&vote.iv_b64)
        .bind(&vote.wrapped_key_b64)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::storage)?;

        Ok(row.into())
    }

    async fn votes_for_poll(&self, poll_id: i64) -> Result<Vec<EncryptedVote>, Error> {
        let rows: Vec<VoteRow> = sqlx::query_as(&format!(
            "SELECT {} FROM encrypted_votes WHERE poll_id = ? ORDER BY created_at ASC, id ASC",
            VOTE_COLUMNS
        ))
        .bind(poll_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::storage)?;

        Ok(rows.into_iter().map(EncryptedVote::from).collect())
    }

    async fn record_transaction(
        &self,
        receipt: NewVoteTransaction,
    ) -> Result<VoteTransaction, Error> {
        let row: TransactionRow = sqlx::query_as(&format!(
            "INSERT INTO vote_transactions
                (poll_id, voter_address, transaction_hash, from_address, to_address, transaction_timestamp, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (poll_id, voter_address, transaction_hash) DO UPDATE SET
                from_address = excluded.from_address,
                to_address = excluded.to_address,
                transaction_timestamp = excluded.transaction_timestamp
             RETURNING {}",
            TRANSACTION_COLUMNS
        ))
        .bind(receipt.poll_id)
        .bind(&receipt.voter_address)
        .bind(&receipt.transaction_hash)
        .bind(&receipt.from_address)
        .bind(&receipt.to_address)
        .bind(receipt.transaction_timestamp)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::storage)?;

        Ok(row.into())
    }

    async fn transactions_for_poll(
        &self,
        poll_id: i64,
        voter_address: Option<&str>,
    ) -> Result<Vec<VoteTransaction>, Error> {
        let rows: Vec<TransactionRow> = match voter_address {
            Some(voter_address) => sqlx::query_as(&format!(
                "SELECT {} FROM vote_transactions
                 WHERE poll_id = ? AND voter_address = ?
                 ORDER BY COALESCE(transaction_timestamp, created_at) DESC, id DESC",
                TRANSACTION_COLUMNS
            ))
            .bind(poll_id)
            .bind(voter_address)
            .fetch_all(&self.pool)
            .await,
            None => sqlx::query_as(&format!(
                "SELECT {} FROM vote_transactions
                 WHERE poll_id = ?
                 ORDER BY COALESCE(transaction_timestamp, created_at) DESC, id DESC",
                TRANSACTION_COLUMNS
            ))
            .bind(poll_id)
            .fetch_all(&self.pool)
            .await,
        }
        .map_err(Error::storage)?;

        Ok(rows.into_iter().map(VoteTransaction::from).collect())
    }
}

async fn init_db(rocket: Rocket<Build>, db_path: String) -> fairing::Result {
    let store = match SqliteStore::connect(&db_path).await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to initialize SQLx database at {}: {}", db_path, e);
            return Err(rocket);
        }
    };

    info!("Using SQLite database at {}", db_path);
    Ok(rocket.manage(store))
}

pub fn stage(db_path: String) -> AdHoc {
    AdHoc::on_ignite("SQLx Stage", move |rocket| async move {
        rocket.attach(AdHoc::try_on_ignite("SQLx Database", move |rocket| {
            init_db(rocket, db_path)
        }))
    })
}
