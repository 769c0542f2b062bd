use ballotbox::*;
use config::Config;
use db::SqliteStore;
use gate::AdminGate;
use rocket::http::Status;
use rocket::response::status::{Created, Custom};
use rocket::serde::json::Json;
use rocket::tokio::task::spawn_blocking;
use rocket::tokio::time::timeout;
use rocket::{Build, Request, Rocket, State};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[macro_use]
extern crate rocket;

mod config;
mod db;
mod gate;

/// Settings and collaborators shared by every route
pub struct App {
    pub secret: WrappingSecret,
    pub default_label: String,
    pub gate: AdminGate,
    pub tally_timeout: Duration,
}

impl App {
    fn label(&self, label: Option<String>) -> String {
        label
            .map(|l| l.trim().to_owned())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| self.default_label.clone())
    }
}

impl From<Config> for App {
    fn from(config: Config) -> Self {
        App {
            secret: config.secret,
            default_label: config.default_label,
            gate: config.admin_source.into(),
            tally_timeout: config.tally_timeout,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Message {
    pub message: String,
}

impl Message {
    fn json(message: impl Into<String>) -> Json<Message> {
        Json(Message {
            message: message.into(),
        })
    }
}

/// Error responses, always a JSON `{message}` body
#[derive(Responder, Debug)]
pub enum ApiError {
    #[response(status = 400)]
    BadRequest(Json<Message>),

    #[response(status = 403)]
    Forbidden(Json<Message>),

    #[response(status = 404)]
    NotFound(Json<Message>),

    #[response(status = 500)]
    Internal(Json<Message>),
}

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        ApiError::Internal(Message::json(message))
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::BadRequest(Message::json(e.to_string()))
    }
}

impl From<AuthorizationError> for ApiError {
    fn from(e: AuthorizationError) -> Self {
        match e {
            AuthorizationError::MissingAddress => ApiError::BadRequest(Message::json(e.to_string())),
            AuthorizationError::Unauthorized(_) => {
                ApiError::Forbidden(Message::json("Unauthorized: Admin access required"))
            }
            AuthorizationError::CheckFailed(_) => ApiError::internal("Failed to verify admin status"),
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::Validation(e) => e.into(),
            Error::NoActiveKey(label) => {
                ApiError::internal(format!("No active key found for label \"{}\"", label))
            }
            Error::NoDecryptionKey(label) => ApiError::internal(format!(
                "Private key for label \"{}\" could not be decrypted",
                label
            )),
            e => {
                error!("{}", e);
                ApiError::internal(e.to_string())
            }
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateKeysRequest {
    admin_address: Option<String>,
    label: Option<String>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GeneratedKey {
    label: String,
    public_key_pem: String,
    message: String,
}

#[post("/keys/generate", data = "<request>")]
async fn generate_keys(
    app: &State<App>,
    store: &State<SqliteStore>,
    request: Json<GenerateKeysRequest>,
) -> ApiResult<Created<Json<GeneratedKey>>> {
    let request = request.into_inner();
    let admin = authorize(&app.gate, request.admin_address.as_deref()).await?;
    let label = app.label(request.label);

    let failed = |e: Error| {
        error!("Key generation for \"{}\" failed: {}", label, e);
        ApiError::internal(format!("Failed to generate key pair: {}", e))
    };

    // RSA key generation is CPU bound, keep it off the async workers
    let key_pair = spawn_blocking(generate_key_pair)
        .await
        .map_err(|e| ApiError::internal(format!("Key generation task failed: {}", e)))?
        .map_err(failed)?;
    let public_key_pem = KeyCustodian::new(store.inner(), &app.secret)
        .store_key_pair(&label, key_pair.public_key_pem, &key_pair.private_key_pem)
        .await
        .map_err(failed)?
        .public_key_pem;
    info!("{} generated a new key pair for \"{}\"", admin, label);

    let location = format!("/keys/public-key?label={}", label);
    Ok(Created::new(location).body(Json(GeneratedKey {
        label,
        public_key_pem,
        message: "Key pair generated and saved successfully".to_owned(),
    })))
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PublicKeyResponse {
    label: String,
    public_key_pem: String,
}

#[get("/keys/public-key?<label>")]
async fn public_key(
    app: &State<App>,
    store: &State<SqliteStore>,
    label: Option<String>,
) -> ApiResult<Json<PublicKeyResponse>> {
    let label = app.label(label);

    match KeyCustodian::new(store.inner(), &app.secret)
        .active_public_key(&label)
        .await?
    {
        Some(public_key_pem) => Ok(Json(PublicKeyResponse {
            label,
            public_key_pem,
        })),
        None => Err(ApiError::NotFound(Message::json(format!(
            "No active key found for label \"{}\"",
            label
        )))),
    }
}

#[derive(Serialize, Debug)]
struct KeyHistory {
    label: String,
    keys: Vec<KeyPairSummary>,
}

#[get("/keys/history?<label>")]
async fn key_history(
    app: &State<App>,
    store: &State<SqliteStore>,
    label: Option<String>,
) -> ApiResult<Json<KeyHistory>> {
    let label = app.label(label);
    let keys = KeyCustodian::new(store.inner(), &app.secret)
        .key_history(&label)
        .await?;

    Ok(Json(KeyHistory { label, keys }))
}

#[derive(Serialize, Debug)]
struct SubmittedVote {
    id: i64,
    message: String,
}

#[post("/votes/submit", data = "<submission>")]
async fn submit_vote(
    store: &State<SqliteStore>,
    submission: Json<VoteSubmission>,
) -> ApiResult<Created<Json<SubmittedVote>>> {
    let vote = VoteLedger::new(store.inner())
        .submit(submission.into_inner())
        .await?;

    Ok(Created::new("/votes/submit").body(Json(SubmittedVote {
        id: vote.id,
        message: "Encrypted vote stored successfully".to_owned(),
    })))
}

#[post("/votes/transaction", data = "<receipt>")]
async fn store_transaction(
    store: &State<SqliteStore>,
    receipt: Json<TransactionSubmission>,
) -> ApiResult<Json<Message>> {
    match VoteLedger::new(store.inner())
        .record_transaction(receipt.into_inner())
        .await
    {
        Ok(tx) => Ok(Message::json(format!(
            "Transaction {} stored for poll {}",
            tx.transaction_hash, tx.poll_id
        ))),
        Err(Error::Validation(e)) => Err(e.into()),
        // The vote itself is already on chain, so a lost receipt is not fatal
        Err(e) => {
            warn!("Failed to store transaction receipt: {}", e);
            Ok(Message::json(
                "Vote recorded, but transaction details may not have been stored",
            ))
        }
    }
}

#[derive(FromForm, Debug)]
struct TransactionQuery {
    #[field(name = "pollId")]
    poll_id: Option<i64>,
    #[field(name = "voterAddress")]
    voter_address: Option<String>,
}

#[derive(Serialize, Debug)]
struct Transactions {
    transactions: Vec<VoteTransaction>,
}

#[get("/votes/transactions?<query..>")]
async fn transactions(
    store: &State<SqliteStore>,
    query: TransactionQuery,
) -> ApiResult<Json<Transactions>> {
    let poll_id = required_id("pollId", query.poll_id)?;
    let transactions = VoteLedger::new(store.inner())
        .transactions(poll_id, query.voter_address.as_deref())
        .await?;

    Ok(Json(Transactions { transactions }))
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct TallyRequest {
    poll_id: Option<i64>,
    admin_address: Option<String>,
    label: Option<String>,
}

#[derive(Serialize, Debug)]
struct TallyResponse {
    #[serde(flatten)]
    report: TallyReport,
    message: String,
}

#[post("/tally", data = "<request>")]
async fn tally(
    app: &State<App>,
    store: &State<SqliteStore>,
    request: Json<TallyRequest>,
) -> ApiResult<Json<TallyResponse>> {
    let request = request.into_inner();
    let poll_id = required_id("pollId", request.poll_id)?;
    let admin = authorize(&app.gate, request.admin_address.as_deref()).await?;
    let label = app.label(request.label);

    let engine = TallyEngine::new(store.inner(), &app.secret);
    let run = async {
        let prepared = engine.prepare(poll_id, &label).await?;
        info!("Decrypting {} votes of poll {}", prepared.vote_count(), poll_id);
        spawn_blocking(move || prepared.tally())
            .await
            .map_err(|e| ApiError::internal(format!("Tally task failed: {}", e)))
    };

    let report = match timeout(app.tally_timeout, run).await {
        Ok(report) => report?,
        Err(_) => {
            error!("Tally of poll {} exceeded {:?}", poll_id, app.tally_timeout);
            return Err(ApiError::internal("Tally timed out"));
        }
    };
    info!(
        "{} tallied poll {} with key \"{}\": {} of {} votes decrypted",
        admin, poll_id, label, report.successful_decryptions, report.total_votes
    );

    let message = report.message();
    Ok(Json(TallyResponse { report, message }))
}

#[catch(400)]
fn bad_request(_req: &Request) -> Json<Message> {
    Message::json("Malformed request body")
}

#[catch(404)]
fn not_found(req: &Request) -> Json<Message> {
    Message::json(format!("Sorry, '{}' is not a valid path.", req.uri()))
}

#[catch(422)]
fn unprocessable_entity(_req: &Request) -> Custom<Json<Message>> {
    Custom(
        Status::BadRequest,
        Message::json("Request body has fields of the wrong type"),
    )
}

#[catch(500)]
fn internal_error(_req: &Request) -> Json<Message> {
    Message::json("Internal server error")
}

/// Routes and catchers, without storage
pub fn build(app: App) -> Rocket<Build> {
    rocket::build()
        .manage(app)
        .mount(
            "/",
            routes![
                generate_keys,
                public_key,
                key_history,
                submit_vote,
                store_transaction,
                transactions,
                tally
            ],
        )
        .register(
            "/",
            catchers![bad_request, not_found, unprocessable_entity, internal_error],
        )
}

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let db_path = config.db_path.clone();

    build(App::from(config))
        .attach(db::stage(db_path))
        .launch()
        .await
        .map_err(|e| anyhow::anyhow!("ballotboxd: {}", e))?;

    Ok(())
}
