use alloy::primitives::{Address, B256};
use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use stakedrop_core::{
    canonical_address, micros_to_usd, parse_address, referral_code, EpochKind, StakeStatus,
};
use stakedrop_indexer::{
    distribution::{is_standard_eligible, is_vip_eligible, required_referrals},
    generate_epoch,
    listener::RetryPolicy,
    storage::{EpochRecipient, EpochRecord, EpochSummary, StakeRecord, Storage},
    DistributionError, ReferralMaintainer,
};
use std::{collections::BTreeMap, net::SocketAddr, sync::Arc, time::Duration};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::resolver::{ContractClaimOracle, EpochSelector, ProofResolution, ResolveError, Resolver};

type ApiResolver = Resolver<Option<ContractClaimOracle>>;

#[derive(Clone)]
struct AppState {
    storage: Storage,
    resolver: Arc<ApiResolver>,
    referrals: ReferralMaintainer,
}

/// Runtime configuration for the Stakedrop API server.
#[derive(Debug, Clone)]
pub struct ApiRuntimeConfig {
    database_url: String,
    port: u16,
    rpc_url: Option<String>,
    staking_contract: Option<Address>,
    retry: RetryPolicy,
}

impl ApiRuntimeConfig {
    /// Build runtime configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://stakedrop.db".to_string());
        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);

        let rpc_url = std::env::var("RPC_URL")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let staking_contract = match std::env::var("STAKING_CONTRACT") {
            Ok(raw) if !raw.trim().is_empty() => Some(
                parse_address(&raw).with_context(|| format!("Invalid STAKING_CONTRACT: {}", raw))?,
            ),
            _ => None,
        };

        let mut retry = RetryPolicy::default();
        if let Some(secs) = parse_env_u64("RPC_TIMEOUT_SECS")? {
            retry.timeout = Duration::from_secs(secs);
        }
        if let Some(attempts) = parse_env_u64("RPC_MAX_RETRIES")? {
            retry.attempts = u32::try_from(attempts)
                .context("Invalid RPC_MAX_RETRIES (out of range)")?;
        }

        Ok(Self {
            database_url,
            port,
            rpc_url,
            staking_contract,
            retry,
        })
    }

    /// Build test configuration without an RPC endpoint.
    ///
    /// Claim status is then always answered from indexed claims.
    pub fn for_test(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            port: 0,
            rpc_url: None,
            staking_contract: None,
            retry: RetryPolicy::default(),
        }
    }
}

fn parse_env_u64(name: &str) -> anyhow::Result<Option<u64>> {
    let Ok(raw) = std::env::var(name) else {
        return Ok(None);
    };
    let raw = raw.trim();
    anyhow::ensure!(!raw.is_empty(), "{} is set but empty", name);
    let v: u64 = raw
        .parse()
        .with_context(|| format!("Invalid {} (expected u64)", name))?;
    Ok(Some(v))
}

fn claim_oracle(config: &ApiRuntimeConfig) -> anyhow::Result<Option<ContractClaimOracle>> {
    match (&config.rpc_url, config.staking_contract) {
        (Some(rpc_url), Some(contract)) => {
            info!(rpc_url = %rpc_url, contract = %contract, "Claim status read from chain");
            Ok(Some(ContractClaimOracle::new(
                rpc_url,
                contract,
                config.retry,
            )?))
        }
        (None, None) => {
            warn!("RPC_URL and STAKING_CONTRACT not set, claim status is advisory only");
            Ok(None)
        }
        _ => {
            warn!("RPC_URL and STAKING_CONTRACT must both be set, claim status is advisory only");
            Ok(None)
        }
    }
}

async fn build_state(config: &ApiRuntimeConfig) -> anyhow::Result<AppState> {
    let storage = Storage::new(&config.database_url, None, None).await?;
    storage.run_migrations().await?;

    let resolver = Resolver::new(storage.clone(), claim_oracle(config)?);

    Ok(AppState {
        referrals: ReferralMaintainer::new(storage.clone()),
        resolver: Arc::new(resolver),
        storage,
    })
}

fn router_for_state(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/eligible/standard", get(get_eligible_standard))
        .route("/v1/eligible/vip", get(get_eligible_vip))
        .route("/v1/proof/:kind/:address", get(get_proof))
        .route(
            "/v1/epochs/standard",
            get(list_standard_epochs).post(create_standard_epoch),
        )
        .route(
            "/v1/epochs/vip",
            get(list_vip_epochs).post(create_vip_epoch),
        )
        .route("/v1/epochs/update-id", post(update_epoch_id))
        .route("/v1/users/:address", get(get_user))
        .route("/v1/referrals/recalculate", post(recalculate_referrals))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Build an in-process API router from explicit runtime config.
pub async fn build_app(config: &ApiRuntimeConfig) -> anyhow::Result<Router> {
    let state = build_state(config).await?;
    Ok(router_for_state(state))
}

/// Run the API server with explicit runtime configuration.
pub async fn run_with_config(config: ApiRuntimeConfig) -> anyhow::Result<()> {
    let state = build_state(&config).await?;
    let storage_for_shutdown = state.storage.clone();
    let app = router_for_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Stakedrop API server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    storage_for_shutdown.close().await;
    info!("Stakedrop API server shutdown complete");
    Ok(())
}

/// Run the API server using environment-driven configuration.
pub async fn run_from_env() -> anyhow::Result<()> {
    run_with_config(ApiRuntimeConfig::from_env()?).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", err);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

async fn health(State(_state): State<AppState>) -> &'static str {
    "OK"
}

const ERROR_CODE_INVALID_REQUEST: &str = "invalid_request";
const ERROR_CODE_EPOCH_NOT_FOUND: &str = "epoch_not_found";
const ERROR_CODE_NOT_ELIGIBLE: &str = "not_eligible";
const ERROR_CODE_NOT_FOUND: &str = "not_found";
const ERROR_CODE_NO_ELIGIBLE_RECIPIENTS: &str = "no_eligible_recipients";
const ERROR_CODE_INTERNAL_ERROR: &str = "internal_error";

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorInfo,
}

#[derive(Serialize)]
struct ErrorInfo {
    code: &'static str,
    message: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: ErrorInfo {
                code,
                message: message.into(),
            },
        }),
    )
}

fn bad_request(msg: impl Into<String>) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, ERROR_CODE_INVALID_REQUEST, msg)
}

fn not_found(msg: impl Into<String>) -> ApiError {
    api_error(StatusCode::NOT_FOUND, ERROR_CODE_NOT_FOUND, msg)
}

fn internal_error<E: std::fmt::Display>(err: E) -> ApiError {
    api_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        ERROR_CODE_INTERNAL_ERROR,
        format!("Internal error: {}", err),
    )
}

fn resolve_error(err: ResolveError) -> ApiError {
    match err {
        ResolveError::EpochNotFound { .. } => api_error(
            StatusCode::NOT_FOUND,
            ERROR_CODE_EPOCH_NOT_FOUND,
            err.to_string(),
        ),
        ResolveError::NotEligible { .. } => {
            api_error(StatusCode::NOT_FOUND, ERROR_CODE_NOT_ELIGIBLE, err.to_string())
        }
        ResolveError::Storage(e) => internal_error(format!("{:#}", e)),
    }
}

fn distribution_error(err: DistributionError) -> ApiError {
    match err {
        DistributionError::NoEligibleRecipients => api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            ERROR_CODE_NO_ELIGIBLE_RECIPIENTS,
            err.to_string(),
        ),
        DistributionError::InvalidPool(_) => bad_request(err.to_string()),
        DistributionError::Storage(e) => internal_error(format!("{:#}", e)),
        other => internal_error(other),
    }
}

fn parse_kind(raw: &str) -> Result<EpochKind, ApiError> {
    raw.parse::<EpochKind>()
        .map_err(|_| bad_request(format!("Invalid kind '{}' (expected standard or vip)", raw)))
}

fn parse_path_address(raw: &str) -> Result<Address, ApiError> {
    parse_address(raw).map_err(|_| bad_request(format!("Invalid address '{}'", raw)))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StandardEligibleEntry {
    address: String,
    stake: f64,
    total_staked: f64,
    referrals: u64,
    required_referrals: u64,
    package: Option<u8>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VipEligibleEntry {
    address: String,
    total_referrals: u64,
    direct_referrals: u64,
    indirect_referrals: u64,
    total_staked: f64,
}

async fn get_eligible_standard(
    State(state): State<AppState>,
) -> Result<Json<Vec<StandardEligibleEntry>>, ApiError> {
    let stakers = state
        .storage
        .get_stakers_with_active_stake()
        .await
        .map_err(internal_error)?;

    Ok(Json(
        stakers
            .iter()
            .filter(|staker| is_standard_eligible(staker))
            .map(|staker| StandardEligibleEntry {
                address: canonical_address(&staker.address),
                stake: micros_to_usd(staker.active_stake_usd),
                total_staked: micros_to_usd(staker.total_staked_usd),
                referrals: staker.referrals.direct,
                required_referrals: required_referrals(staker.total_staked_usd),
                package: staker.top_package.map(|package| package.id()),
            })
            .collect(),
    ))
}

async fn get_eligible_vip(
    State(state): State<AppState>,
) -> Result<Json<Vec<VipEligibleEntry>>, ApiError> {
    let stakers = state
        .storage
        .get_stakers_with_active_stake()
        .await
        .map_err(internal_error)?;

    Ok(Json(
        stakers
            .iter()
            .filter(|staker| is_vip_eligible(staker))
            .map(|staker| VipEligibleEntry {
                address: canonical_address(&staker.address),
                total_referrals: staker.referrals.total(),
                direct_referrals: staker.referrals.direct,
                indirect_referrals: staker.referrals.indirect,
                total_staked: micros_to_usd(staker.total_staked_usd),
            })
            .collect(),
    ))
}

#[derive(Debug, Deserialize)]
struct ProofQuery {
    epoch: Option<String>,
}

async fn get_proof(
    State(state): State<AppState>,
    Path((kind, address)): Path<(String, String)>,
    Query(query): Query<ProofQuery>,
) -> Result<Json<ProofResolution>, ApiError> {
    let kind = parse_kind(&kind)?;
    let user = parse_path_address(&address)?;
    let selector = query
        .epoch
        .as_deref()
        .unwrap_or("latest")
        .parse::<EpochSelector>()
        .map_err(bad_request)?;

    let resolved = state
        .resolver
        .get_proof(kind, &user, selector)
        .await
        .map_err(resolve_error)?;

    if resolved.claim_status.advisory {
        warn!(
            kind = %kind,
            epoch_id = resolved.epoch_id,
            user = %resolved.address,
            "Served advisory claim status"
        );
    }

    Ok(Json(resolved))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateEpochRequest {
    total_amount: serde_json::Value,
}

/// Everything needed to publish and later audit an epoch.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EpochFullData {
    kind: EpochKind,
    merkle_root: B256,
    total_amount: String,
    distributed_amount: String,
    recipients: Vec<EpochRecipient>,
    proofs: BTreeMap<String, Vec<B256>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateEpochResponse {
    epoch_id: u64,
    merkle_root: B256,
    recipient_count: u64,
    full_data: EpochFullData,
}

// Accepts a decimal string or a non-negative JSON integer.
fn total_amount_input(value: &serde_json::Value) -> Result<String, ApiError> {
    match value {
        serde_json::Value::String(s) => Ok(s.trim().to_string()),
        serde_json::Value::Number(n) if n.is_u64() => Ok(n.to_string()),
        _ => Err(bad_request(
            "totalAmount must be a decimal string or a non-negative integer",
        )),
    }
}

async fn create_epoch(
    state: AppState,
    kind: EpochKind,
    payload: Result<Json<CreateEpochRequest>, JsonRejection>,
) -> Result<Json<CreateEpochResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| bad_request(e.body_text()))?;
    let total_amount = total_amount_input(&request.total_amount)?;

    let generated = generate_epoch(&state.storage, kind, &total_amount)
        .await
        .map_err(distribution_error)?;
    let epoch = generated.epoch;

    Ok(Json(CreateEpochResponse {
        epoch_id: generated.id,
        merkle_root: epoch.merkle_root,
        recipient_count: epoch.recipients.len() as u64,
        full_data: EpochFullData {
            kind,
            merkle_root: epoch.merkle_root,
            total_amount: epoch.total_amount.to_string(),
            distributed_amount: epoch.distributed_amount.to_string(),
            recipients: epoch.recipients,
            proofs: epoch.proofs,
        },
    }))
}

async fn create_standard_epoch(
    State(state): State<AppState>,
    payload: Result<Json<CreateEpochRequest>, JsonRejection>,
) -> Result<Json<CreateEpochResponse>, ApiError> {
    create_epoch(state, EpochKind::Standard, payload).await
}

async fn create_vip_epoch(
    State(state): State<AppState>,
    payload: Result<Json<CreateEpochRequest>, JsonRejection>,
) -> Result<Json<CreateEpochResponse>, ApiError> {
    create_epoch(state, EpochKind::Vip, payload).await
}

async fn list_epochs(state: AppState, kind: EpochKind) -> Result<Json<Vec<EpochSummary>>, ApiError> {
    state
        .storage
        .list_epochs(kind)
        .await
        .map(Json)
        .map_err(internal_error)
}

async fn list_standard_epochs(
    State(state): State<AppState>,
) -> Result<Json<Vec<EpochSummary>>, ApiError> {
    list_epochs(state, EpochKind::Standard).await
}

async fn list_vip_epochs(
    State(state): State<AppState>,
) -> Result<Json<Vec<EpochSummary>>, ApiError> {
    list_epochs(state, EpochKind::Vip).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateEpochIdRequest {
    /// Required when both kinds have an epoch with this id
    #[serde(default)]
    kind: Option<EpochKind>,
    database_epoch_id: u64,
    blockchain_epoch_id: u64,
}

fn epoch_summary(epoch: &EpochRecord) -> EpochSummary {
    EpochSummary {
        id: epoch.id,
        kind: epoch.kind,
        merkle_root: epoch.merkle_root,
        total_amount: epoch.total_amount.to_string(),
        distributed_amount: epoch.distributed_amount.to_string(),
        recipient_count: epoch.recipients.len() as u64,
        blockchain_epoch_id: epoch.blockchain_epoch_id,
        created_at: epoch.created_at,
    }
}

async fn update_epoch_id(
    State(state): State<AppState>,
    payload: Result<Json<UpdateEpochIdRequest>, JsonRejection>,
) -> Result<Json<EpochSummary>, ApiError> {
    let Json(request) = payload.map_err(|e| bad_request(e.body_text()))?;
    let id = request.database_epoch_id;

    let kind = match request.kind {
        Some(kind) => kind,
        None => {
            let kinds = state
                .storage
                .epoch_kinds_with_id(id)
                .await
                .map_err(internal_error)?;
            match kinds.as_slice() {
                [] => return Err(not_found(format!("Epoch {} not found", id))),
                [kind] => *kind,
                _ => {
                    return Err(bad_request(format!(
                        "Epoch {} exists for both kinds, specify kind",
                        id
                    )))
                }
            }
        }
    };

    let updated = state
        .storage
        .set_blockchain_epoch_id(kind, id, request.blockchain_epoch_id)
        .await
        .map_err(internal_error)?;
    if !updated {
        return Err(not_found(format!("{} epoch {} not found", kind, id)));
    }

    let epoch = state
        .storage
        .get_epoch(kind, id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found(format!("{} epoch {} not found", kind, id)))?;

    info!(
        kind = %kind,
        epoch_id = epoch.id,
        blockchain_epoch_id = request.blockchain_epoch_id,
        "Epoch published id recorded"
    );

    Ok(Json(epoch_summary(&epoch)))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StakeView {
    lock_id: String,
    amount_usd: f64,
    amount_usd_micros: u64,
    token_amount: String,
    package: u8,
    package_name: &'static str,
    start_time: u64,
    end_time: u64,
    status: StakeStatus,
    tx_hash: B256,
    block_number: u64,
}

impl From<&StakeRecord> for StakeView {
    fn from(stake: &StakeRecord) -> Self {
        Self {
            lock_id: stake.lock_id.to_string(),
            amount_usd: micros_to_usd(stake.amount_usd),
            amount_usd_micros: stake.amount_usd,
            token_amount: stake.token_amount.to_string(),
            package: stake.package.id(),
            package_name: stake.package.name(),
            start_time: stake.start_time,
            end_time: stake.end_time,
            status: stake.status,
            tx_hash: stake.tx_hash,
            block_number: stake.block_number,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserResponse {
    address: String,
    referral_code: String,
    referrer: Option<String>,
    direct_referrals: u64,
    indirect_referrals: u64,
    total_referrals: u64,
    total_staked_usd: f64,
    total_staked_usd_micros: u64,
    stakes: Vec<StakeView>,
    created_at: i64,
    updated_at: i64,
}

async fn get_user(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let address = parse_path_address(&address)?;

    let user = state
        .storage
        .get_user(&address)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found(format!("User {} not found", canonical_address(&address))))?;

    let stakes = state
        .storage
        .get_stakes_for_user(&address)
        .await
        .map_err(internal_error)?;

    Ok(Json(UserResponse {
        address: canonical_address(&user.address),
        referral_code: referral_code(&user.address),
        referrer: user.referrer.as_ref().map(canonical_address),
        direct_referrals: user.direct_referrals,
        indirect_referrals: user.indirect_referrals,
        total_referrals: user.total_referrals,
        total_staked_usd: micros_to_usd(user.total_staked_usd),
        total_staked_usd_micros: user.total_staked_usd,
        stakes: stakes.iter().map(StakeView::from).collect(),
        created_at: user.created_at,
        updated_at: user.updated_at,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecalculateResponse {
    users_updated: u64,
}

async fn recalculate_referrals(
    State(state): State<AppState>,
) -> Result<Json<RecalculateResponse>, ApiError> {
    let users_updated = state
        .referrals
        .recalculate_all()
        .await
        .map_err(internal_error)?;

    info!(users_updated, "Referral counts recalculated");
    Ok(Json(RecalculateResponse { users_updated }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use tempfile::NamedTempFile;
    use tower::ServiceExt;

    async fn setup_app() -> (Router, NamedTempFile) {
        let temp_db = NamedTempFile::new().unwrap();
        let config =
            ApiRuntimeConfig::for_test(format!("sqlite://{}", temp_db.path().display()));
        let app = build_app(&config).await.unwrap();
        (app, temp_db)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[test]
    fn test_total_amount_input() {
        assert_eq!(
            total_amount_input(&serde_json::json!("1000")).ok(),
            Some("1000".to_string())
        );
        assert_eq!(
            total_amount_input(&serde_json::json!(250)).ok(),
            Some("250".to_string())
        );
        assert!(total_amount_input(&serde_json::json!(-1)).is_err());
        assert!(total_amount_input(&serde_json::json!(1.5)).is_err());
        assert!(total_amount_input(&serde_json::json!(null)).is_err());
    }

    #[test]
    fn test_distribution_error_status_codes() {
        let (status, Json(body)) = distribution_error(DistributionError::NoEligibleRecipients);
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.error.code, ERROR_CODE_NO_ELIGIBLE_RECIPIENTS);

        let (status, Json(body)) =
            distribution_error(DistributionError::InvalidPool("abc".to_string()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error.code, ERROR_CODE_INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _temp_db) = setup_app().await;
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn test_invalid_kind_and_address_are_bad_requests() {
        let (app, _temp_db) = setup_app().await;

        let (status, body) = send(
            &app,
            Request::builder()
                .uri("/v1/proof/gold/0x0000000000000000000000000000000000000001")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_request");

        let (status, body) = send(
            &app,
            Request::builder()
                .uri("/v1/users/not-an-address")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_request");
    }

    #[tokio::test]
    async fn test_proof_without_epochs_is_epoch_not_found() {
        let (app, _temp_db) = setup_app().await;
        let (status, body) = send(
            &app,
            Request::builder()
                .uri("/v1/proof/vip/0x0000000000000000000000000000000000000001?epoch=latest")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "epoch_not_found");
    }

    #[tokio::test]
    async fn test_create_epoch_rejects_malformed_body() {
        let (app, _temp_db) = setup_app().await;
        let (status, body) = send(
            &app,
            Request::builder()
                .method("POST")
                .uri("/v1/epochs/standard")
                .header("content-type", "application/json")
                .body(Body::from("{\"amount\": 1}"))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_request");
    }

    #[tokio::test]
    async fn test_update_unknown_epoch_is_not_found() {
        let (app, _temp_db) = setup_app().await;
        let (status, body) = send(
            &app,
            Request::builder()
                .method("POST")
                .uri("/v1/epochs/update-id")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "databaseEpochId": 7, "blockchainEpochId": 1 }).to_string(),
                ))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "not_found");
    }
}
