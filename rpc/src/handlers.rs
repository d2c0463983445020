//! Request handlers and their JSON shapes.
//!
//! Amounts are returned twice: `raw` is the integer the contract emitted,
//! `formatted` is scaled by the payment token's decimals for display.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use typhoon_reconciler::{registry, ReconcilerStatus};
use typhoon_store::{Account, AuditEntry, MirrorStore, PurchaseRecord};
use typhoon_types::{EvmAddress, TokenAmount};

use crate::error::RpcError;
use crate::pagination::{Page, PageParams};
use crate::server::ApiState;

type ApiResult<T> = Result<T, RpcError>;

pub const DEFAULT_AUDIT_LIMIT: usize = 50;
pub const MAX_AUDIT_LIMIT: usize = 1000;

// ── Views ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AmountView {
    pub raw: String,
    pub formatted: String,
}

impl AmountView {
    pub fn new(amount: TokenAmount, decimals: u8) -> Self {
        Self {
            raw: amount.raw().to_string(),
            formatted: amount.format_units(decimals),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountView {
    pub id: u64,
    pub wallet: String,
    pub username: String,
    pub referral_id: String,
    pub sponsor_referral_id: Option<String>,
    pub total_purchased: AmountView,
    pub referral_earned: AmountView,
    pub referral_claimed: AmountView,
    pub referral_pending: AmountView,
    pub direct_count: u32,
    pub team_size: u32,
    pub created_at: u64,
}

impl AccountView {
    pub fn new(account: &Account, decimals: u8) -> Self {
        Self {
            id: account.id,
            wallet: account.wallet.to_string(),
            username: account.username.clone(),
            referral_id: account.referral_id.clone(),
            sponsor_referral_id: account.sponsor_referral_id.clone(),
            total_purchased: AmountView::new(account.total_purchased, decimals),
            referral_earned: AmountView::new(account.referral_earned, decimals),
            referral_claimed: AmountView::new(account.referral_claimed, decimals),
            referral_pending: AmountView::new(account.referral_pending(), decimals),
            direct_count: account.direct_count,
            team_size: account.team_size,
            created_at: account.created_at.as_secs(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PurchaseView {
    pub tx_hash: String,
    pub investment_block_id: String,
    pub quantity: String,
    pub total_paid: AmountView,
    pub chain_block_number: u64,
    pub purchased_at: u64,
}

impl PurchaseView {
    pub fn new(record: &PurchaseRecord, decimals: u8) -> Self {
        Self {
            tx_hash: record.tx_hash.to_string(),
            investment_block_id: record.investment_block_id.to_string(),
            quantity: record.quantity.to_string(),
            total_paid: AmountView::new(record.total_paid, decimals),
            chain_block_number: record.chain_block_number,
            purchased_at: record.purchased_at.as_secs(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuditView {
    pub tx_hash: String,
    pub log_index: u64,
    pub kind: String,
    pub block_number: u64,
    pub block_timestamp: u64,
    pub detail: serde_json::Value,
}

impl From<&AuditEntry> for AuditView {
    fn from(entry: &AuditEntry) -> Self {
        Self {
            tx_hash: entry.key.tx_hash.to_string(),
            log_index: entry.key.log_index,
            kind: entry.kind.as_str().to_string(),
            block_number: entry.block_number,
            block_timestamp: entry.block_timestamp.as_secs(),
            detail: entry.detail_json(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ControlResponse {
    /// Whether the call changed anything.
    pub changed: bool,
    pub status: ReconcilerStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub running: bool,
    pub lag: Option<u64>,
    pub max_lag_blocks: u64,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub wallet: String,
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
}

// ── Control ──────────────────────────────────────────────────────────────

pub async fn start<S: MirrorStore + Send + Sync + 'static>(
    State(state): State<Arc<ApiState<S>>>,
) -> Json<ControlResponse> {
    let changed = state.handle.start().await;
    Json(ControlResponse {
        changed,
        status: state.handle.status(),
    })
}

pub async fn stop<S: MirrorStore + Send + Sync + 'static>(
    State(state): State<Arc<ApiState<S>>>,
) -> Json<ControlResponse> {
    let changed = state.handle.stop().await;
    Json(ControlResponse {
        changed,
        status: state.handle.status(),
    })
}

pub async fn status<S: MirrorStore + Send + Sync + 'static>(
    State(state): State<Arc<ApiState<S>>>,
) -> Json<ReconcilerStatus> {
    Json(state.handle.status())
}

pub async fn health<S: MirrorStore + Send + Sync + 'static>(
    State(state): State<Arc<ApiState<S>>>,
) -> (StatusCode, Json<HealthResponse>) {
    let status = state.handle.status();
    let max_lag_blocks = state.handle.scheduler().settings().max_lag_blocks;
    let healthy = status.is_healthy(max_lag_blocks);
    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        code,
        Json(HealthResponse {
            healthy,
            running: status.running,
            lag: status.lag,
            max_lag_blocks,
        }),
    )
}

pub async fn metrics<S: MirrorStore + Send + Sync + 'static>(
    State(state): State<Arc<ApiState<S>>>,
) -> ApiResult<impl IntoResponse> {
    let body = state
        .handle
        .scheduler()
        .metrics()
        .encode()
        .map_err(|e| RpcError::Server(e.to_string()))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}

// ── Accounts ─────────────────────────────────────────────────────────────

pub async fn register<S: MirrorStore + Send + Sync + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AccountView>)> {
    let account = registry::register(state.store(), &request.wallet, &request.username)?;
    Ok((
        StatusCode::CREATED,
        Json(AccountView::new(&account, state.token_decimals)),
    ))
}

pub async fn account_by_wallet<S: MirrorStore + Send + Sync + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    Path(wallet): Path<String>,
) -> ApiResult<Json<AccountView>> {
    let account = load_account(&state, &wallet)?;
    Ok(Json(AccountView::new(&account, state.token_decimals)))
}

pub async fn account_by_referral<S: MirrorStore + Send + Sync + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    Path(referral_id): Path<String>,
) -> ApiResult<Json<AccountView>> {
    let account = state
        .store()
        .account_by_referral_id(referral_id.trim())?
        .ok_or_else(|| RpcError::NotFound(format!("referral id {referral_id}")))?;
    Ok(Json(AccountView::new(&account, state.token_decimals)))
}

pub async fn referrals<S: MirrorStore + Send + Sync + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    Path(wallet): Path<String>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<Page<AccountView>>> {
    let account = load_account(&state, &wallet)?;
    let direct = state.store().direct_referrals(&account.referral_id)?;
    let decimals = state.token_decimals;
    Ok(Json(
        Page::slice(direct, &page).map(|a| AccountView::new(&a, decimals)),
    ))
}

pub async fn purchases<S: MirrorStore + Send + Sync + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    Path(wallet): Path<String>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<Page<PurchaseView>>> {
    let wallet = parse_wallet(&wallet)?;
    let history = state.store().purchases_for_wallet(&wallet)?;
    let decimals = state.token_decimals;
    Ok(Json(
        Page::slice(history, &page).map(|p| PurchaseView::new(&p, decimals)),
    ))
}

pub async fn audit<S: MirrorStore + Send + Sync + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<Vec<AuditView>>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_AUDIT_LIMIT)
        .clamp(1, MAX_AUDIT_LIMIT);
    let entries = state.store().recent_audit(limit)?;
    Ok(Json(entries.iter().map(AuditView::from).collect()))
}

fn parse_wallet(raw: &str) -> ApiResult<EvmAddress> {
    EvmAddress::parse(raw).map_err(|_| RpcError::InvalidRequest(format!("invalid wallet {raw}")))
}

fn load_account<S: MirrorStore + Send + Sync + 'static>(
    state: &ApiState<S>,
    raw: &str,
) -> ApiResult<Account> {
    let wallet = parse_wallet(raw)?;
    state
        .store()
        .account_by_wallet(&wallet)?
        .ok_or_else(|| RpcError::NotFound(format!("account {wallet}")))
}
