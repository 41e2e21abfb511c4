//! REST API handlers for ledger, factory and wallet operations

use crate::api::websocket::WsBroadcaster;
use crate::crypto::Address;
use crate::dispatch::{DispatchError, Ledger};
use crate::multisig::{
    EventRecord, ExecutionOutcome, FactoryEvent, MultisigError, MultisigFactory, MultisigWallet,
    Transaction, TxId, WalletEvent,
};
use crate::storage::Storage;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub ledger: Arc<Ledger>,
    pub storage: Arc<Storage>,
    pub ws_broadcaster: Arc<WsBroadcaster>,
}

impl ApiState {
    pub fn new(ledger: Arc<Ledger>, storage: Arc<Storage>) -> Self {
        let ws_broadcaster = Arc::new(WsBroadcaster::for_ledger(&ledger));
        Self {
            ledger,
            storage,
            ws_broadcaster,
        }
    }

    /// Push new events to clients and persist the ledger after a mutation
    fn commit(&self) {
        self.ws_broadcaster.publish(&self.ledger);
        if let Err(e) = self.storage.save(&self.ledger) {
            log::error!("Failed to save ledger: {}", e);
        }
    }

    fn wallet(&self, address: &Address) -> Result<Arc<MultisigWallet>, HandlerError> {
        self.ledger.wallet(address).ok_or_else(|| {
            api_error(
                StatusCode::NOT_FOUND,
                format!("Wallet not found: {}", address),
            )
        })
    }

    fn factory(&self, address: &Address) -> Result<Arc<MultisigFactory>, HandlerError> {
        self.ledger.factory(address).ok_or_else(|| {
            api_error(
                StatusCode::NOT_FOUND,
                format!("Factory not found: {}", address),
            )
        })
    }
}

type HandlerError = (StatusCode, Json<ApiError>);

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub address: Address,
    pub balance: String,
}

#[derive(Debug, Serialize)]
pub struct FactoryInfo {
    pub address: Address,
    pub owner: Address,
    pub wallets: Vec<Address>,
    pub created_at: String,
    pub events: Vec<EventRecord<FactoryEvent>>,
}

impl From<&MultisigFactory> for FactoryInfo {
    fn from(factory: &MultisigFactory) -> Self {
        Self {
            address: factory.address(),
            owner: factory.owner(),
            wallets: factory.wallets_created(),
            created_at: factory.created_at().to_rfc3339(),
            events: factory.events(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WalletInfo {
    pub address: Address,
    pub owners: Vec<Address>,
    pub quorum: u32,
    pub description: String,
    pub balance: String,
    pub transaction_count: u64,
    pub created_at: String,
}

impl WalletInfo {
    fn new(wallet: &MultisigWallet, ledger: &Ledger) -> Self {
        let config = wallet.config();
        Self {
            address: wallet.address(),
            description: config.description(),
            owners: config.owners,
            quorum: config.quorum,
            balance: ledger.balance_of(&wallet.address()).to_string(),
            transaction_count: wallet.transaction_count(),
            created_at: wallet.created_at().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionInfo {
    #[serde(flatten)]
    pub transaction: Transaction,
    /// Confirmations from current owners
    pub confirmations: usize,
    pub required: u32,
    pub confirmed_by: Vec<Address>,
    pub executed: bool,
}

impl TransactionInfo {
    fn new(wallet: &MultisigWallet, transaction: Transaction) -> Self {
        let id = transaction.id;
        Self {
            executed: transaction.executed(),
            transaction,
            confirmations: wallet.confirmation_count(id),
            required: wallet.required_approvals(),
            confirmed_by: wallet.confirmers(id),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProposeResponse {
    pub id: TxId,
}

#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub id: TxId,
    #[serde(flatten)]
    pub outcome: ExecutionOutcome,
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Deserialize)]
pub struct FundRequest {
    #[serde(with = "crate::multisig::amount")]
    pub amount: u128,
}

#[derive(Deserialize)]
pub struct DeployFactoryRequest {
    pub deployer: Address,
}

#[derive(Deserialize)]
pub struct CreateWalletRequest {
    pub owners: Vec<Address>,
    pub quorum: u32,
}

#[derive(Deserialize)]
pub struct ProposeRequest {
    pub caller: Address,
    pub target: Address,
    #[serde(default, with = "crate::multisig::amount")]
    pub value: u128,
    /// Hex-encoded payload; empty for a plain transfer
    #[serde(default)]
    pub payload: String,
}

#[derive(Deserialize)]
pub struct ConfirmRequest {
    pub caller: Address,
    pub id: TxId,
}

#[derive(Deserialize)]
pub struct ExecuteRequest {
    pub id: TxId,
}

#[derive(Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub since: usize,
}

// ============================================================================
// Helpers
// ============================================================================

fn api_error(status: StatusCode, error: impl Into<String>) -> HandlerError {
    (
        status,
        Json(ApiError {
            error: error.into(),
        }),
    )
}

fn parse_address(text: &str) -> Result<Address, HandlerError> {
    text.parse().map_err(|e| {
        api_error(
            StatusCode::BAD_REQUEST,
            format!("Invalid address {}: {}", text, e),
        )
    })
}

fn multisig_error(e: MultisigError) -> HandlerError {
    let status = match &e {
        MultisigError::Unauthorized { .. } => StatusCode::FORBIDDEN,
        MultisigError::NotFound(_) => StatusCode::NOT_FOUND,
        MultisigError::AlreadyExecuted(_) | MultisigError::ExecutionInProgress(_) => {
            StatusCode::CONFLICT
        }
        MultisigError::InvalidConfiguration(_)
        | MultisigError::InsufficientApprovals { .. }
        | MultisigError::DuplicateOwner(_) => StatusCode::BAD_REQUEST,
    };
    api_error(status, e.to_string())
}

fn dispatch_error(e: DispatchError) -> HandlerError {
    api_error(StatusCode::BAD_REQUEST, e.to_string())
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health - Health check
pub async fn health_check() -> &'static str {
    "OK"
}

/// POST /api/accounts/{address}/fund - Credit native value to an account
pub async fn fund_account(
    State(state): State<ApiState>,
    Path(address): Path<String>,
    Json(req): Json<FundRequest>,
) -> Result<Json<BalanceResponse>, HandlerError> {
    let address = parse_address(&address)?;
    let balance = state
        .ledger
        .fund(&address, req.amount)
        .map_err(dispatch_error)?;

    state.ws_broadcaster.balance_changed(address, balance);
    state.commit();

    Ok(Json(BalanceResponse {
        address,
        balance: balance.to_string(),
    }))
}

/// GET /api/accounts/{address}/balance - Get native balance
pub async fn get_balance(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> Result<Json<BalanceResponse>, HandlerError> {
    let address = parse_address(&address)?;
    Ok(Json(BalanceResponse {
        address,
        balance: state.ledger.balance_of(&address).to_string(),
    }))
}

/// POST /api/factories - Deploy a factory
pub async fn deploy_factory(
    State(state): State<ApiState>,
    Json(req): Json<DeployFactoryRequest>,
) -> Json<FactoryInfo> {
    let factory = state.ledger.deploy_factory(&req.deployer);
    state.commit();
    Json(FactoryInfo::from(&*factory))
}

/// GET /api/factories/{address} - Get factory details
pub async fn get_factory(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> Result<Json<FactoryInfo>, HandlerError> {
    let factory = state.factory(&parse_address(&address)?)?;
    Ok(Json(FactoryInfo::from(&*factory)))
}

/// POST /api/factories/{address}/wallets - Create a wallet through a factory
pub async fn create_wallet(
    State(state): State<ApiState>,
    Path(address): Path<String>,
    Json(req): Json<CreateWalletRequest>,
) -> Result<Json<WalletInfo>, HandlerError> {
    let factory = state.factory(&parse_address(&address)?)?;

    let created = factory
        .create(&state.ledger, req.owners, req.quorum)
        .map_err(multisig_error)?;

    state.commit();
    let wallet = state.wallet(&created)?;
    Ok(Json(WalletInfo::new(&wallet, &state.ledger)))
}

/// GET /api/wallets - List all wallets
pub async fn list_wallets(State(state): State<ApiState>) -> Json<Vec<WalletInfo>> {
    let wallets = state
        .ledger
        .wallets()
        .iter()
        .map(|w| WalletInfo::new(w, &state.ledger))
        .collect();
    Json(wallets)
}

/// GET /api/wallets/{address} - Get wallet details
pub async fn get_wallet(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> Result<Json<WalletInfo>, HandlerError> {
    let wallet = state.wallet(&parse_address(&address)?)?;
    Ok(Json(WalletInfo::new(&wallet, &state.ledger)))
}

/// POST /api/wallets/{address}/propose - Propose a transaction
pub async fn propose(
    State(state): State<ApiState>,
    Path(address): Path<String>,
    Json(req): Json<ProposeRequest>,
) -> Result<Json<ProposeResponse>, HandlerError> {
    let wallet = state.wallet(&parse_address(&address)?)?;
    let payload = hex::decode(req.payload.trim_start_matches("0x")).map_err(|e| {
        api_error(StatusCode::BAD_REQUEST, format!("Invalid payload hex: {}", e))
    })?;

    let id = wallet
        .propose(&req.caller, req.target, req.value, payload)
        .map_err(multisig_error)?;

    state.commit();
    Ok(Json(ProposeResponse { id }))
}

/// POST /api/wallets/{address}/confirm - Confirm a transaction
pub async fn confirm(
    State(state): State<ApiState>,
    Path(address): Path<String>,
    Json(req): Json<ConfirmRequest>,
) -> Result<Json<TransactionInfo>, HandlerError> {
    let wallet = state.wallet(&parse_address(&address)?)?;

    wallet
        .confirm(&req.caller, req.id)
        .map_err(multisig_error)?;

    state.commit();
    let tx = wallet
        .transaction(req.id)
        .ok_or_else(|| multisig_error(MultisigError::NotFound(req.id)))?;
    Ok(Json(TransactionInfo::new(&wallet, tx)))
}

/// POST /api/wallets/{address}/execute - Execute a confirmed transaction
pub async fn execute(
    State(state): State<ApiState>,
    Path(address): Path<String>,
    Json(req): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>, HandlerError> {
    let wallet = state.wallet(&parse_address(&address)?)?;

    let outcome = wallet
        .execute(req.id, &*state.ledger)
        .map_err(multisig_error)?;

    state.commit();
    Ok(Json(ExecuteResponse {
        id: req.id,
        outcome,
    }))
}

/// GET /api/wallets/{address}/transactions/{id} - Get a transaction
pub async fn get_transaction(
    State(state): State<ApiState>,
    Path((address, id)): Path<(String, TxId)>,
) -> Result<Json<TransactionInfo>, HandlerError> {
    let wallet = state.wallet(&parse_address(&address)?)?;
    let tx = wallet
        .transaction(id)
        .ok_or_else(|| multisig_error(MultisigError::NotFound(id)))?;
    Ok(Json(TransactionInfo::new(&wallet, tx)))
}

/// GET /api/wallets/{address}/events?since=N - Wallet event log
pub async fn get_events(
    State(state): State<ApiState>,
    Path(address): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<EventRecord<WalletEvent>>>, HandlerError> {
    let wallet = state.wallet(&parse_address(&address)?)?;
    Ok(Json(wallet.events_since(query.since)))
}
