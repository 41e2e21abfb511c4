//! REST API module
//!
//! Provides HTTP access to the ledger, factories and wallets. Callers are
//! named in request bodies; there is no request signing.
//!
//! # Endpoints
//!
//! ## Accounts
//! - `POST /api/accounts/{address}/fund` - Credit native value
//! - `GET /api/accounts/{address}/balance` - Get balance
//!
//! ## Factories
//! - `POST /api/factories` - Deploy a factory
//! - `GET /api/factories/{address}` - Factory details and events
//! - `POST /api/factories/{address}/wallets` - Create a wallet
//!
//! ## Wallets
//! - `GET /api/wallets` - List wallets
//! - `GET /api/wallets/{address}` - Wallet details
//! - `POST /api/wallets/{address}/propose` - Propose a transaction
//! - `POST /api/wallets/{address}/confirm` - Confirm a transaction
//! - `POST /api/wallets/{address}/execute` - Execute a transaction
//! - `GET /api/wallets/{address}/transactions/{id}` - Get a transaction
//! - `GET /api/wallets/{address}/events` - Event log (`?since=N`)
//!
//! ## WebSocket
//! - `GET /ws` - Real-time wallet and factory events

pub mod handlers;
pub mod routes;
pub mod websocket;

pub use handlers::ApiState;
pub use routes::create_router;
pub use websocket::{WsBroadcaster, WsEvent};
