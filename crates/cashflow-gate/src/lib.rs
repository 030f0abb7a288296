#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Axum middleware enforcing BCH payment gates on protected routes for the
//! CashFlow402 gateway (`spec.md` §4.10, §4.11).
//!
//! Two gates are provided, both usable as ordinary `axum::middleware::from_fn_with_state`
//! layers over a shared [`GateState`]:
//!
//! - [`percall::percall_gate`] — the Per-call Gate. Issues a `402` BIP-21
//!   challenge for unauthenticated requests and exchanges a confirmed
//!   payment for a short-lived bearer token via [`percall::verify_payment`].
//! - [`subscription::subscription_gate`] — the Subscription Gate (Router402).
//!   Resolves the caller's subscription by `tokenCategory`, debits the
//!   call's cost from its balance, and triggers just-in-time settlement
//!   once pending usage crosses the configured threshold.
//!
//! ## Example
//!
//! ```ignore
//! use axum::{Router, routing::get, middleware::from_fn_with_state};
//! use cashflow_gate::{percall::percall_gate, state::GateState};
//! use std::sync::Arc;
//!
//! fn router(state: Arc<GateState>) -> Router {
//!     Router::new()
//!         .route("/api/premium", get(handler))
//!         .layer(from_fn_with_state(state.clone(), percall_gate))
//!         .with_state(state)
//! }
//!
//! async fn handler() -> &'static str {
//!     "paid content"
//! }
//! ```

pub mod percall;
pub mod response;
pub mod state;
pub mod subscription;

pub use percall::{percall_gate, verify_payment, PercallContext};
pub use response::{GateError, PaymentChallengeBody};
pub use state::{GateConfig, GateState};
pub use subscription::{subscription_gate, SubscriptionContext};
