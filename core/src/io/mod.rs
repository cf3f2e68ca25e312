//! # IO Module
//!
//! The interface layer between HTTP clients and the domain services.
//!
//! ## Key Responsibilities
//!
//! - **API Endpoints**: REST routes under `/api` for the ledger, the entity
//!   lists, the scheduled jobs and sync
//! - **Table API**: the per-user remote tables under `/rest/v1`
//! - **Error Translation**: domain errors become HTTP status codes with a
//!   JSON `{"error": ...}` body
//!
//! ## Supported Operations
//!
//! - **GET/POST/DELETE /api/transactions**: list, create and bulk delete
//! - **GET/PUT/DELETE /api/transactions/:id**: single transaction access
//! - **POST /api/payments/process**: run the liability payment schedule
//! - **POST /api/recurring/materialize**: expand recurring templates
//! - **GET /api/summary**, **GET /api/export**: reporting
//! - **POST /api/sync**, **/api/sync/reload**, **/api/sync/upload**: reconciliation

pub mod rest;

pub use rest::*;
