// ABOUTME: Route module organization for the Tessera HTTP surface
// ABOUTME: Thin handlers per domain, assembled into one router under /v1
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

/// Health check routes
pub mod health;
/// API key issuance routes
pub mod keys;
/// LLM and embedding registry routes
pub mod registry;
/// Session and chat routes
pub mod sessions;
/// User registration and login routes
pub mod users;
/// Vector database and ingestion routes
pub mod vector_dbs;

pub use health::HealthRoutes;
pub use keys::KeyRoutes;
pub use registry::RegistryRoutes;
pub use sessions::SessionRoutes;
pub use users::UserRoutes;
pub use vector_dbs::VectorDbRoutes;

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::resources::ServerResources;

/// Assemble the full application router
#[must_use]
pub fn build_router(resources: Arc<ServerResources>) -> Router {
    Router::new()
        .merge(HealthRoutes::routes())
        .merge(UserRoutes::routes(resources.clone()))
        .merge(KeyRoutes::routes(resources.clone()))
        .merge(SessionRoutes::routes(resources.clone()))
        .merge(RegistryRoutes::routes(resources.clone()))
        .merge(VectorDbRoutes::routes(resources))
        .layer(TraceLayer::new_for_http())
}
