//! DRSHub resolution engine.
//!
//! Resolves GA4GH DRS URIs into the concrete, time-limited access
//! information a caller asked for, issuing the minimal set of backend calls
//! needed to produce exactly the requested fields.
//!
//! Per-request flow: URI -> provider profile -> fetch plan -> backend calls
//! -> normalized response. The pieces compose leaves-first: the HTTP client
//! (`drshub-api`) under the URI classifier and provider registry, the pure
//! fetch planner over those, and the orchestrator on top.

pub mod config;
pub mod gateway;
pub mod handler;
pub mod normalize;
pub mod plan;
pub mod providers;
pub mod resolve;
#[cfg(test)]
mod testing;
pub mod uri;

pub use config::DrsHubConfig;
pub use gateway::{AccessAuth, DrsGateway, HttpGateway};
pub use handler::{ResolveResponse, handle_resolve};
pub use resolve::{ResolutionRequest, Resolver};
