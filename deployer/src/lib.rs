//! Swarm cluster bootstrap deployer
//!
//! Takes a freshly provisioned host to a serving application stack:
//! swarm initialization, reverse proxy, management UI, the application
//! stack itself, and certificate-mode reconciliation. Every step is
//! idempotent and the whole sequence can be rerun after any failure.

pub mod certs;
pub mod context;
pub mod convergence;
pub mod credentials;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod mgmt;
pub mod net;
pub mod operator;
pub mod provision;
pub mod runtime;
pub mod sequencer;
pub mod storage;
pub mod template;
pub mod utils;
