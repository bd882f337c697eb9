//! Management UI REST collaborator

pub mod api;
pub mod token;
