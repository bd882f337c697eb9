//! Persistent storage layout

pub mod layout;
