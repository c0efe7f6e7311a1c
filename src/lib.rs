//! Ensemble - multi-step form wizards for band management
//!
//! The engine ([`wizard`]) is generic; [`flows`] configures it for account
//! signup and band registration/editing.

pub mod config;
pub mod console;
pub mod drafts;
pub mod entities;
pub mod fields;
pub mod flows;
pub mod logging;
pub mod wizard;
