//! Shared types, error model, and configuration for LeadDesk.
//!
//! This crate is the foundation depended on by all other LeadDesk crates.
//! It provides:
//! - [`LeadDeskError`]: the unified error type
//! - Domain types ([`Lead`], [`Group`], [`DistributionSetting`], [`AssignmentAction`])
//! - Configuration ([`AppConfig`], [`DistributionConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, DistributionConfig, ScoringConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from, validate_config,
};
pub use error::{LeadDeskError, Result};
pub use types::{
    AssignmentAction, AssignmentCounts, Collaborator, CollaboratorId, DistributionSetting, Group,
    GroupId, Lead, LeadId, LeadStatus, LeadTier, TierFilter,
};
