//! Test Fixtures Module
//!
//! - Audio fixtures (programmatically generated)
//! - Retrieval fixtures

// Allow dead code in test fixtures - not every suite uses every fixture
#![allow(dead_code)]

pub mod audio_fixtures;

pub use audio_fixtures::*;

/// Snippet the knowledge base returns for refund questions
pub const REFUND_POLICY_SNIPPET: &str =
    "Customers may request a full refund within 30 days of purchase.";
