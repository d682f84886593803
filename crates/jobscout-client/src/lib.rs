//! Network-facing collaborators for jobscout: a reqwest [`Fetcher`] used by
//! company enrichment and source discovery, and an OpenAI-compatible
//! [`Inference`] client for extraction, match analysis, and company
//! enrichment.
//!
//! [`Fetcher`]: jobscout_core::traits::Fetcher
//! [`Inference`]: jobscout_core::traits::Inference

pub mod fetcher;
pub mod inference;

pub use fetcher::ReqwestFetcher;
pub use inference::OpenAiInference;
