//! # Asset Module
//!
//! Resolves file and URL references into decoded media and tracks every
//! temporary reference created along the way.

pub mod ledger;
pub mod loader;
pub mod source;
pub mod types;

pub use ledger::{ReleaseLedger, TempRef};
pub use loader::{FfmpegMediaBackend, MediaAssetLoader, MediaBackend, OpenedVideo};
pub use source::{AssetSource, HttpFetcher, RemoteFetcher};
pub use types::{AssetInfo, AssetKind, AudioAsset, ImageAsset, VideoAsset};
