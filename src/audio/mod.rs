//! # Audio Module
//!
//! Decodes narration and clip soundtracks and mixes them into the capture's
//! audio stream.
//!
//! ## Core Features
//!
//! - **Loading**: WAV through `hound`, compressed formats through `symphonia`
//! - **Mixing**: master track plus scheduler-gated clip tracks
//! - **Synthetic master**: a silent track of computed duration when no
//!   narration is supplied
//!
//! ## Usage
//!
//! ```rust,no_run
//! use reel_compositor::audio::AudioLoader;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let narration = AudioLoader::load("narration.wav").await?;
//! println!("Narration runs {:.2}s", narration.duration);
//! # Ok(())
//! # }
//! ```

pub mod loader;
pub mod mixer;
pub mod types;

pub use loader::AudioLoader;
pub use mixer::{AudioMixer, MasterTrack, MixPolicy};
pub use types::{AudioData, AudioFormat};
