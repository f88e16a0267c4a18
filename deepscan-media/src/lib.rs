//! deepscan-media: acquire request media as a local 16kHz mono WAV.
//!
//! Uploads are written into a per-request scratch directory; URLs are
//! downloaded there with `yt-dlp`. Anything that is not already WAV is
//! converted with `ffmpeg`. External tools run with a deadline and are
//! killed if it passes or the request is dropped.
//!
//! ```ignore
//! use deepscan_media::{MediaNormalizer, MediaSource};
//!
//! let normalizer = MediaNormalizer::default();
//! let media = normalizer
//!     .normalize(&MediaSource::url("https://youtube.com/watch?v=example"))
//!     .await?;
//! println!("{}", media.wav_path().display());
//! // scratch files are removed when `media` is dropped
//! ```

pub mod error;
pub mod fetch;
pub mod normalize;
mod tool;
pub mod transcode;

pub use error::{MediaError, Result, Stage};
pub use fetch::Fetcher;
pub use normalize::{DEFAULT_UPLOAD_NAME, MediaNormalizer, MediaSource, NormalizedMedia};
pub use transcode::Transcoder;
