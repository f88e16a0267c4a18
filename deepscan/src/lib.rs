//! deepscan: deepfake audio detection for uploads and remote media.
//!
//! [`pipeline::Pipeline`] runs one request end to end: media normalization
//! ([`deepscan_media`]), spectrogram rendering, model resolution, MFCC
//! extraction and calibrated inference ([`deepscan_detect`]). The CLI in
//! [`cli`] wires it to the command line.

pub mod cli;
pub mod config;
pub mod detect;
pub mod model;
pub mod pipeline;
pub mod store;
pub mod url;
