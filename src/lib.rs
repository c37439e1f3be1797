//! # Memory Vault
//!
//! The client-side half of posting a photo: pick an image, shrink it to an
//! upload budget, crop it to one of a fixed set of aspect presets while the
//! user pans and zooms, then store the bytes and create the post record.
//!
//! # Architecture: One Session, Three Workers
//!
//! A post is driven by an [`session::UploadSession`] state machine. The work
//! around it is split into three independent stages, each of which can fail
//! without taking the session down:
//!
//! ```text
//! 1. Compress  file bytes  →  source image     (over the byte budget → resize + re-encode)
//! 2. Crop      viewport    →  cropped JPEG      (debounced, latest generation wins)
//! 3. Upload    artifact    →  stored blob + post record
//! ```
//!
//! [`flow::UploadFlow`] wires the three to one session and is the only thing
//! a front end needs to drive.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`session`] | Phase state machine, validation, cancel flag, progress channel |
//! | [`viewport`] | Zoom/pan state with clamping against the current image and preset |
//! | [`imaging`] | Pure geometry, compression and crop rendering behind an [`imaging::ImageBackend`] |
//! | [`artifact`] | Source and cropped images, preview URL registry |
//! | [`cropper`] | Debounced crop scheduling and the generation-guarded artifact slot |
//! | [`upload`] | Submit: storage upload, record creation, simulated progress |
//! | [`data_service`] | Storage/record backend trait and the local filesystem implementation |
//! | [`draft`] | JSON snapshots of unfinished sessions |
//! | [`flow`] | Dispatcher tying the above together for one session |
//! | [`config`] | `vault.toml` loading, validation and stock defaults |
//! | [`naming`] | File type checks and storage object names |
//! | [`timing`] | Debounce and idle timers on tokio |
//! | [`types`] | Aspect presets shared by everything else |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Geometry Is Pure
//!
//! Everything in [`imaging::calculations`] is a plain function of numbers:
//! minimum zoom, pan limits, the source rectangle a viewport maps to. The
//! viewport, the cropper and the CLI all call the same functions, and the
//! property tests pin the invariants (the source rectangle always lies inside
//! the image and always has the preset's aspect ratio).
//!
//! ## Latest Crop Wins
//!
//! Crop renders run on the blocking pool and can finish out of order. Each
//! request carries a generation number and the slot only accepts the one it
//! is waiting for, so a slow early render can never overwrite a later one.
//!
//! ## Backend Failures Never Lose The Session
//!
//! A failed upload or record write moves the session to `failed`, keeps the
//! artifact and the caption, and leaves the draft on disk. Submitting again
//! is always allowed.

pub mod artifact;
pub mod config;
pub mod cropper;
pub mod data_service;
pub mod draft;
pub mod flow;
pub mod imaging;
pub mod naming;
pub mod output;
pub mod session;
pub mod timing;
pub mod types;
pub mod upload;
pub mod viewport;

#[cfg(test)]
pub(crate) mod test_helpers;
