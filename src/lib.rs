//! Oriented-box ground truth preparation for region-proposal detector training.
//!
//! Annotation quads are fitted with a minimum-area rectangle and normalized to
//! `(cx, cy, h, w, theta)`, images are rescaled isotropically under a short-side target and a
//! long-side cap, and both are packed into [`Blob`]s for a [`Trainer`] to feed to an external
//! [`TrainableModel`].
//!
//! Blobs keep their ground truth in the original image frame while `data` is resized; see
//! [`Blob`].

pub mod blob;
mod error;
pub mod geometry;
pub mod ground_truth;
pub mod rescale;
mod result;
pub mod train;
pub mod util;

pub use blob::{AnnotationPairing, BlobAssembler, BlobAssemblerBuilder, TokenPairing};
pub use error::*;
pub use geometry::{Quad, RotatedRect};
pub use rescale::RescaleBounds;
pub use result::*;
pub use train::{
    InitOptions, Losses, TrainConfig, TrainReport, TrainableModel, Trainer, TrainerBuilder,
};

pub use image;
