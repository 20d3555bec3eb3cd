//! A small web service that answers natural-language questions about images
//! with a pretrained visual question answering model.

pub mod config;
pub mod decoder;
pub mod error;
pub mod fetch;
pub mod server;
pub mod tunnel;
pub mod util;
pub mod vqa;

pub use error::{Error, Result};
