use std::io;
use thiserror::Error;

/// Failures surfaced by surfaces and their configuration.
#[derive(Debug, Error)]
pub enum Error {
    #[error("surface has no texels")]
    EmptySurface,
    #[error("could not allocate {what} ({texels} texels)")]
    Allocation { what: &'static str, texels: usize },
    #[error(
        "{what} is {actual_width}x{actual_height}, expected {expected_width}x{expected_height}"
    )]
    SizeMismatch {
        what: &'static str,
        expected_width: usize,
        expected_height: usize,
        actual_width: usize,
        actual_height: usize,
    },
    #[error("invalid coat parameters: {0}")]
    InvalidCoat(String),
    #[error("invalid spray input: {0}")]
    InvalidSpray(String),
    #[error("malformed thickness snapshot: {0}")]
    Snapshot(String),
    #[error("image codec failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("surface is in an error state and must be reinitialized")]
    Poisoned,
}

pub type Result<T> = ::std::result::Result<T, Error>;

/// Allocates a buffer filled with `value`, reporting failure instead of aborting.
pub(crate) fn alloc_filled<T: Clone>(what: &'static str, len: usize, value: T) -> Result<Vec<T>> {
    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|_| Error::Allocation { what, texels: len })?;
    data.resize(len, value);
    Ok(data)
}
