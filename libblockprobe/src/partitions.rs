pub mod dos;
pub mod gpt;

use thiserror::Error;

use crate::partitions::{dos::DosPtError, gpt::GptError};

#[derive(Debug, Error)]
pub enum PtError {
    #[error("DOS partition table error: {0}")]
    Dos(#[from] DosPtError),
    #[error("GPT partition table error: {0}")]
    Gpt(#[from] GptError),
}
