use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemblorError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Allocation error: {context} would require {bytes} bytes")]
    Allocation { context: String, bytes: u128 },

    #[error("Non-finite {what} on rank {rank} at step {step}{}", plane_suffix(.plane))]
    NonFinite {
        what: String,
        rank: usize,
        step: usize,
        plane: Option<usize>,
    },

    #[error("Exchange error: {0}")]
    Exchange(String),

    #[error("GPU error: {0}")]
    Gpu(String),
}

fn plane_suffix(plane: &Option<usize>) -> String {
    match plane {
        Some(id) => format!(" (fault plane {id})"),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, TemblorError>;
