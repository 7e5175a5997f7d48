use tinchat_common::FromDetail;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Message(String),

    /// Entry rejected before it ever reached a queue.
    #[error("invalid queue entry: {0}")]
    InvalidEntry(String),
}

impl FromDetail for Error {
    fn from_detail(detail: String) -> Self {
        Self::Message(detail)
    }
}

tinchat_common::impl_describe!();
