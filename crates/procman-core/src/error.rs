use procman_store::StoreError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The kernel statistics source could not be read. There is no recovery
    /// path for this on a single host.
    #[error("cpu statistics unavailable: {0}")]
    CpuStats(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("mailbox closed for job `{0}`")]
    MailboxClosed(String),
}
