/// Errors surfaced to callers of the on-demand alert paths.
///
/// Scheduled cycles never produce `NotFound` or `Unauthorized`; they only
/// see subscriptions handed to them by the store.
#[derive(thiserror::Error, Debug)]
pub enum AlertError {
    #[error("alert not found: {0}")]
    NotFound(String),

    #[error("user {requester} may not access alert {subscription}")]
    Unauthorized {
        subscription: String,
        requester: String,
    },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
