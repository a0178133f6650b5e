use thiserror::Error;

#[derive(Error, Debug)]
pub enum GitOpsError {
    #[error("cannot instantiate git host client: {0}")]
    CannotInstantiateClient(String),

    #[error("repository `{0}` not found or not accessible")]
    RepositoryNotFound(String),

    #[error("permission denied on repository `{0}`: {1}")]
    PermissionDenied(String, String),

    #[error("git host request failed: {0}")]
    Transport(String),

    #[error("git host returned an unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("replaced content for `{path}` violates a post-write invariant: {reason}")]
    ContentInvariantViolated { path: String, reason: String },
}
