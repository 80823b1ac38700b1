//! Recoverable collection-manager errors.

use rt_types::Index;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("index {0} has no known home in this collection")]
    UnknownIndex(Index),
    #[error("index {0} is not resident on this node")]
    NotResidentHere(Index),
}
