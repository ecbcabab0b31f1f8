use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReachError {
    #[error("peer {peer} has been given up on; traffic dropped")]
    GivenUpDrop { peer: String },
}
