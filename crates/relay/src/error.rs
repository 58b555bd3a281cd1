use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to start worker thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("{0} pipeline is shut down")]
    PipelineClosed(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
