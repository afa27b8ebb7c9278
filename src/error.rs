use crate::parser::ParseError;

/// Every failure surfaced by the crate. None is retried; each carries the
/// message shown to the user.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid template syntax: {0}")]
    TemplateSyntax(#[from] ParseError),

    #[error("{0}")]
    ModelGeneration(String),

    #[error("{0}")]
    TemplateFile(String),

    #[error("{0}")]
    DataFile(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    TemplateRender(String),

    #[error("{0}")]
    OutputFile(String),
}

pub type Result<T> = std::result::Result<T, Error>;
