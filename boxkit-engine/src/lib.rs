pub mod context;
pub mod demo;

pub use context::{Context, TextExtents};

pub mod errors {
    use boxkit_core::drawing::DrawingError;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error("restore() called without a matching save()")]
        RestoreWithoutSave,
        #[error("cannot move part offset while a path is open")]
        PathOpen,
        #[error(transparent)]
        Drawing(#[from] DrawingError),
    }
}
