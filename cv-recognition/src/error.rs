use derive_more::Display;

/// A stage of the recognition pipeline.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    #[display(fmt = "scene projection")]
    Projection,
    #[display(fmt = "pair sampling")]
    Sampling,
    #[display(fmt = "hypothesis generation")]
    HypothesisGeneration,
    #[display(fmt = "hypothesis verification")]
    Verification,
    #[display(fmt = "conflict resolution")]
    ConflictResolution,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("invalid value {value} for setting `{name}`")]
    InvalidSetting { name: &'static str, value: f64 },
    #[error("a model named {0:?} already exists")]
    DuplicateModel(String),
    #[error("model {0:?} has no usable points")]
    EmptyModel(String),
    #[error("deadline exceeded before {0}")]
    DeadlineExceeded(Stage),
}
