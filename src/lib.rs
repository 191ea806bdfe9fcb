pub mod error;
pub mod gram;
pub mod matrix;
pub mod pcov;
pub mod score;
pub mod selector;
pub mod svd;

pub use error::{Result, SelectionError};
pub use matrix::{MatrixView, SelectionAxis};
pub use score::ScoreKind;
pub use selector::{
    GreedySelector, RunState, SelectionRecord, SelectionResult, SelectionStatus, SelectorBuilder,
};
