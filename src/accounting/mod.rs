//! Spend accounting shared across inclusion attempts

mod budget;

pub use budget::Budget;
