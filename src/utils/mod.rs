pub mod paths;

pub use paths::{SampleKey, SplitPaths};
