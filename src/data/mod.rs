pub mod adapters;
pub mod align;
pub mod builder;
pub mod dataset;
pub mod pipeline;
pub mod sampling;

pub use adapters::{DatasetAdapter, RawExample, RawInstance};
pub use align::{align_pieces, align_rationale_with_tokens};
pub use builder::{AlignedExample, ExampleBuilder, Segment, TruncationPolicy};
pub use dataset::{DatasetDict, Record};
pub use pipeline::{SplitBuilder, run_build};
