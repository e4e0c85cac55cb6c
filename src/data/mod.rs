pub mod country;
pub mod coverage;
pub mod delta;
pub mod manifest;
pub mod merge;
pub mod normalize;
pub mod progress;
pub mod ranking;
pub mod snapshot;
pub mod source;
pub mod validate;
pub mod worldbank;
pub mod writer;
