pub mod digest;
pub mod filters;
pub mod retriever;
pub mod sinks;
pub mod sources;
