pub mod queue;
pub mod reconciler;
pub mod transcoder;
