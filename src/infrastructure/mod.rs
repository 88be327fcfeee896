pub mod queue;
pub mod source;
pub mod storage;
