pub mod consumer;
pub mod image;
pub mod resizer;
pub mod transcoder;
