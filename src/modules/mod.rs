pub mod delivery;
pub mod video;
