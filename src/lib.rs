pub mod alert;
pub mod analysis;
pub mod camera;
pub mod config;
pub mod pose;
pub mod stream;
