pub mod devices;
pub mod level;
