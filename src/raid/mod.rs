pub mod level;
pub mod mdraid;
