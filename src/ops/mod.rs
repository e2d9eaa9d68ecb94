pub mod fill;
pub mod scripting;
