pub mod history;
pub mod pressure;
pub mod tools;
