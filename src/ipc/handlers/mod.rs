pub mod classes;
pub mod core;
pub mod dashboard;
pub mod groups;
pub mod holidays;
pub mod progress;
pub mod promotions;
pub mod students;
pub mod teachers;
