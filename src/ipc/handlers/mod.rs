pub mod archive;
pub mod backup;
pub mod core;
pub mod schedule;
pub mod students;
pub mod subjects;
