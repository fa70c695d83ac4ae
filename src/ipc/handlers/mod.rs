pub mod core;
pub mod enrollment;
pub mod schedule;
pub mod sections;
pub mod students;
pub mod sync;
