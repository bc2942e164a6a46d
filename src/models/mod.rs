pub mod buybox;
pub mod job;
pub mod scan;
