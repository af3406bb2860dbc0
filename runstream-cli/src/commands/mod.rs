pub mod check_cycles;
pub mod samplesheet;
pub mod upload;
