pub mod pricing;
pub mod simulated;
pub mod sp_api;
