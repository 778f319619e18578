pub mod availability;
pub mod lifecycle;
pub mod screenshot;
pub mod store;
