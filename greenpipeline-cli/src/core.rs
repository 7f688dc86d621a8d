pub mod command;
pub mod error;
pub mod estimator;
pub mod intensity;
pub mod location;
pub mod result;
pub mod sci;
pub mod session;
