// Domain layer - Core data models and pure computation
pub mod error;
pub mod execution;
pub mod forecast;
pub mod location;
pub mod risk;
pub mod series;
pub mod training;
