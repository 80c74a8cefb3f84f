pub mod agent;
pub mod backend;
pub mod cli;
pub mod config;
pub mod features;
pub mod learner;
pub mod model;
pub mod persistence;
pub mod tools;

pub use adrate_common::ads;
pub use adrate_common::protocol;
pub use adrate_common::rating;
