// Nebula Relay - local bridge to a nebulaONE assistant
// Library exports

pub mod auth;
pub mod config;
pub mod errors;
pub mod nebula;
pub mod server;
pub mod usage;
