//! Side-effecting collaborators: settings files and the completion service.

pub mod client;
pub mod settings;
pub mod transport;
