pub mod backend;
pub mod cli;
pub mod gate;
pub mod portier;
pub mod session;
pub mod token;
