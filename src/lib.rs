// Sandbox IDE session core - exposes all modules for the binary and tests

pub mod appearance;
pub mod config;
pub mod controller;
pub mod file_tree;
pub mod language;
pub mod services;
pub mod session;
pub mod terminal;

pub use controller::{ActiveSession, SelectOutcome, SessionController};
