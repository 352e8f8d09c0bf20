//! Test doubles for the embedder-side collaborators.


pub use machine::ScriptedMachine;
