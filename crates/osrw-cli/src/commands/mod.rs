pub mod profile;
pub mod walk;
