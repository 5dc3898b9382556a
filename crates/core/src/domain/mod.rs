pub mod delegation;
pub mod request;
pub mod settings;
