pub mod contact_request;
pub mod forum;
pub mod location;
pub mod profile;
