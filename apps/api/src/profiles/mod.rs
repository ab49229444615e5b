// Profiles: onboarding, CA credentials and the public CA directory.

pub mod completion;
pub mod directory;
pub mod handlers;
pub mod service;
