// Community forum: posts, one-level comment threads, categories and tags.

pub mod comments;
pub mod handlers;
pub mod posts;
