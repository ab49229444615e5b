// Contact requests: the CA inbox.
// Customers create requests; only the receiving CA reads them or changes status and notes.

pub mod filter;
pub mod handlers;
pub mod service;
