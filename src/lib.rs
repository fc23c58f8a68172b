//! A REST toolkit in the webmachine tradition: resources are a bag of
//! optional callbacks, and a fixed decision graph turns a request plus those
//! callbacks into a compliant HTTP response.

pub mod decision;
pub mod headers;
pub mod negotiate;
pub mod resource;
pub mod server;
pub mod types;
