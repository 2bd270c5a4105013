//! Concrete collaborators: the HTTPS backend client and in-process fakes.

pub mod http_gateway;
pub mod in_memory;
