//! HTTP middleware shared by the service binaries.

pub mod request_id;

// Re-export commonly used items
pub use request_id::{
    make_request_span, propagate_request_id_layer, set_request_id_layer, REQUEST_ID_HEADER,
};
