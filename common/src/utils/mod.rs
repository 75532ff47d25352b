//! Statement helpers used by the gateway.

pub mod statement;

// Re-export commonly used items
pub use statement::{
    bind_named, classify_statement, inline_params, is_select, render_statement, resolve_target,
    split_script,
};
