mod json;

pub use json::{format_json, print_json, write_json};
