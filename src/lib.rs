pub mod archive;
pub mod cancel;
pub mod commands;
pub mod consent;
pub mod http;
pub mod install;
pub mod package;
pub mod runtime;
pub mod source;

#[cfg(test)]
pub mod test_utils;
