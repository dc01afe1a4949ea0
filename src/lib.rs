pub mod cancel;
pub mod check;
pub mod config;
pub mod lsp;
pub mod parser;
