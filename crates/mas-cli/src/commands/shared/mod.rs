pub mod filter;
pub mod parse;
