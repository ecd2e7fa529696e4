pub mod common;

mod pagination_tests;
mod source_tests;
