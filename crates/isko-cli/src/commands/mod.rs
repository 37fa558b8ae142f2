pub mod common;
pub mod counts;
pub mod demo;
pub mod list;
pub mod watch;
