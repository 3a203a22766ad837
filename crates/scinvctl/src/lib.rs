//! Command-line front end for SeisComP inventory files.

pub mod cmd_check;
pub mod cmd_set;
pub mod cmd_shell;
pub mod cmd_show;
pub mod cmd_tree;
pub mod cmd_validate;
pub mod common;
