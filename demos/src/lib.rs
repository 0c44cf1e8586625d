//! Building blocks of the `bridge` binary: console handling and the menu.

pub mod console;
pub mod menu;
