use super::*;

mod tree;
mod hosts;
