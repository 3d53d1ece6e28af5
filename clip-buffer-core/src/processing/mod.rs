pub mod assembler;
pub mod container;
