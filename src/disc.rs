pub mod boundary;
pub mod coupling;
pub mod field;
pub mod geometric;
pub mod linear_solver;
pub mod linear_system;
pub mod mesh;
pub mod operators;
