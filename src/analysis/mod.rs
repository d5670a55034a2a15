pub mod chi_square;
pub mod spam;
