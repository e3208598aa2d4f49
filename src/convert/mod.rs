pub mod geo;
pub mod tabular;
pub mod xml;
