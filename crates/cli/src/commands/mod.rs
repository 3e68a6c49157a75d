pub mod model;
pub mod serving;
