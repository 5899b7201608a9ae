pub mod pagination;
pub mod response;
pub mod validation;

pub use pagination::*;
pub use response::*;
pub use validation::*;
