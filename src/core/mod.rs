// Domain-layer modules and shared errors
pub mod fields {
    pub use crate::fields::*;
}

pub mod schema {
    pub use crate::schema::*;
}

pub mod requests {
    pub use crate::requests::*;
}

pub mod scoring {
    pub use crate::scoring::*;
}

pub mod errors {
    pub use crate::errors::*;
}
