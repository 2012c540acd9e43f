pub mod bulk;
pub mod lifecycle;
pub mod metadata;
pub mod object;
pub mod status;

pub use bulk::*;
pub use lifecycle::*;
pub use metadata::*;
pub use object::*;
pub use status::*;
