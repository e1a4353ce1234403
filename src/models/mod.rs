mod financial;
mod membership;
mod payment;
mod store;
mod user;

pub use financial::*;
pub use membership::*;
pub use payment::*;
pub use store::*;
pub use user::*;
