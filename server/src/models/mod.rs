pub mod league;
pub mod member;
pub mod reservation;

pub use league::*;
pub use member::*;
pub use reservation::*;
