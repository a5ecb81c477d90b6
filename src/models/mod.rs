pub mod application;
pub mod credential;
pub mod employment;
pub mod participant;
pub mod person;
pub mod property;
pub mod verification;

pub use application::*;
pub use credential::*;
pub use employment::*;
pub use participant::*;
pub use person::*;
pub use property::*;
pub use verification::*;
