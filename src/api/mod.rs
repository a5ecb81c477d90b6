pub mod applications;
pub mod co_applicants;
pub mod continuation;
pub mod health;
pub mod oauth;
pub mod swagger;
