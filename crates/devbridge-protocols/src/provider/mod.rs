//! AI provider protocol definitions.

mod request;
mod traits;

pub use request::RequestSpec;
pub use traits::AiProvider;
