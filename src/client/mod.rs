//! Client side of the generation flow: an HTTP client for the API and the
//! retry/abort lifecycle that a UI binds to.

pub mod api;
pub mod lifecycle;
pub mod session;

pub use api::{ApiClient, GenerationTransport, RequestFailure};
pub use lifecycle::{Command, Event, GenerationUpload, ImageFile, Lifecycle, Phase};
pub use session::GenerationSession;
