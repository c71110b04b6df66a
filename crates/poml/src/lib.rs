pub mod api;
pub mod config;
pub mod errors;
pub mod formats;
pub mod models;
pub mod naming;
pub mod prompt;
pub mod renderer;
pub mod trace;

pub use api::{InputData, Markup, Poml, RenderRequest};
pub use errors::{PomlError, PomlResult};
pub use formats::{convert, convert_frame, convert_value, OutputFormat, Rendered};
pub use models::message::{Frame, Message, Speaker};
pub use prompt::{Attrs, Prompt};
pub use trace::Tracer;
