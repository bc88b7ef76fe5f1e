//! Encoder interface and format negotiation

pub mod formats;
pub mod traits;

pub use formats::{
    extension_for, supported_formats, Container, FormatOption, DEFAULT_MIME_TYPE,
    FORMAT_CANDIDATES,
};
pub use traits::{Encoder, EncoderConfig, EncoderEvent, EncoderFactory, EncoderState};
