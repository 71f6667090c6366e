//! # mailvault-mime
//!
//! MIME message parsing for the mailvault ingestion pipeline.
//!
//! Parse-only: the pipeline reads mail, it never generates it. Supports:
//!
//! - Header block parsing with folded continuation lines
//! - RFC 2047 encoded-word decoding (B and Q) for subjects and filenames
//! - Base64 and Quoted-Printable transfer decoding
//! - Content-Type and Content-Disposition parameters
//! - Multipart boundary splitting with nested-multipart flattening
//! - RFC 2822 date parsing
//!
//! ## Quick start
//!
//! ```ignore
//! use mailvault_mime::Message;
//!
//! let message = Message::parse(raw_bytes)?;
//! let body = message.plain_body();
//! for part in message.attachments() {
//!     if part.filename().is_some_and(|f| f.to_lowercase().ends_with(".pdf")) {
//!         let bytes = part.decode_body()?;
//!         // save the PDF
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod content_type;
pub mod encoding;
mod error;
pub mod header;
pub mod message;

pub use content_type::{ContentDisposition, ContentType, DispositionKind};
pub use encoding::decode_header_value;
pub use error::{Error, Result};
pub use header::Headers;
pub use message::{Message, Part, TransferEncoding, parse_date};
