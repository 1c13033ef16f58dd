pub mod decode_service;
pub mod decoder;
#[cfg(any(test, feature = "test-utils"))]
pub mod fake;
pub mod page_info;
#[cfg(feature = "pdf")]
pub mod pdf;

pub use self::decode_service::{DecodeResult, DecodeService, DecodeTask};
pub use self::decoder::{Decoder, DocumentHandle, PageHandle};
pub use self::page_info::PageInfo;
#[cfg(feature = "pdf")]
pub use self::pdf::PdfDecoder;
