pub mod pdf_decoder;
pub mod utils;

pub use pdf_decoder::{PdfDecoder, PdfDocument, PdfPage};
