pub mod document_annotator;
pub mod document_cursor;
pub mod document_info;
pub mod document_position;

pub use document_annotator::DocumentAnnotator;
pub use document_cursor::{DocumentCursor, DocumentRange, Ranged};
pub use document_position::DocumentPosition;
