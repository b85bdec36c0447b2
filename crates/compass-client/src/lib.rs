// file: src/lib.rs
//
// Clients for the Compass index and parser services.
//
// - payload: the loosely shaped response envelope returned by the index service
// - types: index/parser configuration and parsed documents
// - index: IndexClient trait + reqwest implementation
// - parser: ParserClient trait + reqwest implementation

pub mod index;
pub mod parser;
pub mod payload;
pub mod types;

pub use index::{CompassClient, DocumentUpload, IndexClient};
pub use parser::{CompassParserClient, ParserClient};
pub use payload::ResponsePayload;
pub use types::{
    IndexConfig, IndexInfo, ParseOutcome, ParsedDocument, ParserConfig, PdfParsingStrategy,
};
