pub mod block;
pub mod document;
pub mod line_parser;
pub mod task_serializer;

pub use block::{ChildBlock, collect_block};
pub use document::parse_document;
pub use line_parser::{LineParser, MarkdownLineParser};
pub use task_serializer::serialize_task_line;
