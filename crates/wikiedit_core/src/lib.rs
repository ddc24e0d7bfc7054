pub mod config;
pub mod diff;
pub mod editor;
pub mod fields;
pub mod markup;
pub mod rows;
pub mod scanner;
pub mod span;

pub use editor::PageEditor;
pub use fields::{FieldData, FieldMapping, field_value};
pub use rows::{RowItem, format_nested_rows, parse_rows};
pub use scanner::{WikitextScanner, clean_newlines};
pub use span::{ParamName, ParameterSpan, SectionHeader, SectionSpan, TemplateSpan};
