pub mod parser;
pub mod paths;
pub mod tree;

pub use parser::{price_with_fallback, ListingDocument, PROPERTY_ELEMENT};
pub use paths::FieldPath;
pub use tree::{Element, Node, XmlDocument};
