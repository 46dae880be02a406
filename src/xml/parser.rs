use crate::error::{EngineError, Result};
use crate::xml::paths::FieldPath;
use crate::xml::tree::{Element, XmlDocument};

/// Element wrapping one real-estate listing
pub const PROPERTY_ELEMENT: &str = "RealEstateProperty";

/// A parsed listing source file or merged document
#[derive(Debug, Clone)]
pub struct ListingDocument {
    document: XmlDocument,
}

impl ListingDocument {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            document: XmlDocument::parse(bytes)?,
        })
    }

    pub fn root(&self) -> &Element {
        &self.document.root
    }

    /// All listing elements, in document order
    pub fn property_nodes(&self) -> Vec<&Element> {
        self.document.root.find_all(PROPERTY_ELEMENT)
    }

    /// The listing element of a single-listing file.
    ///
    /// When a file holds more than one listing only the first is used.
    pub fn property_node(&self) -> Result<&Element> {
        self.property_nodes()
            .into_iter()
            .next()
            .ok_or(EngineError::NoPropertyNode)
    }

    /// Standalone deep copy of the listing element, carrying the namespace
    /// declarations it inherits from enclosing elements
    pub fn detached_property_node(&self) -> Result<Element> {
        self.root()
            .find_with_ancestors(PROPERTY_ELEMENT)
            .map(|(ancestors, node)| node.detached_copy(&ancestors))
            .ok_or(EngineError::NoPropertyNode)
    }

    /// Trimmed value of `path` anywhere in the document
    pub fn value(&self, path: FieldPath) -> Option<String> {
        path.first(self.root())
    }
}

/// Purchase price when present, rent price otherwise.
///
/// Empty strings count as absent.
pub fn price_with_fallback(purchase: Option<&str>, rent: Option<&str>) -> Option<String> {
    fn present(value: Option<&str>) -> Option<&str> {
        value.map(str::trim).filter(|v| !v.is_empty())
    }

    present(purchase)
        .or_else(|| present(rent))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::paths;

    #[test]
    fn finds_the_listing_element() {
        let doc = ListingDocument::parse(
            b"<Export><RealEstateProperty><PropertyInfo><PublicReferenceNumber>R-1</PublicReferenceNumber></PropertyInfo></RealEstateProperty></Export>",
        )
        .unwrap();
        let node = doc.property_node().unwrap();
        assert_eq!(node.name, "RealEstateProperty");
        assert_eq!(doc.value(paths::PROPERTY_ID).as_deref(), Some("R-1"));
    }

    #[test]
    fn missing_listing_element_is_distinct_error() {
        let doc = ListingDocument::parse(b"<Export><Other/></Export>").unwrap();
        assert!(matches!(doc.property_node(), Err(EngineError::NoPropertyNode)));
    }

    #[test]
    fn first_of_several_listings_is_used() {
        let doc = ListingDocument::parse(
            b"<Export><RealEstateProperty id=\"a\"/><RealEstateProperty id=\"b\"/></Export>",
        )
        .unwrap();
        assert_eq!(doc.property_nodes().len(), 2);
        assert_eq!(doc.property_node().unwrap().attribute("id"), Some("a"));
    }

    #[test]
    fn malformed_input_becomes_parse_error() {
        let err = ListingDocument::parse(b"<RealEstateProperty><Oops></RealEstateProperty>")
            .unwrap_err();
        match err {
            EngineError::Parse { messages } => assert!(!messages.is_empty()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn purchase_price_wins_over_rent() {
        assert_eq!(
            price_with_fallback(Some("150000"), Some("900")).as_deref(),
            Some("150000")
        );
        assert_eq!(price_with_fallback(Some("0"), Some("900")).as_deref(), Some("0"));
        assert_eq!(price_with_fallback(Some(" "), Some("900")).as_deref(), Some("900"));
        assert_eq!(price_with_fallback(None, Some("900")).as_deref(), Some("900"));
        assert_eq!(price_with_fallback(None, Some("")), None);
    }
}
