//! Declarative field-path table for listing documents.
//!
//! A path is a chain of element names. The first step matches the scope
//! element itself or any descendant; each later step matches direct children.
//! Names are compared case-sensitively on their local part. The value of a
//! path is the trimmed first text child of the first match that has one.

use crate::models::DiffField;
use crate::xml::tree::Element;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldPath {
    pub steps: &'static [&'static str],
}

pub const PROPERTY_ID: FieldPath = FieldPath {
    steps: &["PropertyInfo", "PublicReferenceNumber"],
};
pub const ADDRESS: FieldPath = FieldPath {
    steps: &["Location", "Address", "AddressLine1", "Translation"],
};
pub const CITY: FieldPath = FieldPath {
    steps: &["Location", "Address", "CityName", "Translation"],
};
pub const POSTAL_CODE: FieldPath = FieldPath {
    steps: &["Location", "Address", "PostalCode", "Translation"],
};
pub const COUNTRY: FieldPath = FieldPath {
    steps: &["Location", "Address", "Country", "Translation"],
};
pub const STATUS: FieldPath = FieldPath {
    steps: &["PropertyInfo", "Status", "Translation"],
};
pub const PURCHASE_PRICE: FieldPath = FieldPath {
    steps: &["Financials", "PurchasePrice"],
};
pub const RENT_PRICE: FieldPath = FieldPath {
    steps: &["Financials", "RentPrice"],
};
pub const PROPERTY_TYPE: FieldPath = FieldPath {
    steps: &["PropertyInfo", "Type", "Translation"],
};
pub const LIVING_AREA: FieldPath = FieldPath {
    steps: &["Building", "Areas", "LivingArea"],
};
pub const PLOT_AREA: FieldPath = FieldPath {
    steps: &["Building", "Areas", "PlotArea"],
};
pub const ROOMS: FieldPath = FieldPath {
    steps: &["Building", "Rooms", "RoomCount"],
};
pub const BEDROOMS: FieldPath = FieldPath {
    steps: &["Building", "Rooms", "BedroomCount"],
};
pub const BATHROOMS: FieldPath = FieldPath {
    steps: &["Building", "Rooms", "BathroomCount"],
};
pub const DESCRIPTION: FieldPath = FieldPath {
    steps: &["PropertyInfo", "Description", "Translation"],
};
pub const LAST_MODIFIED: FieldPath = FieldPath {
    steps: &["PropertyInfo", "ModificationDateTime"],
};
pub const THUMBNAIL_URL: FieldPath = FieldPath {
    steps: &["Attachments", "Attachment", "URLThumbFile"],
};
pub const MEDIA_URL: FieldPath = FieldPath {
    steps: &["Attachments", "Attachment", "URLNormalizedFile"],
};

impl FieldPath {
    /// Path backing one of the diffable fields
    pub fn for_field(field: DiffField) -> FieldPath {
        match field {
            DiffField::Address => ADDRESS,
            DiffField::City => CITY,
            DiffField::PostalCode => POSTAL_CODE,
            DiffField::Country => COUNTRY,
            DiffField::PurchasePrice => PURCHASE_PRICE,
            DiffField::RentPrice => RENT_PRICE,
            DiffField::PropertyType => PROPERTY_TYPE,
            DiffField::Status => STATUS,
            DiffField::LivingArea => LIVING_AREA,
            DiffField::PlotArea => PLOT_AREA,
            DiffField::Rooms => ROOMS,
            DiffField::Bedrooms => BEDROOMS,
            DiffField::Bathrooms => BATHROOMS,
            DiffField::Description => DESCRIPTION,
            DiffField::LastModified => LAST_MODIFIED,
        }
    }

    /// Every element the path selects under `scope`, in document order
    pub fn select<'a>(&self, scope: &'a Element) -> Vec<&'a Element> {
        let Some((first, rest)) = self.steps.split_first() else {
            return Vec::new();
        };

        let mut current = scope.find_all(first);
        for step in rest {
            current = current
                .into_iter()
                .flat_map(|element| element.child_elements().filter(|c| c.local_name() == *step))
                .collect();
        }
        current
    }

    /// Trimmed first text of the matches. A blank first text is missing,
    /// it does not fall through to later matches.
    pub fn first(&self, scope: &Element) -> Option<String> {
        self.select(scope)
            .into_iter()
            .find_map(|element| element.first_text())
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
    }

    /// Every non-empty matching text, trimmed
    pub fn all(&self, scope: &Element) -> Vec<String> {
        self.select(scope)
            .into_iter()
            .filter_map(|element| element.first_text())
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::tree::XmlDocument;

    fn doc(xml: &str) -> XmlDocument {
        XmlDocument::parse(xml.as_bytes()).unwrap()
    }

    #[test]
    fn first_match_wins_and_is_trimmed() {
        let d = doc(
            "<R><Financials><PurchasePrice>  250000 </PurchasePrice></Financials>\
             <Financials><PurchasePrice>1</PurchasePrice></Financials></R>",
        );
        assert_eq!(PURCHASE_PRICE.first(&d.root).as_deref(), Some("250000"));
    }

    #[test]
    fn empty_text_is_missing() {
        let d = doc("<R><Financials><PurchasePrice>   </PurchasePrice><RentPrice/></Financials></R>");
        assert_eq!(PURCHASE_PRICE.first(&d.root), None);
        assert_eq!(RENT_PRICE.first(&d.root), None);
    }

    #[test]
    fn blank_first_match_is_not_skipped() {
        let d = doc(
            "<R><Financials><PurchasePrice>  </PurchasePrice></Financials>\
             <Financials><PurchasePrice>250000</PurchasePrice></Financials></R>",
        );
        assert_eq!(PURCHASE_PRICE.first(&d.root), None);
    }

    #[test]
    fn textless_match_defers_to_the_next() {
        let d = doc(
            "<R><Financials><PurchasePrice/></Financials>\
             <Financials><PurchasePrice>250000</PurchasePrice></Financials></R>",
        );
        assert_eq!(PURCHASE_PRICE.first(&d.root).as_deref(), Some("250000"));
    }

    #[test]
    fn first_step_matches_at_any_depth() {
        let d = doc(
            "<Feed><RealEstateProperty><Location><Address><CityName>\
             <Translation>Utrecht</Translation></CityName></Address></Location>\
             </RealEstateProperty></Feed>",
        );
        assert_eq!(CITY.first(&d.root).as_deref(), Some("Utrecht"));
    }

    #[test]
    fn names_are_case_sensitive() {
        let d = doc("<R><financials><PurchasePrice>5</PurchasePrice></financials></R>");
        assert_eq!(PURCHASE_PRICE.first(&d.root), None);
    }

    #[test]
    fn later_steps_only_match_children() {
        let d = doc("<R><Financials><Extra><PurchasePrice>5</PurchasePrice></Extra></Financials></R>");
        assert_eq!(PURCHASE_PRICE.first(&d.root), None);
    }

    #[test]
    fn all_collects_every_attachment() {
        let d = doc(
            "<R><Attachments>\
             <Attachment><URLNormalizedFile>https://x/a.jpg</URLNormalizedFile></Attachment>\
             <Attachment><URLNormalizedFile></URLNormalizedFile></Attachment>\
             <Attachment><URLNormalizedFile>https://x/b.jpg</URLNormalizedFile></Attachment>\
             </Attachments></R>",
        );
        assert_eq!(MEDIA_URL.all(&d.root), vec!["https://x/a.jpg", "https://x/b.jpg"]);
    }

    #[test]
    fn every_diff_field_has_a_path() {
        for field in DiffField::ALL {
            assert!(!FieldPath::for_field(field).steps.is_empty());
        }
    }
}
