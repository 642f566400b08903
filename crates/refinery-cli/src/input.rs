use serde::Deserialize;

use refinery_core::error::{RefineError, Result};
use refinery_core::item::ExtractionItem;

/// Accepted shapes of an items file: a bare array, or an object carrying
/// the array under `extractions` (the shape of a previous run's result).
#[derive(Deserialize)]
#[serde(untagged)]
enum ItemsFile {
    List(Vec<ExtractionItem>),
    Wrapped { extractions: Vec<ExtractionItem> },
}

pub fn parse_items(raw: &str) -> Result<Vec<ExtractionItem>> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    match serde_json::from_value(value) {
        Ok(ItemsFile::List(items)) | Ok(ItemsFile::Wrapped { extractions: items }) => Ok(items),
        Err(_) => Err(RefineError::Input(
            "expected a JSON array of extraction items or an object with an `extractions` array"
                .into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use refinery_core::item::ItemKind;

    use super::*;

    #[test]
    fn test_bare_array() {
        let items = parse_items(r#"[{"type": "entity", "text": "Solver"}, {"type": "rule", "text": "x"}]"#)
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].kind, ItemKind::Entity);
    }

    #[test]
    fn test_wrapped_extractions() {
        let items = parse_items(r#"{"extractions": [{"type": "event", "text": "OnClick"}], "stats": {}}"#)
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].kind, ItemKind::Event);
    }

    #[test]
    fn test_wrong_shape() {
        let err = parse_items(r#"{"items": []}"#).unwrap_err();
        assert!(matches!(err, RefineError::Input(_)));
    }

    #[test]
    fn test_not_json() {
        let err = parse_items("not json").unwrap_err();
        assert!(matches!(err, RefineError::Json(_)));
    }
}
